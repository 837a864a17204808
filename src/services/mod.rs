pub mod checksum;
pub mod retry;
pub mod upload_service;
