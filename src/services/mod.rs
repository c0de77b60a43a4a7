pub mod fs_store;
pub mod memory_store;
pub mod object_store;
pub mod reporter;
pub mod resize_service;
pub mod s3_store;
pub mod transform;
