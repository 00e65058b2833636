pub mod db;
pub mod media;
pub mod memory;
pub mod pg_store;
pub mod storage;
pub mod store;
