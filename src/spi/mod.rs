pub mod backend;
pub mod flash_reader;
pub mod protocol;
pub mod session;
