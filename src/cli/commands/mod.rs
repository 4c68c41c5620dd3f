mod command_result;
pub mod export;
pub mod generate;
pub mod init;
pub mod query;

pub use command_result::*;
