pub mod cli;
pub mod config;
pub mod consumer;
pub mod convert;
pub mod error;
pub mod file;
pub mod filter;
pub mod lister;
pub mod poller;

pub use error::*;
pub use file::*;
pub use filter::*;
pub use lister::*;
pub use poller::*;
