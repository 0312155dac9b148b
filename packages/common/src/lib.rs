pub mod config;
pub mod mq;
pub mod storage;

pub use mq::{MessageError, Operation, ServiceMessage};
