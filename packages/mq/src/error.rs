use common::mq::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("MQ disabled")]
    Disabled,

    #[error("{0}")]
    Internal(String),
}

impl From<broccoli_queue::error::BroccoliError> for MqError {
    fn from(e: broccoli_queue::error::BroccoliError) -> Self {
        MqError::Internal(e.to_string())
    }
}
