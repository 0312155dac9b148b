pub mod error;
pub mod models;

pub use error::MqError;
pub use models::{
    BroccoliError, BrokerMessage, MqConfig, MqQueue, init_mq, publish_service_message,
};

pub type Mq = MqQueue;
