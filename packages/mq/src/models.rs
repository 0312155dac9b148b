pub use broccoli_queue::{
    brokers::broker::BrokerMessage,
    error::BroccoliError,
    queue::BroccoliQueue,
};
use common::mq::ServiceMessage;
use tracing::debug;

use crate::error::MqError;

pub type MqQueue = BroccoliQueue;

pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
}

pub async fn init_mq(config: MqConfig) -> Result<MqQueue, MqError> {
    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .build()
        .await
        .map_err(MqError::from)
}

/// Publish a service message onto the queue consumed by `destination`.
///
/// Each microservice consumes a queue named after itself, so the destination
/// service name doubles as the queue name.
pub async fn publish_service_message(
    mq: &MqQueue,
    destination: &str,
    message: &ServiceMessage,
) -> Result<(), MqError> {
    let published = mq.publish(destination, None, message, None).await?;
    debug!(
        destination,
        operation = %message.operation_id,
        task_id = %published.task_id,
        "Published service message"
    );
    Ok(())
}
