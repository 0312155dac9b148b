use std::sync::Arc;

use async_trait::async_trait;
use common::mq::{Operation, ServiceMessage};
use mq::{Mq, MqError, publish_service_message};
use serde::Serialize;
use tracing::{debug, warn};

/// Outbound side of the message bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, destination: &str, message: &ServiceMessage) -> Result<(), MqError>;
}

/// Publishes onto the broker queue named after the destination service.
pub struct MqPublisher {
    mq: Arc<Mq>,
}

impl MqPublisher {
    pub fn new(mq: Arc<Mq>) -> Self {
        Self { mq }
    }
}

#[async_trait]
impl Publisher for MqPublisher {
    async fn publish(&self, destination: &str, message: &ServiceMessage) -> Result<(), MqError> {
        publish_service_message(&self.mq, destination, message).await
    }
}

/// Used when the broker is disabled in configuration.
pub struct DisabledPublisher;

#[async_trait]
impl Publisher for DisabledPublisher {
    async fn publish(&self, _destination: &str, _message: &ServiceMessage) -> Result<(), MqError> {
        Err(MqError::Disabled)
    }
}

/// Fire-and-forget notifications to peer services.
///
/// Failures are logged and dropped; they never reach the HTTP caller and are
/// not retried.
#[derive(Clone)]
pub struct NotificationRelay {
    publisher: Arc<dyn Publisher>,
}

impl NotificationRelay {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    /// Publish `operation` with `payload` to `destination`, returning whether it was sent.
    pub async fn notify<T: Serialize>(
        &self,
        destination: &str,
        operation: Operation,
        payload: &T,
    ) -> bool {
        let message = match serde_json::to_value(payload) {
            Ok(value) => ServiceMessage::new(operation, value),
            Err(e) => {
                warn!(destination, %operation, error = %e, "Failed to encode notification payload");
                return false;
            }
        };

        match self.publisher.publish(destination, &message).await {
            Ok(()) => {
                debug!(destination, %operation, "Notification sent");
                true
            }
            Err(MqError::Disabled) => {
                debug!(destination, %operation, "Message bus disabled, notification dropped");
                false
            }
            Err(e) => {
                warn!(destination, %operation, error = %e, "Failed to send notification, dropping it");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingPublisher;
    use serde_json::json;

    #[tokio::test]
    async fn notify_wraps_payload_in_envelope() {
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = NotificationRelay::new(publisher.clone());

        let sent = relay
            .notify(
                "courses-microservice",
                Operation::NotificationNewClass,
                &json!({ "courseId": "c1", "classId": "k1" }),
            )
            .await;

        assert!(sent);
        let messages = publisher.sent();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "courses-microservice");
        assert_eq!(messages[0].1.operation_id, "notificationNewClass");
        assert_eq!(messages[0].1.message["classId"], "k1");
    }

    #[tokio::test]
    async fn publish_failures_are_swallowed() {
        let publisher = Arc::new(RecordingPublisher::default());
        publisher.fail(true);
        let relay = NotificationRelay::new(publisher.clone());

        let sent = relay
            .notify(
                "courses-microservice",
                Operation::NotificationDeleteClass,
                &json!({ "classId": "k1" }),
            )
            .await;

        assert!(!sent);
        assert!(publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn disabled_bus_drops_notifications() {
        let relay = NotificationRelay::new(Arc::new(DisabledPublisher));
        let sent = relay
            .notify(
                "reviews-microservice",
                Operation::RequestMaterialReviews,
                &json!({ "materialId": "m1" }),
            )
            .await;
        assert!(!sent);
    }
}
