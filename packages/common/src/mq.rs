use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Operation tags understood by the microservices that exchange messages with
/// the learning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RequestAppClassesAndMaterials,
    ResponseAppClassesAndMaterials,
    PublishNewMaterialAccess,
    RequestMaterialReviews,
    ResponseMaterialReviews,
    NotificationUserDeletion,
    NotificationDeleteCourse,
    RequestAppUsers,
    ResponseAppUsers,
    NotificationNewClass,
    NotificationDeleteClass,
    NotificationDeleteMaterial,
    NotificationAssociateMaterial,
    NotificationDisassociateMaterial,
}

impl Operation {
    const ALL: [Operation; 14] = [
        Self::RequestAppClassesAndMaterials,
        Self::ResponseAppClassesAndMaterials,
        Self::PublishNewMaterialAccess,
        Self::RequestMaterialReviews,
        Self::ResponseMaterialReviews,
        Self::NotificationUserDeletion,
        Self::NotificationDeleteCourse,
        Self::RequestAppUsers,
        Self::ResponseAppUsers,
        Self::NotificationNewClass,
        Self::NotificationDeleteClass,
        Self::NotificationDeleteMaterial,
        Self::NotificationAssociateMaterial,
        Self::NotificationDisassociateMaterial,
    ];

    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestAppClassesAndMaterials => "requestAppClassesAndMaterials",
            Self::ResponseAppClassesAndMaterials => "responseAppClassesAndMaterials",
            Self::PublishNewMaterialAccess => "publishNewMaterialAccess",
            Self::RequestMaterialReviews => "requestMaterialReviews",
            Self::ResponseMaterialReviews => "responseMaterialReviews",
            Self::NotificationUserDeletion => "notificationUserDeletion",
            Self::NotificationDeleteCourse => "notificationDeleteCourse",
            Self::RequestAppUsers => "requestAppUsers",
            Self::ResponseAppUsers => "responseAppUsers",
            Self::NotificationNewClass => "notificationNewClass",
            Self::NotificationDeleteClass => "notificationDeleteClass",
            Self::NotificationDeleteMaterial => "notificationDeleteMaterial",
            Self::NotificationAssociateMaterial => "notificationAssociateMaterial",
            Self::NotificationDisassociateMaterial => "notificationDisassociateMaterial",
        }
    }

    /// Parse a wire name. Returns `None` for tags this service does not know.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == tag)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope exchanged on the message bus: `{ "operationId": ..., "message": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMessage {
    pub operation_id: String,
    #[serde(default)]
    pub message: Value,
}

impl ServiceMessage {
    pub fn new(operation: Operation, message: Value) -> Self {
        Self {
            operation_id: operation.as_str().to_string(),
            message,
        }
    }

    /// The parsed operation tag, if known.
    pub fn operation(&self) -> Result<Operation, MessageError> {
        Operation::parse(&self.operation_id)
            .ok_or_else(|| MessageError::UnknownOperation(self.operation_id.clone()))
    }

    /// Decode the payload into a typed message.
    ///
    /// Senders may put either a JSON object or a JSON-encoded string in
    /// `message`; both forms are accepted.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        let malformed = |source| MessageError::MalformedPayload {
            operation: self.operation_id.clone(),
            source,
        };

        match &self.message {
            Value::String(raw) => {
                debug!(operation = %self.operation_id, "Decoding string-encoded payload");
                serde_json::from_str(raw).map_err(malformed)
            }
            other => serde_json::from_value(other.clone()).map_err(malformed),
        }
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Malformed payload for {operation}: {source}")]
    MalformedPayload {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

/// `{ courseId }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRef {
    pub course_id: String,
}

/// `{ username }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub username: String,
}

/// `{ username, materialId }`: a purchase granted by another service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialAccessGrant {
    pub username: String,
    pub material_id: String,
}

/// `{ materialId }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRef {
    pub material_id: String,
}

/// `{ materialId, review }`: the reviews service answering a review request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub material_id: String,
    #[serde(default)]
    pub review: Value,
}

/// A user profile as published by the users service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

/// `{ users: [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<UserProfile>,
}

/// `{ usernames: [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersRequest {
    pub usernames: Vec<String>,
}
