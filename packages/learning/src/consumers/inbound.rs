use std::sync::Arc;

use chrono::Utc;
use common::mq::{
    CourseRef, MaterialAccessGrant, Operation, ReviewResponse, ServiceMessage, UserProfile,
    UserRef, UsersResponse,
};
use common::storage::BlobStore;
use mq::{BrokerMessage, Mq};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::class::ClassResponse;
use crate::models::material::MaterialResponse;
use crate::services::catalog;
use crate::services::quota::Plan;
use crate::services::users;
use crate::state::AppState;
use crate::utils::keys::{PLACEHOLDER_KEY, object_key_from_stored};

/// Consume messages addressed to this service from `queue_name`.
///
/// Every message is acknowledged once handled. A handler failure is logged
/// and the message is dropped, not requeued.
pub async fn consume_service_messages(state: AppState, mq: Arc<Mq>, queue_name: String) {
    info!(queue = %queue_name, "Starting service message consumer");

    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<ServiceMessage>| {
                let state = state.clone();
                async move {
                    let envelope = message.payload;
                    info!(operation = %envelope.operation_id, "Received service message");

                    if let Err(e) = handle_service_message(&state, &envelope).await {
                        error!(
                            operation = %envelope.operation_id,
                            error = %e,
                            "Failed to handle service message, dropping it"
                        );
                    }
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Service message consumer stopped unexpectedly");
    }
}

/// `{ courseId, classes, materials }` sent back to the courses service.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseContents {
    course_id: String,
    classes: Vec<ClassResponse>,
    materials: Vec<MaterialResponse>,
}

/// Dispatch one inbound message by its operation tag.
pub async fn handle_service_message(
    state: &AppState,
    envelope: &ServiceMessage,
) -> anyhow::Result<()> {
    let operation = match envelope.operation() {
        Ok(op) => op,
        Err(e) => {
            warn!(error = %e, "Ignoring message with unknown operation");
            return Ok(());
        }
    };

    match operation {
        Operation::RequestAppClassesAndMaterials => {
            send_course_contents(state, envelope.payload()?).await
        }
        Operation::PublishNewMaterialAccess => grant_material_access(state, envelope.payload()?).await,
        Operation::ResponseMaterialReviews => {
            let response: ReviewResponse = envelope.payload()?;
            state
                .reviews
                .store_review(&response.material_id, &response.review)
                .await?;
            Ok(())
        }
        Operation::NotificationUserDeletion => remove_user(state, envelope.payload()?).await,
        Operation::NotificationDeleteCourse => remove_course(state, envelope.payload()?).await,
        Operation::ResponseAppUsers => {
            let response: UsersResponse = envelope.payload()?;
            let profiles: Vec<UserProfile> =
                response.users.into_iter().map(normalize_plan).collect();
            users::upsert_profiles(&state.db, &profiles, Utc::now()).await?;
            info!(count = profiles.len(), "Refreshed materialized users");
            Ok(())
        }
        other => {
            warn!(operation = %other, "Ignoring message this service does not consume");
            Ok(())
        }
    }
}

async fn send_course_contents(state: &AppState, request: CourseRef) -> anyhow::Result<()> {
    let classes = catalog::classes_of_course(&state.db, &request.course_id).await?;
    let materials = catalog::materials_of_course(&state.db, &request.course_id).await?;

    let contents = CourseContents {
        course_id: request.course_id,
        classes: classes.into_iter().map(ClassResponse::from).collect(),
        materials: materials.into_iter().map(MaterialResponse::from).collect(),
    };
    state
        .relay
        .notify(
            &state.config.services.courses,
            Operation::ResponseAppClassesAndMaterials,
            &contents,
        )
        .await;
    Ok(())
}

async fn grant_material_access(state: &AppState, grant: MaterialAccessGrant) -> anyhow::Result<()> {
    let material_id = Uuid::parse_str(&grant.material_id)?;
    if catalog::add_purchaser(&state.db, material_id, &grant.username).await? {
        info!(%material_id, username = %grant.username, "Granted material access");
    } else {
        warn!(%material_id, username = %grant.username, "Access granted to unknown material, ignoring");
    }
    Ok(())
}

async fn remove_user(state: &AppState, user: UserRef) -> anyhow::Result<()> {
    let removed = catalog::remove_user(&state.db, &user.username).await?;

    for class in &removed.classes {
        delete_blob(state.class_store.as_ref(), &class.file).await;
    }
    for material in &removed.materials {
        delete_blob(state.material_store.as_ref(), &material.file).await;
    }

    info!(
        username = %user.username,
        classes = removed.classes.len(),
        materials = removed.materials.len(),
        purchases_revoked = removed.purchases_revoked,
        "Removed content of deleted user"
    );
    Ok(())
}

async fn remove_course(state: &AppState, course: CourseRef) -> anyhow::Result<()> {
    let removed = catalog::remove_course(&state.db, &course.course_id).await?;

    for class in &removed.classes {
        delete_blob(state.class_store.as_ref(), &class.file).await;
    }

    info!(
        course_id = %course.course_id,
        classes = removed.classes.len(),
        associations = removed.associations_removed,
        "Removed content of deleted course"
    );
    Ok(())
}

async fn delete_blob(store: &dyn BlobStore, stored: &str) {
    let key = object_key_from_stored(stored);
    if key == PLACEHOLDER_KEY {
        return;
    }
    if let Err(e) = store.delete(key).await {
        warn!(key, bucket = store.bucket(), error = %e, "Failed to delete blob of removed record");
    }
}

/// Store known plans under their canonical name.
fn normalize_plan(mut profile: UserProfile) -> UserProfile {
    if let Some(plan) = profile.plan.as_deref().and_then(Plan::parse) {
        profile.plan = Some(plan.as_str().to_string());
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::{add_purchaser, associate_course, purchasers_of};
    use crate::entity::materialized_user;
    use crate::test_support::{sample_class, sample_material, test_app};
    use sea_orm::EntityTrait;
    use serde_json::json;

    fn message(operation: Operation, payload: serde_json::Value) -> ServiceMessage {
        ServiceMessage::new(operation, payload)
    }

    #[tokio::test]
    async fn material_access_is_granted_once() {
        let app = test_app().await;
        let m = sample_material(&app.state.db, "alice", 10.0).await;
        let grant = message(
            Operation::PublishNewMaterialAccess,
            json!({ "username": "bob", "materialId": m.id.to_string() }),
        );

        handle_service_message(&app.state, &grant).await.unwrap();
        handle_service_message(&app.state, &grant).await.unwrap();

        assert_eq!(purchasers_of(&app.state.db, m.id).await.unwrap(), vec!["bob"]);
    }

    #[tokio::test]
    async fn stringified_payloads_are_accepted() {
        let app = test_app().await;
        let m = sample_material(&app.state.db, "alice", 10.0).await;
        let raw = json!({ "username": "bob", "materialId": m.id.to_string() }).to_string();
        let grant = message(Operation::PublishNewMaterialAccess, json!(raw));

        handle_service_message(&app.state, &grant).await.unwrap();

        assert_eq!(purchasers_of(&app.state.db, m.id).await.unwrap(), vec!["bob"]);
    }

    #[tokio::test]
    async fn malformed_material_id_is_an_error() {
        let app = test_app().await;
        let grant = message(
            Operation::PublishNewMaterialAccess,
            json!({ "username": "bob", "materialId": "not-a-uuid" }),
        );
        assert!(handle_service_message(&app.state, &grant).await.is_err());
    }

    #[tokio::test]
    async fn review_response_fills_the_cache() {
        let app = test_app().await;
        let id = Uuid::now_v7().to_string();

        assert_eq!(app.state.reviews.get_review(&id).await, None);
        assert_eq!(app.publisher.sent().len(), 1);

        let response = message(
            Operation::ResponseMaterialReviews,
            json!({ "materialId": id, "review": { "rating": 4.5 } }),
        );
        handle_service_message(&app.state, &response).await.unwrap();

        assert_eq!(
            app.state.reviews.get_review(&id).await,
            Some(json!({ "rating": 4.5 }))
        );
        assert_eq!(app.publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn course_contents_are_sent_to_courses_service() {
        let app = test_app().await;
        let m = sample_material(&app.state.db, "alice", 0.0).await;
        associate_course(&app.state.db, m.id, "c1").await.unwrap();
        sample_class(&app.state.db, "alice", "c1", 2).await;
        sample_class(&app.state.db, "alice", "c1", 1).await;

        let request = message(
            Operation::RequestAppClassesAndMaterials,
            json!({ "courseId": "c1" }),
        );
        handle_service_message(&app.state, &request).await.unwrap();

        let sent = app.publisher.sent();
        assert_eq!(sent.len(), 1);
        let (destination, reply) = &sent[0];
        assert_eq!(destination, "courses-microservice");
        assert_eq!(reply.operation_id, "responseAppClassesAndMaterials");
        assert_eq!(reply.message["courseId"], "c1");
        assert_eq!(reply.message["classes"][0]["order"], 1);
        assert_eq!(reply.message["classes"][1]["order"], 2);
        assert_eq!(reply.message["materials"][0]["id"], m.id.to_string());
    }

    #[tokio::test]
    async fn user_deletion_removes_records_and_blobs() {
        let app = test_app().await;
        let own = sample_material(&app.state.db, "alice", 1.0).await;
        let other = sample_material(&app.state.db, "bob", 1.0).await;
        add_purchaser(&app.state.db, other.id, "alice").await.unwrap();
        let class = sample_class(&app.state.db, "alice", "c1", 1).await;
        app.materials.seed(&own.file, 10);
        app.classes.seed(&class.file, 10);

        let deletion = message(
            Operation::NotificationUserDeletion,
            json!({ "username": "alice" }),
        );
        handle_service_message(&app.state, &deletion).await.unwrap();

        assert!(purchasers_of(&app.state.db, other.id).await.unwrap().is_empty());
        assert!(app.materials.keys().is_empty());
        assert!(app.classes.keys().is_empty());
    }

    #[tokio::test]
    async fn course_deletion_removes_its_classes() {
        let app = test_app().await;
        let class = sample_class(&app.state.db, "alice", "c9", 1).await;
        app.classes.seed(&class.file, 10);

        let deletion = message(Operation::NotificationDeleteCourse, json!({ "courseId": "c9" }));
        handle_service_message(&app.state, &deletion).await.unwrap();

        assert!(
            catalog::classes_of_course(&app.state.db, "c9")
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(app.classes.event_log(), vec![format!("delete {}", class.file)]);
    }

    #[tokio::test]
    async fn user_profiles_are_materialized_with_canonical_plans() {
        let app = test_app().await;
        let response = message(
            Operation::ResponseAppUsers,
            json!({ "users": [
                { "username": "alice", "email": "alice@example.com", "plan": "ADVANCED" },
                { "username": "bob", "email": "bob@example.com", "firstName": "Bob" }
            ] }),
        );
        handle_service_message(&app.state, &response).await.unwrap();

        let alice = materialized_user::Entity::find_by_id("alice".to_string())
            .one(&app.state.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.plan.as_deref(), Some("PREMIUM"));
        let bob = materialized_user::Entity::find_by_id("bob".to_string())
            .one(&app.state.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.first_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn unknown_and_outbound_tags_are_dropped() {
        let app = test_app().await;
        let unknown = ServiceMessage {
            operation_id: "somethingElse".into(),
            message: json!({}),
        };
        handle_service_message(&app.state, &unknown).await.unwrap();

        let outbound = message(Operation::NotificationNewClass, json!({}));
        handle_service_message(&app.state, &outbound).await.unwrap();

        assert!(app.publisher.sent().is_empty());
    }
}
