use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A video lesson belonging to a course.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "class")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub title: String,
    pub description: String,
    /// Position within the course, starting at 1.
    pub order: i32,

    /// Storage key of the video. Holds a placeholder while the upload is in flight.
    pub file: String,

    /// Opaque identifier owned by the courses service.
    #[sea_orm(indexed)]
    pub course_id: String,

    #[sea_orm(indexed)]
    pub creator: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
