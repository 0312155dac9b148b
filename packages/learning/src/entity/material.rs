use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A purchasable document.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "material")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub title: String,
    pub description: String,
    pub price: f64,
    /// `USD` or `EUR`.
    pub currency: String,
    /// One of: book, article, presentation, exercises.
    pub kind: String,

    #[sea_orm(indexed)]
    pub author: String,

    /// Storage key of the document. Holds a placeholder while the upload is in flight.
    pub file: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
