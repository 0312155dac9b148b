use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Local copy of a user profile published by the users service.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "materialized_user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,

    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_picture: Option<String>,
    pub plan: Option<String>,

    /// When this copy was last refreshed. Entries older than a day are stale.
    pub insert_date: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
