use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Association between a material and a course of the courses service.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "material_course")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub material_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub course_id: String,
}

impl ActiveModelBehavior for ActiveModel {}
