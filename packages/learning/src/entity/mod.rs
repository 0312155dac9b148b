pub mod class;
pub mod material;
pub mod material_course;
pub mod material_purchaser;
pub mod materialized_user;
