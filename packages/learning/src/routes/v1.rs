use utoipa_axum::{router::OpenApiRouter, routes};

use crate::config::AppConfig;
use crate::handlers::{classes, materials};
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/classes", class_routes(config))
        .nest("/materials", material_routes(config))
}

fn class_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(classes::check))
        .routes(routes!(
            classes::get_class,
            classes::update_class,
            classes::delete_class
        ))
        .routes(routes!(
            classes::list_course_classes,
            classes::create_class
        ))
        .layer(classes::class_upload_body_limit(
            config.storage.max_class_upload,
        ))
}

fn material_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(materials::check))
        .routes(routes!(materials::list_materials, materials::create_material))
        .routes(routes!(materials::list_my_materials))
        .routes(routes!(
            materials::get_material,
            materials::update_material,
            materials::delete_material
        ))
        .routes(routes!(materials::list_material_purchasers))
        .routes(routes!(materials::associate_material))
        .routes(routes!(materials::disassociate_material))
        .layer(materials::material_upload_body_limit(
            config.storage.max_material_upload,
        ))
}
