use std::time::Duration;

use common::config::MqAppConfig;
use common::storage::s3::S3StorageConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Lifetime of the token re-issued on every authenticated response.
    pub token_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Filesystem,
    S3,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub classes_bucket: String,
    pub materials_bucket: String,
    /// Root directory for the filesystem backend.
    pub local_root: String,
    /// Base URL used when signing filesystem-backed objects.
    pub public_base_url: String,
    pub signing_secret: String,
    pub s3: Option<S3StorageConfig>,
    /// Lifetime of signed read URLs. Default: 12 hours.
    pub signed_url_ttl_secs: u64,
    /// Transport ceiling for class video uploads, in bytes.
    pub max_class_upload: u64,
    /// Transport ceiling for material document uploads, in bytes.
    pub max_material_upload: u64,
    pub class_content_types: Vec<String>,
    /// Empty means any content type is accepted.
    pub material_content_types: Vec<String>,
}

impl StorageConfig {
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub url: String,
    /// Lifetime of cached reviews. Default: 5 hours.
    pub review_ttl_secs: u64,
}

impl CacheConfig {
    pub fn review_ttl(&self) -> Duration {
        Duration::from_secs(self.review_ttl_secs)
    }
}

/// Names of the peer microservices; each one consumes a queue of the same name.
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub courses: String,
    pub reviews: String,
    pub users: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    pub services: ServicesConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000)?
            .set_default("server.cors.allow_origins", vec!["*"])?
            .set_default("server.cors.max_age", 3600)?
            .set_default("auth.token_ttl_secs", 7 * 24 * 60 * 60)?
            .set_default("storage.backend", "filesystem")?
            .set_default("storage.classes_bucket", "classes-bucket")?
            .set_default("storage.materials_bucket", "materials-bucket")?
            .set_default("storage.local_root", "./data/blobs")?
            .set_default("storage.public_base_url", "http://127.0.0.1:8000/files")?
            .set_default("storage.signing_secret", "change-me")?
            .set_default("storage.signed_url_ttl_secs", 12 * 60 * 60)?
            .set_default("storage.max_class_upload", 5_u64 * 1024 * 1024 * 1024)?
            .set_default("storage.max_material_upload", 20 * 1024 * 1024)?
            .set_default(
                "storage.class_content_types",
                vec!["video/mp4", "video/mpeg", "video/quicktime"],
            )?
            .set_default("storage.material_content_types", Vec::<String>::new())?
            .set_default("cache.backend", "redis")?
            .set_default("cache.url", "redis://localhost:6379")?
            .set_default("cache.review_ttl_secs", 5 * 60 * 60)?
            .set_default("services.courses", "courses-microservice")?
            .set_default("services.reviews", "reviews-microservice")?
            .set_default("services.users", "users-microservice")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., LEARNING__AUTH__JWT_SECRET)
            .add_source(
                Environment::with_prefix("LEARNING")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors.allow_origins")
                    .with_list_parse_key("storage.class_content_types")
                    .with_list_parse_key("storage.material_content_types")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
