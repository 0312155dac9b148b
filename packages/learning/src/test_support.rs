//! In-memory collaborators shared by unit tests.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::config::MqAppConfig;
use common::mq::ServiceMessage;
use common::storage::{BlobStore, BoxReader, ObjectSummary, StorageError, validate_key};
use mq::MqError;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    Schema, Set,
};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::config::{
    AppConfig, AuthConfig, CacheBackend, CacheConfig, CorsConfig, DatabaseConfig, ServerConfig,
    ServicesConfig, StorageBackend, StorageConfig,
};
use crate::entity::{class, material, material_course, material_purchaser, materialized_user};
use crate::services::relay::{NotificationRelay, Publisher};
use crate::services::review::{MemoryReviewCache, ReviewService};
use crate::services::upload::{IncomingFile, RecordChanges, RecordDraft, RecordStore};
use crate::state::AppState;

pub const TEST_JWT_SECRET: &str = "test-secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors: CorsConfig {
                allow_origins: vec!["*".into()],
                max_age: 60,
            },
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".into(),
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.into(),
            token_ttl_secs: 3600,
        },
        storage: StorageConfig {
            backend: StorageBackend::Filesystem,
            classes_bucket: "classes-bucket".into(),
            materials_bucket: "materials-bucket".into(),
            local_root: "./data/blobs".into(),
            public_base_url: "http://127.0.0.1/files".into(),
            signing_secret: "signing".into(),
            s3: None,
            signed_url_ttl_secs: 12 * 60 * 60,
            max_class_upload: 400 * 1024 * 1024,
            max_material_upload: 20 * 1024 * 1024,
            class_content_types: vec!["video/mp4".into()],
            material_content_types: Vec::new(),
        },
        cache: CacheConfig {
            backend: CacheBackend::Memory,
            url: String::new(),
            review_ttl_secs: 5 * 60 * 60,
        },
        mq: MqAppConfig::default(),
        services: ServicesConfig {
            courses: "courses-microservice".into(),
            reviews: "reviews-microservice".into(),
            users: "users-microservice".into(),
        },
    }
}

/// Application state wired to in-memory collaborators.
pub struct TestApp {
    pub state: AppState,
    pub publisher: Arc<RecordingPublisher>,
    pub classes: Arc<TestStore>,
    pub materials: Arc<TestStore>,
}

pub async fn test_app() -> TestApp {
    let config = test_config();
    let publisher = Arc::new(RecordingPublisher::default());
    let relay = NotificationRelay::new(publisher.clone());
    let reviews = ReviewService::new(
        Arc::new(MemoryReviewCache::new()),
        relay.clone(),
        config.services.reviews.clone(),
        config.cache.review_ttl(),
    );
    let classes = Arc::new(TestStore::new());
    let materials = Arc::new(TestStore::new());
    let state = AppState {
        db: memory_db().await,
        config: Arc::new(config),
        class_store: classes.clone(),
        material_store: materials.clone(),
        local_files: None,
        reviews,
        relay,
    };
    TestApp {
        state,
        publisher,
        classes,
        materials,
    }
}

/// Fresh in-memory SQLite database with every table created.
pub async fn memory_db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let tables = [
        schema.create_table_from_entity(class::Entity),
        schema.create_table_from_entity(material::Entity),
        schema.create_table_from_entity(material_course::Entity),
        schema.create_table_from_entity(material_purchaser::Entity),
        schema.create_table_from_entity(materialized_user::Entity),
    ];
    for table in &tables {
        db.execute_raw(backend.build(table)).await.unwrap();
    }
    db
}

pub async fn sample_material(db: &DatabaseConnection, author: &str, price: f64) -> material::Model {
    let now = Utc::now();
    let id = Uuid::now_v7();
    material::ActiveModel {
        id: Set(id),
        title: Set("Notes".into()),
        description: Set("Lecture notes".into()),
        price: Set(price),
        currency: Set("EUR".into()),
        kind: Set("article".into()),
        author: Set(author.to_string()),
        file: Set(format!("{author}-{id}-notes.pdf")),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn sample_class(
    db: &DatabaseConnection,
    creator: &str,
    course_id: &str,
    order: i32,
) -> class::Model {
    let now = Utc::now();
    let id = Uuid::now_v7();
    class::ActiveModel {
        id: Set(id),
        title: Set(format!("Lesson {order}")),
        description: Set("Recorded lesson".into()),
        order: Set(order),
        file: Set(format!("{creator}-{id}-lesson.mp4")),
        course_id: Set(course_id.to_string()),
        creator: Set(creator.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

fn push(events: &EventLog, event: String) {
    events.lock().unwrap().push(event);
}

pub fn bytes_file(name: &str, content_type: &str, data: Vec<u8>) -> IncomingFile {
    IncomingFile {
        original_name: name.to_string(),
        content_type: content_type.to_string(),
        size: data.len() as u64,
        reader: Box::new(Cursor::new(data)),
    }
}

struct StoredObject {
    size: u64,
    data: Vec<u8>,
}

/// Bucket kept in memory, with switchable failures.
pub struct TestStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_put: AtomicBool,
    fail_list: AtomicBool,
    fail_sign: AtomicBool,
    list_calls: AtomicUsize,
    events: EventLog,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            fail_put: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            fail_sign: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            events: EventLog::default(),
        }
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }

    pub fn event_log(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Register an object of `size` bytes without holding its content.
    pub fn seed(&self, key: &str, size: u64) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                size,
                data: Vec::new(),
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sign(&self, fail: bool) {
        self.fail_sign.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for TestStore {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("listing unavailable".into()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                size: object.size,
            })
            .collect())
    }

    async fn put_stream(
        &self,
        key: &str,
        mut reader: BoxReader,
        _content_type: &str,
    ) -> Result<u64, StorageError> {
        validate_key(key)?;
        if self.fail_put.load(Ordering::SeqCst) {
            push(&self.events, format!("rejected put {key}"));
            return Err(StorageError::Backend("connection reset".into()));
        }
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let size = data.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredObject { size, data });
        push(&self.events, format!("put {key}"));
        Ok(size)
    }

    async fn get_stream(&self, key: &str) -> Result<BoxReader, StorageError> {
        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(object.data.clone())))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let removed = self.objects.lock().unwrap().remove(key).is_some();
        push(&self.events, format!("delete {key}"));
        Ok(removed)
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, StorageError> {
        if self.fail_sign.load(Ordering::SeqCst) {
            return Err(StorageError::Signing("signer offline".into()));
        }
        if !self.objects.lock().unwrap().contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!(
            "https://blobs.test/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: u32,
    pub owner: String,
    pub title: String,
    pub file: String,
}

pub struct NoteDraft {
    pub title: String,
}

impl NoteDraft {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
        }
    }
}

impl RecordDraft for NoteDraft {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Missing required fields: title".into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct NoteChanges {
    pub title: Option<String>,
}

impl RecordChanges for NoteChanges {
    fn validate(&self) -> Result<(), String> {
        match &self.title {
            Some(title) if title.trim().is_empty() => Err("title must not be empty".into()),
            _ => Ok(()),
        }
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
    }
}

/// Record table kept in memory.
pub struct MemoryRecords {
    rows: Mutex<BTreeMap<u32, Note>>,
    next_id: AtomicU32,
    fail_insert: AtomicBool,
    fail_update: AtomicBool,
    events: EventLog,
}

impl MemoryRecords {
    pub fn with_events(events: EventLog) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            fail_insert: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            events,
        }
    }

    pub fn get(&self, id: u32) -> Option<Note> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().unwrap().is_empty()
    }

    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    fn check_update(&self) -> Result<(), DbErr> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(DbErr::Custom("database unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    type Draft = NoteDraft;
    type Changes = NoteChanges;
    type Record = Note;

    fn storage_key(record: &Note) -> &str {
        &record.file
    }

    async fn insert_provisional(
        &self,
        draft: &NoteDraft,
        owner: &str,
        placeholder: &str,
    ) -> Result<Note, DbErr> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(DbErr::Custom("database unavailable".into()));
        }
        let note = Note {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            owner: owner.to_string(),
            title: draft.title.clone(),
            file: placeholder.to_string(),
        };
        self.rows.lock().unwrap().insert(note.id, note.clone());
        push(&self.events, format!("insert {placeholder}"));
        Ok(note)
    }

    async fn set_storage_key(&self, record: &Note, key: &str) -> Result<Note, DbErr> {
        self.check_update()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&record.id)
            .ok_or_else(|| DbErr::RecordNotFound(record.id.to_string()))?;
        row.file = key.to_string();
        push(&self.events, format!("finalize {key}"));
        Ok(row.clone())
    }

    async fn remove(&self, record: &Note) -> Result<(), DbErr> {
        self.rows.lock().unwrap().remove(&record.id);
        push(&self.events, format!("remove {}", record.id));
        Ok(())
    }

    async fn apply_changes(
        &self,
        record: &Note,
        changes: &NoteChanges,
        key: Option<&str>,
    ) -> Result<Note, DbErr> {
        self.check_update()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&record.id)
            .ok_or_else(|| DbErr::RecordNotFound(record.id.to_string()))?;
        if let Some(title) = &changes.title {
            row.title = title.clone();
        }
        if let Some(key) = key {
            row.file = key.to_string();
        }
        push(&self.events, format!("update {}", row.file));
        Ok(row.clone())
    }
}

/// Publisher that records every message instead of sending it.
#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, ServiceMessage)>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn sent(&self) -> Vec<(String, ServiceMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, destination: &str, message: &ServiceMessage) -> Result<(), MqError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MqError::Internal("broker unreachable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), message.clone()));
        Ok(())
    }
}
