//! Database side of uploads for classes and materials.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use uuid::Uuid;

use crate::entity::{class, material};
use crate::models::class::{ClassChanges, ClassDraft};
use crate::models::material::{MaterialChanges, MaterialDraft};
use crate::services::upload::RecordStore;

pub struct ClassRecords<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ClassRecords<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for ClassRecords<'_> {
    type Draft = ClassDraft;
    type Changes = ClassChanges;
    type Record = class::Model;

    fn storage_key(record: &class::Model) -> &str {
        &record.file
    }

    async fn insert_provisional(
        &self,
        draft: &ClassDraft,
        owner: &str,
        placeholder: &str,
    ) -> Result<class::Model, DbErr> {
        let now = Utc::now();
        class::ActiveModel {
            id: Set(Uuid::now_v7()),
            title: Set(draft.title.trim().to_string()),
            description: Set(draft.description.trim().to_string()),
            order: Set(draft.order),
            file: Set(placeholder.to_string()),
            course_id: Set(draft.course_id.clone()),
            creator: Set(owner.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await
    }

    async fn set_storage_key(&self, record: &class::Model, key: &str) -> Result<class::Model, DbErr> {
        class::ActiveModel {
            id: Set(record.id),
            file: Set(key.to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(self.db)
        .await
    }

    async fn remove(&self, record: &class::Model) -> Result<(), DbErr> {
        class::Entity::delete_by_id(record.id).exec(self.db).await?;
        Ok(())
    }

    async fn apply_changes(
        &self,
        record: &class::Model,
        changes: &ClassChanges,
        key: Option<&str>,
    ) -> Result<class::Model, DbErr> {
        let mut active = class::ActiveModel {
            id: Set(record.id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(title) = &changes.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = &changes.description {
            active.description = Set(description.trim().to_string());
        }
        if let Some(order) = changes.order {
            active.order = Set(order);
        }
        if let Some(key) = key {
            active.file = Set(key.to_string());
        }
        active.update(self.db).await
    }
}

pub struct MaterialRecords<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> MaterialRecords<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for MaterialRecords<'_> {
    type Draft = MaterialDraft;
    type Changes = MaterialChanges;
    type Record = material::Model;

    fn storage_key(record: &material::Model) -> &str {
        &record.file
    }

    async fn insert_provisional(
        &self,
        draft: &MaterialDraft,
        owner: &str,
        placeholder: &str,
    ) -> Result<material::Model, DbErr> {
        let now = Utc::now();
        material::ActiveModel {
            id: Set(Uuid::now_v7()),
            title: Set(draft.title.trim().to_string()),
            description: Set(draft.description.trim().to_string()),
            price: Set(draft.price),
            currency: Set(draft.currency.as_str().to_string()),
            kind: Set(draft.kind.as_str().to_string()),
            author: Set(owner.to_string()),
            file: Set(placeholder.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await
    }

    async fn set_storage_key(
        &self,
        record: &material::Model,
        key: &str,
    ) -> Result<material::Model, DbErr> {
        material::ActiveModel {
            id: Set(record.id),
            file: Set(key.to_string()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(self.db)
        .await
    }

    async fn remove(&self, record: &material::Model) -> Result<(), DbErr> {
        material::Entity::delete_by_id(record.id).exec(self.db).await?;
        Ok(())
    }

    async fn apply_changes(
        &self,
        record: &material::Model,
        changes: &MaterialChanges,
        key: Option<&str>,
    ) -> Result<material::Model, DbErr> {
        let mut active = material::ActiveModel {
            id: Set(record.id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(title) = &changes.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = &changes.description {
            active.description = Set(description.trim().to_string());
        }
        if let Some(price) = changes.price {
            active.price = Set(price);
        }
        if let Some(currency) = changes.currency {
            active.currency = Set(currency.as_str().to_string());
        }
        if let Some(kind) = changes.kind {
            active.kind = Set(kind.as_str().to_string());
        }
        if let Some(key) = key {
            active.file = Set(key.to_string());
        }
        active.update(self.db).await
    }
}
