//! Queries and cascades over classes, materials and their associations.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{class, material, material_course, material_purchaser};
use crate::utils::keys::PLACEHOLDER_KEY;

/// Finalized classes of a course in lesson order.
pub async fn classes_of_course<C: ConnectionTrait>(
    conn: &C,
    course_id: &str,
) -> Result<Vec<class::Model>, DbErr> {
    class::Entity::find()
        .filter(class::Column::CourseId.eq(course_id))
        .filter(class::Column::File.ne(PLACEHOLDER_KEY))
        .order_by_asc(class::Column::Order)
        .all(conn)
        .await
}

/// Finalized materials associated with a course.
pub async fn materials_of_course<C: ConnectionTrait>(
    conn: &C,
    course_id: &str,
) -> Result<Vec<material::Model>, DbErr> {
    let ids: Vec<Uuid> = material_course::Entity::find()
        .select_only()
        .column(material_course::Column::MaterialId)
        .filter(material_course::Column::CourseId.eq(course_id))
        .into_tuple()
        .all(conn)
        .await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    material::Entity::find()
        .filter(material::Column::Id.is_in(ids))
        .filter(material::Column::File.ne(PLACEHOLDER_KEY))
        .order_by_asc(material::Column::CreatedAt)
        .all(conn)
        .await
}

pub async fn purchasers_of<C: ConnectionTrait>(
    conn: &C,
    material_id: Uuid,
) -> Result<Vec<String>, DbErr> {
    material_purchaser::Entity::find()
        .select_only()
        .column(material_purchaser::Column::Username)
        .filter(material_purchaser::Column::MaterialId.eq(material_id))
        .order_by_asc(material_purchaser::Column::CreatedAt)
        .into_tuple()
        .all(conn)
        .await
}

pub async fn courses_of<C: ConnectionTrait>(
    conn: &C,
    material_id: Uuid,
) -> Result<Vec<String>, DbErr> {
    material_course::Entity::find()
        .select_only()
        .column(material_course::Column::CourseId)
        .filter(material_course::Column::MaterialId.eq(material_id))
        .into_tuple()
        .all(conn)
        .await
}

pub async fn is_purchaser<C: ConnectionTrait>(
    conn: &C,
    material_id: Uuid,
    username: &str,
) -> Result<bool, DbErr> {
    let count = material_purchaser::Entity::find()
        .filter(material_purchaser::Column::MaterialId.eq(material_id))
        .filter(material_purchaser::Column::Username.eq(username))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// Grant `username` access to a material. Granting twice has no further effect.
///
/// Returns `false` when the material does not exist.
pub async fn add_purchaser<C: ConnectionTrait>(
    conn: &C,
    material_id: Uuid,
    username: &str,
) -> Result<bool, DbErr> {
    if material::Entity::find_by_id(material_id)
        .one(conn)
        .await?
        .is_none()
    {
        return Ok(false);
    }

    material_purchaser::Entity::insert(material_purchaser::ActiveModel {
        material_id: Set(material_id),
        username: Set(username.to_string()),
        created_at: Set(Utc::now()),
    })
    .on_conflict(
        OnConflict::columns([
            material_purchaser::Column::MaterialId,
            material_purchaser::Column::Username,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;
    Ok(true)
}

pub async fn associate_course<C: ConnectionTrait>(
    conn: &C,
    material_id: Uuid,
    course_id: &str,
) -> Result<(), DbErr> {
    material_course::Entity::insert(material_course::ActiveModel {
        material_id: Set(material_id),
        course_id: Set(course_id.to_string()),
    })
    .on_conflict(
        OnConflict::columns([
            material_course::Column::MaterialId,
            material_course::Column::CourseId,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;
    Ok(())
}

pub async fn disassociate_course<C: ConnectionTrait>(
    conn: &C,
    material_id: Uuid,
    course_id: &str,
) -> Result<(), DbErr> {
    material_course::Entity::delete_many()
        .filter(material_course::Column::MaterialId.eq(material_id))
        .filter(material_course::Column::CourseId.eq(course_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Delete a material together with its purchaser and course rows.
pub async fn delete_material(conn: &DatabaseConnection, material_id: Uuid) -> Result<(), DbErr> {
    let txn = conn.begin().await?;
    delete_material_rows(&txn, &[material_id]).await?;
    txn.commit().await
}

async fn delete_material_rows<C: ConnectionTrait>(conn: &C, ids: &[Uuid]) -> Result<(), DbErr> {
    if ids.is_empty() {
        return Ok(());
    }
    material_purchaser::Entity::delete_many()
        .filter(material_purchaser::Column::MaterialId.is_in(ids.iter().copied()))
        .exec(conn)
        .await?;
    material_course::Entity::delete_many()
        .filter(material_course::Column::MaterialId.is_in(ids.iter().copied()))
        .exec(conn)
        .await?;
    material::Entity::delete_many()
        .filter(material::Column::Id.is_in(ids.iter().copied()))
        .exec(conn)
        .await?;
    Ok(())
}

/// Records removed by a cascade, returned so their blobs can be cleaned up.
#[derive(Debug, Default)]
pub struct Removed {
    pub classes: Vec<class::Model>,
    pub materials: Vec<material::Model>,
    pub purchases_revoked: u64,
    pub associations_removed: u64,
}

/// Forget a deleted user: revoke their purchases and delete what they authored.
pub async fn remove_user(conn: &DatabaseConnection, username: &str) -> Result<Removed, DbErr> {
    let txn = conn.begin().await?;

    let revoked = material_purchaser::Entity::delete_many()
        .filter(material_purchaser::Column::Username.eq(username))
        .exec(&txn)
        .await?;

    let materials = material::Entity::find()
        .filter(material::Column::Author.eq(username))
        .all(&txn)
        .await?;
    let material_ids: Vec<Uuid> = materials.iter().map(|m| m.id).collect();
    delete_material_rows(&txn, &material_ids).await?;

    let classes = class::Entity::find()
        .filter(class::Column::Creator.eq(username))
        .all(&txn)
        .await?;
    class::Entity::delete_many()
        .filter(class::Column::Creator.eq(username))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    Ok(Removed {
        classes,
        materials,
        purchases_revoked: revoked.rows_affected,
        associations_removed: 0,
    })
}

/// Forget a deleted course: detach its materials and delete its classes.
pub async fn remove_course(conn: &DatabaseConnection, course_id: &str) -> Result<Removed, DbErr> {
    let txn = conn.begin().await?;

    let detached = material_course::Entity::delete_many()
        .filter(material_course::Column::CourseId.eq(course_id))
        .exec(&txn)
        .await?;

    let classes = classes_of_course(&txn, course_id).await?;
    class::Entity::delete_many()
        .filter(class::Column::CourseId.eq(course_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    Ok(Removed {
        classes,
        materials: Vec::new(),
        purchases_revoked: 0,
        associations_removed: detached.rows_affected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::class::ClassDraft;
    use crate::models::material::{Currency, MaterialDraft, MaterialKind};
    use crate::services::records::{ClassRecords, MaterialRecords};
    use crate::services::upload::RecordStore;
    use crate::test_support::{memory_db, sample_class, sample_material};

    #[tokio::test]
    async fn adding_a_purchaser_twice_keeps_one_entry() {
        let db = memory_db().await;
        let m = sample_material(&db, "alice", 5.0).await;

        assert!(add_purchaser(&db, m.id, "bob").await.unwrap());
        assert!(add_purchaser(&db, m.id, "bob").await.unwrap());

        assert_eq!(purchasers_of(&db, m.id).await.unwrap(), vec!["bob"]);
        assert!(is_purchaser(&db, m.id, "bob").await.unwrap());
        assert!(!is_purchaser(&db, m.id, "carol").await.unwrap());
    }

    #[tokio::test]
    async fn purchaser_for_unknown_material_is_ignored() {
        let db = memory_db().await;
        assert!(!add_purchaser(&db, Uuid::now_v7(), "bob").await.unwrap());
    }

    #[tokio::test]
    async fn removing_a_user_cascades() {
        let db = memory_db().await;
        let own = sample_material(&db, "alice", 1.0).await;
        let bought = sample_material(&db, "bob", 2.0).await;
        add_purchaser(&db, bought.id, "alice").await.unwrap();
        add_purchaser(&db, bought.id, "carol").await.unwrap();
        add_purchaser(&db, own.id, "carol").await.unwrap();
        sample_class(&db, "alice", "c1", 1).await;
        sample_class(&db, "bob", "c1", 2).await;

        let removed = remove_user(&db, "alice").await.unwrap();

        assert_eq!(removed.materials.len(), 1);
        assert_eq!(removed.classes.len(), 1);
        assert_eq!(removed.purchases_revoked, 1);
        assert_eq!(purchasers_of(&db, bought.id).await.unwrap(), vec!["carol"]);
        assert!(material::Entity::find_by_id(own.id).one(&db).await.unwrap().is_none());
        assert!(purchasers_of(&db, own.id).await.unwrap().is_empty());
        assert_eq!(classes_of_course(&db, "c1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removing_a_course_detaches_materials_and_drops_classes() {
        let db = memory_db().await;
        let m = sample_material(&db, "alice", 0.0).await;
        associate_course(&db, m.id, "c1").await.unwrap();
        associate_course(&db, m.id, "c2").await.unwrap();
        sample_class(&db, "alice", "c1", 1).await;
        sample_class(&db, "alice", "c1", 2).await;
        sample_class(&db, "alice", "c2", 1).await;

        let removed = remove_course(&db, "c1").await.unwrap();

        assert_eq!(removed.classes.len(), 2);
        assert_eq!(removed.associations_removed, 1);
        assert_eq!(courses_of(&db, m.id).await.unwrap(), vec!["c2"]);
        assert!(materials_of_course(&db, "c1").await.unwrap().is_empty());
        assert_eq!(materials_of_course(&db, "c2").await.unwrap().len(), 1);
        assert!(classes_of_course(&db, "c1").await.unwrap().is_empty());
        assert!(material::Entity::find_by_id(m.id).one(&db).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn association_is_idempotent_and_reversible() {
        let db = memory_db().await;
        let m = sample_material(&db, "alice", 0.0).await;
        associate_course(&db, m.id, "c1").await.unwrap();
        associate_course(&db, m.id, "c1").await.unwrap();
        assert_eq!(courses_of(&db, m.id).await.unwrap(), vec!["c1"]);

        disassociate_course(&db, m.id, "c1").await.unwrap();
        assert!(courses_of(&db, m.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_material_removes_its_rows() {
        let db = memory_db().await;
        let m = sample_material(&db, "alice", 3.0).await;
        add_purchaser(&db, m.id, "bob").await.unwrap();
        associate_course(&db, m.id, "c1").await.unwrap();

        delete_material(&db, m.id).await.unwrap();

        assert!(material::Entity::find_by_id(m.id).one(&db).await.unwrap().is_none());
        assert!(purchasers_of(&db, m.id).await.unwrap().is_empty());
        assert!(courses_of(&db, m.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_uploads_are_left_out_of_course_listings() {
        let db = memory_db().await;
        let class_draft = ClassDraft {
            title: "Intro".into(),
            description: "First lesson".into(),
            order: 1,
            course_id: "c1".into(),
        };
        ClassRecords::new(&db)
            .insert_provisional(&class_draft, "alice", PLACEHOLDER_KEY)
            .await
            .unwrap();
        let material_draft = MaterialDraft {
            title: "Notes".into(),
            description: "Lecture notes".into(),
            price: 0.0,
            currency: Currency::Usd,
            kind: MaterialKind::Article,
        };
        let pending = MaterialRecords::new(&db)
            .insert_provisional(&material_draft, "alice", PLACEHOLDER_KEY)
            .await
            .unwrap();
        associate_course(&db, pending.id, "c1").await.unwrap();

        assert!(classes_of_course(&db, "c1").await.unwrap().is_empty());
        assert!(materials_of_course(&db, "c1").await.unwrap().is_empty());

        sample_class(&db, "alice", "c1", 2).await;
        let done = sample_material(&db, "alice", 1.0).await;
        associate_course(&db, done.id, "c1").await.unwrap();

        assert_eq!(classes_of_course(&db, "c1").await.unwrap().len(), 1);
        let materials = materials_of_course(&db, "c1").await.unwrap();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].id, done.id);
    }
}
