//! Local copy of user profiles published by the users service.

use chrono::{DateTime, Duration, Utc};
use common::mq::UserProfile;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use crate::entity::materialized_user;

/// Profiles older than this many hours are refreshed from the users service.
pub const FRESHNESS_HOURS: i64 = 24;

pub fn is_fresh(insert_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - insert_date < Duration::hours(FRESHNESS_HOURS)
}

/// Known profiles for `usernames` that are still fresh at `now`.
pub async fn fresh_profiles<C: ConnectionTrait>(
    conn: &C,
    usernames: &[String],
    now: DateTime<Utc>,
) -> Result<Vec<materialized_user::Model>, DbErr> {
    if usernames.is_empty() {
        return Ok(Vec::new());
    }
    let profiles = materialized_user::Entity::find()
        .filter(materialized_user::Column::Username.is_in(usernames.iter().cloned()))
        .all(conn)
        .await?;
    Ok(profiles
        .into_iter()
        .filter(|p| is_fresh(p.insert_date, now))
        .collect())
}

/// Usernames without a fresh local profile.
pub fn missing_usernames(
    usernames: &[String],
    fresh: &[materialized_user::Model],
) -> Vec<String> {
    usernames
        .iter()
        .filter(|name| !fresh.iter().any(|p| &p.username == *name))
        .cloned()
        .collect()
}

/// Insert or refresh profiles, stamping them with `now`.
///
/// A username repeated in `profiles` is stored once, from its last entry.
pub async fn upsert_profiles<C: ConnectionTrait>(
    conn: &C,
    profiles: &[UserProfile],
    now: DateTime<Utc>,
) -> Result<(), DbErr> {
    if profiles.is_empty() {
        return Ok(());
    }

    let mut latest: Vec<&UserProfile> = Vec::with_capacity(profiles.len());
    for profile in profiles {
        match latest.iter_mut().find(|p| p.username == profile.username) {
            Some(slot) => *slot = profile,
            None => latest.push(profile),
        }
    }

    let rows = latest.into_iter().map(|p| materialized_user::ActiveModel {
        username: Set(p.username.clone()),
        email: Set(p.email.clone()),
        first_name: Set(p.first_name.clone()),
        last_name: Set(p.last_name.clone()),
        profile_picture: Set(p.profile_picture.clone()),
        plan: Set(p.plan.clone()),
        insert_date: Set(now),
    });

    materialized_user::Entity::insert_many(rows)
        .on_conflict(
            OnConflict::column(materialized_user::Column::Username)
                .update_columns([
                    materialized_user::Column::Email,
                    materialized_user::Column::FirstName,
                    materialized_user::Column::LastName,
                    materialized_user::Column::ProfilePicture,
                    materialized_user::Column::Plan,
                    materialized_user::Column::InsertDate,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}
