//! Profiles repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{error::AppResult, models::profile::Profile};

use super::ProfileStore;

#[derive(Clone)]
pub struct ProfilesRepository {
    pool: Pool<Postgres>,
}

impl ProfilesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for ProfilesRepository {
    async fn get(&self, id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT id, name, class FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn get_many(&self, ids: Vec<Uuid>) -> AppResult<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT id, name, class FROM profiles WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn upsert(&self, profile: &Profile) -> AppResult<Profile> {
        let saved = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, name, class, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, class = EXCLUDED.class, updated_at = NOW()
            RETURNING id, name, class
            "#,
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(&profile.class)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }
}
