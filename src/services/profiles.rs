//! Profile service

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::profile::{Profile, UpsertProfile},
    repository::Repository,
};

#[derive(Clone)]
pub struct ProfilesService {
    repository: Repository,
}

impl ProfilesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// The caller's profile. Users who never saved one get an empty profile.
    pub async fn get_own(&self, user_id: Uuid) -> AppResult<Profile> {
        Ok(self
            .repository
            .profiles
            .get(user_id)
            .await?
            .unwrap_or(Profile {
                id: user_id,
                name: None,
                class: None,
            }))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Profile> {
        self.repository
            .profiles
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile for user {} not found", id)))
    }

    pub async fn upsert_own(&self, user_id: Uuid, profile: UpsertProfile) -> AppResult<Profile> {
        let profile = profile.into_profile(user_id);
        let saved = self.repository.profiles.upsert(&profile).await?;
        tracing::debug!(user_id = %user_id, "Profile saved");
        Ok(saved)
    }
}
