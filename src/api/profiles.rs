//! Profile endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::profile::{Profile, UpsertProfile},
};

use super::AuthenticatedUser;

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/profile",
    tag = "profiles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's profile, empty fields when never saved", body = Profile),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_my_profile(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
) -> AppResult<Json<Profile>> {
    let profile = state.services.profiles.get_own(actor.id).await?;
    Ok(Json(profile))
}

/// Create or update the caller's profile
#[utoipa::path(
    put,
    path = "/profile",
    tag = "profiles",
    security(("bearer_auth" = [])),
    request_body = UpsertProfile,
    responses(
        (status = 200, description = "Profile saved", body = Profile),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn update_my_profile(
    State(state): State<crate::AppState>,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(profile): Json<UpsertProfile>,
) -> AppResult<Json<Profile>> {
    profile.validate()?;

    let profile = state.services.profiles.upsert_own(actor.id, profile).await?;
    Ok(Json(profile))
}

/// Get any user's display profile
#[utoipa::path(
    get,
    path = "/profiles/{id}",
    tag = "profiles",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 404, description = "Profile not found")
    )
)]
pub async fn get_profile(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_actor): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Profile>> {
    let profile = state.services.profiles.get(id).await?;
    Ok(Json(profile))
}
