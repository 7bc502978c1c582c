//! Profile model: display metadata for a user identity

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::book::non_blank;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    /// Free-text grouping label, e.g. a school class
    pub class: Option<String>,
}

impl Profile {
    /// Trimmed name, if any
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Upsert own profile request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpsertProfile {
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 50, message = "Class must be at most 50 characters"))]
    pub class: Option<String>,
}

impl UpsertProfile {
    pub fn into_profile(self, id: Uuid) -> Profile {
        Profile {
            id,
            name: non_blank(self.name),
            class: non_blank(self.class),
        }
    }
}
