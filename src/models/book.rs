//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::profile::Profile;

/// Availability of a book. Only the borrow workflow writes this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Borrowed,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "available",
            BookStatus::Borrowed => "borrowed",
        }
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(BookStatus::Available),
            "borrowed" => Ok(BookStatus::Borrowed),
            _ => Err(format!("Invalid book status: {}", s)),
        }
    }
}

// Stored as TEXT
impl sqlx::Type<Postgres> for BookStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for BookStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BookStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Book record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub synopsis: Option<String>,
    pub cover_url: Option<String>,
    pub status: BookStatus,
    pub created_at: DateTime<Utc>,
}

/// Book together with its owner's display profile
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookWithOwner {
    #[serde(flatten)]
    pub book: Book,
    pub owner: Option<Profile>,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: String,
    pub author: Option<String>,
    pub genre: Option<String>,
    #[validate(length(max = 5000, message = "Synopsis is too long"))]
    pub synopsis: Option<String>,
    #[validate(url(message = "Invalid cover URL"))]
    pub cover_url: Option<String>,
}

/// Update book request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    #[validate(length(max = 5000, message = "Synopsis is too long"))]
    pub synopsis: Option<String>,
    #[validate(url(message = "Invalid cover URL"))]
    pub cover_url: Option<String>,
}

impl CreateBook {
    /// Trim text fields, turning blank optional fields into `None`
    pub fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            author: non_blank(self.author),
            genre: non_blank(self.genre),
            synopsis: non_blank(self.synopsis),
            cover_url: non_blank(self.cover_url),
        }
    }
}

impl UpdateBook {
    pub fn normalized(self) -> Self {
        Self {
            title: self.title.map(|t| t.trim().to_string()),
            author: self.author.map(|s| s.trim().to_string()),
            genre: self.genre.map(|s| s.trim().to_string()),
            synopsis: self.synopsis.map(|s| s.trim().to_string()),
            cover_url: self.cover_url.map(|s| s.trim().to_string()),
        }
    }

    /// Apply the present fields onto `book`. Empty strings clear optional fields.
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(ref title) = self.title {
            book.title = title.clone();
        }
        if let Some(ref author) = self.author {
            book.author = non_blank(Some(author.clone()));
        }
        if let Some(ref genre) = self.genre {
            book.genre = non_blank(Some(genre.clone()));
        }
        if let Some(ref synopsis) = self.synopsis {
            book.synopsis = non_blank(Some(synopsis.clone()));
        }
        if let Some(ref cover_url) = self.cover_url {
            book.cover_url = non_blank(Some(cover_url.clone()));
        }
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Filter for book listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookFilter {
    pub owner_id: Option<Uuid>,
    pub exclude_owner_id: Option<Uuid>,
    pub ids: Option<Vec<Uuid>>,
}

impl BookFilter {
    pub fn matches(&self, book: &Book) -> bool {
        self.owner_id.map_or(true, |id| book.owner_id == id)
            && self.exclude_owner_id.map_or(true, |id| book.owner_id != id)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&book.id))
    }
}
