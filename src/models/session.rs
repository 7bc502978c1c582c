//! Session tokens issued by the hosted identity provider

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims of a user session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User identity
    pub sub: Uuid,
    pub email: Option<String>,
    pub aud: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl SessionClaims {
    /// Create a new signed token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and validate a token (signature, expiry, audience)
    pub fn from_token(
        token: &str,
        secret: &str,
        audience: &str,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let mut validation = Validation::default();
        validation.set_audience(&[audience]);
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;
        Ok(token_data.claims)
    }
}

/// Authenticated caller of a workflow operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub email: Option<String>,
    /// Bearer token of the session, forwarded to the notification endpoint
    pub token: String,
}

impl Actor {
    pub fn new(id: Uuid, email: Option<String>, token: impl Into<String>) -> Self {
        Self {
            id,
            email,
            token: token.into(),
        }
    }

    /// Local part of the email address, used when the user has no profile name
    pub fn email_handle(&self) -> Option<&str> {
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|s| !s.is_empty())
    }
}
