use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{AdapterError, AdapterResult};

/// Stored user as handed back to the framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String, // generated username
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub email_verified: Option<OffsetDateTime>,
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// `createUser` input. Fields are optional because providers do not all
/// return them; `validate` decides what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub email_verified: Option<OffsetDateTime>,
    pub image: Option<String>,
}

/// A `NewUser` that passed boundary validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidNewUser {
    pub name: Option<String>,
    pub email: String,
    pub email_verified: Option<OffsetDateTime>,
    pub image: Option<String>,
}

impl NewUser {
    pub fn validate(self) -> AdapterResult<ValidNewUser> {
        let email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AdapterError::validation("email is required"))?;
        Ok(ValidNewUser {
            name: self
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            email,
            email_verified: self.email_verified,
            image: self.image,
        })
    }
}

/// Partial user update. Outer `None` leaves a column alone; for nullable
/// columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<Option<OffsetDateTime>>,
    pub image: Option<Option<String>>,
}

impl UserUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> AdapterResult<()> {
        // Only presence is checked; the local part may be empty.
        if matches!(&self.email, Some(e) if e.trim().is_empty()) {
            return Err(AdapterError::validation("email must not be empty"));
        }
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(AdapterError::validation("name must not be empty"));
        }
        Ok(())
    }
}

/// `linkAccount` input, in the framework's field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterAccount {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub provider: String,
    #[serde(rename = "providerAccountId")]
    pub provider_account_id: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<i64>, // unix seconds
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
    pub session_state: Option<String>,
}

impl AdapterAccount {
    pub fn key(&self) -> ProviderAccountKey {
        ProviderAccountKey {
            provider: self.provider.clone(),
            provider_account_id: self.provider_account_id.clone(),
        }
    }
}

/// Linked account with its storage identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(flatten)]
    pub account: AdapterAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccountKey {
    pub provider: String,
    pub provider_account_id: String,
}

impl ProviderAccountKey {
    pub fn new(provider: impl Into<String>, provider_account_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            provider_account_id: provider_account_id.into(),
        }
    }
}

/// `createSession` input. `expires` is stored in UTC at millisecond
/// precision, so the returned session carries `timestamps::normalize(expires)`
/// rather than the exact value passed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_token: String,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSession {
    pub id: String,
    pub session_token: String,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub session_token: String,
    pub user_id: Option<String>,
    pub expires: Option<OffsetDateTime>,
}

impl SessionUpdate {
    pub(crate) fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.expires.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAndUser {
    pub session: AdapterSession,
    pub user: User,
}

/// `expires` is normalized the same way as session expiry when stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub identifier: String, // usually the email address
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

impl VerificationToken {
    pub fn key(&self) -> VerificationTokenKey {
        VerificationTokenKey {
            identifier: self.identifier.clone(),
            token: self.token.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationTokenKey {
    pub identifier: String,
    pub token: String,
}
