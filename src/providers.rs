//! OAuth providers the deployment signs users in with, and the boundary
//! validation of the profile payloads they return.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::dto::NewUser;
use crate::error::{AdapterError, AdapterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    #[serde(rename = "github")]
    GitHub,
    Google,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 2] = [OAuthProvider::GitHub, OAuthProvider::Google];

    /// Value stored in `Account.provider`.
    pub fn id(self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "github",
            OAuthProvider::Google => "google",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }

    /// Prefix of the `<PREFIX>_CLIENT_ID` / `<PREFIX>_CLIENT_SECRET` variables.
    pub fn env_prefix(self) -> &'static str {
        match self {
            OAuthProvider::GitHub => "AUTH_GITHUB",
            OAuthProvider::Google => "AUTH_GOOGLE",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Normalized `{ id, name, email, image }` shape of a provider profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

impl ProviderProfile {
    /// Reads the provider-specific payload. Only the account id is required
    /// here; `create_user` enforces the email requirement.
    pub fn from_payload(provider: OAuthProvider, payload: &Value) -> AdapterResult<Self> {
        let obj = payload
            .as_object()
            .ok_or_else(|| AdapterError::validation(format!("{provider} profile is not an object")))?;

        let text = |key: &str| -> Option<String> {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let profile = match provider {
            OAuthProvider::GitHub => {
                // GitHub ids are numbers; some proxies re-encode them as strings.
                let id = match obj.get("id") {
                    Some(Value::Number(n)) => Some(n.to_string()),
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    _ => None,
                };
                ProviderProfile {
                    id: id.ok_or_else(|| AdapterError::validation("github profile has no id"))?,
                    name: text("name").or_else(|| text("login")),
                    email: text("email"),
                    image: text("avatar_url"),
                }
            }
            OAuthProvider::Google => ProviderProfile {
                id: text("sub").ok_or_else(|| AdapterError::validation("google profile has no sub"))?,
                name: text("name"),
                email: text("email"),
                image: text("picture"),
            },
        };
        Ok(profile)
    }
}

impl From<ProviderProfile> for NewUser {
    fn from(p: ProviderProfile) -> Self {
        NewUser {
            name: p.name,
            email: p.email,
            email_verified: None,
            image: p.image,
        }
    }
}
