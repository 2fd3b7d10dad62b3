use std::fmt;

use anyhow::Context;

use crate::providers::OAuthProvider;

#[derive(Clone)]
pub struct ProviderCredentials {
    pub provider: OAuthProvider,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub providers: Vec<ProviderCredentials>,
}

impl AppConfig {
    /// Reads the process environment. Any missing required variable is fatal.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS must be a positive integer, got {v:?}"))?,
            None => 10,
        };

        let providers = OAuthProvider::ALL
            .into_iter()
            .map(|provider| -> anyhow::Result<ProviderCredentials> {
                let prefix = provider.env_prefix();
                Ok(ProviderCredentials {
                    provider,
                    client_id: required(&lookup, &format!("{prefix}_CLIENT_ID"))?,
                    client_secret: required(&lookup, &format!("{prefix}_CLIENT_SECRET"))?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            database_url,
            max_connections,
            providers,
        })
    }

    pub fn provider(&self, provider: OAuthProvider) -> Option<&ProviderCredentials> {
        self.providers.iter().find(|c| c.provider == provider)
    }
}

fn required<F>(lookup: &F, key: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{key} must be set"))
}
