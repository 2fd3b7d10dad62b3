use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::dto::{
    Account, AdapterAccount, AdapterSession, NewSession, NewUser, ProviderAccountKey,
    SessionAndUser, SessionUpdate, User, UserUpdate, VerificationToken, VerificationTokenKey,
};
use super::{fresh_id, Adapter, PurgeReport};
use crate::error::{AdapterError, AdapterResult};
use crate::timestamps::{self, normalize};
use crate::username::{base_username, resolve_unique_username, UsernameLookup};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, AdapterSession>,
    tokens: HashMap<VerificationTokenKey, VerificationToken>,
}

/// In-process `Adapter` with the same uniqueness rules and cascades as the
/// database schema. Nothing survives the process.
pub struct MemoryAdapter {
    tables: Mutex<Tables>,
    rng: tokio::sync::Mutex<StdRng>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Username suffixes are drawn from an RNG seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            rng: tokio::sync::Mutex::new(rng),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_count(&self) -> usize {
        self.tables().users.len()
    }

    #[instrument(skip(self))]
    pub async fn purge_expired(&self, now: OffsetDateTime) -> AdapterResult<PurgeReport> {
        let mut t = self.tables();
        let sessions_before = t.sessions.len();
        t.sessions.retain(|_, s| s.expires >= now);
        let tokens_before = t.tokens.len();
        t.tokens.retain(|_, v| v.expires >= now);

        let report = PurgeReport {
            sessions: (sessions_before - t.sessions.len()) as u64,
            verification_tokens: (tokens_before - t.tokens.len()) as u64,
        };
        info!(sessions = report.sessions, verification_tokens = report.verification_tokens, "expired rows purged");
        Ok(report)
    }
}

impl Tables {
    fn email_taken(&self, email: &str, except_id: Option<&str>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id.as_str()) != except_id)
    }

    fn account_by_key(&self, key: &ProviderAccountKey) -> Option<&Account> {
        self.accounts.values().find(|a| {
            a.account.provider == key.provider
                && a.account.provider_account_id == key.provider_account_id
        })
    }

    fn session_id_by_token(&self, session_token: &str) -> Option<String> {
        self.sessions
            .values()
            .find(|s| s.session_token == session_token)
            .map(|s| s.id.clone())
    }
}

#[async_trait]
impl UsernameLookup for MemoryAdapter {
    async fn user_id_exists(&self, id: &str) -> AdapterResult<bool> {
        Ok(self.tables().users.contains_key(id))
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: NewUser) -> AdapterResult<User> {
        let user = user.validate()?;
        let base = base_username(&user.email);
        let id = {
            let mut rng = self.rng.lock().await;
            resolve_unique_username(self, &base, &mut *rng).await?
        };

        let mut t = self.tables();
        if t.users.contains_key(&id) {
            return Err(AdapterError::conflict(format!("user id {id:?} already exists")));
        }
        if t.email_taken(&user.email, None) {
            return Err(AdapterError::conflict("user email already exists"));
        }
        let now = timestamps::now();
        let created = User {
            name: user.name.unwrap_or_else(|| id.clone()),
            id: id.clone(),
            email: user.email,
            email_verified: user.email_verified.map(normalize),
            image: user.image,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(id, created.clone());
        info!(user_id = %created.id, "user created");
        Ok(created)
    }

    async fn get_user(&self, id: &str) -> AdapterResult<Option<User>> {
        Ok(self.tables().users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> AdapterResult<Option<User>> {
        Ok(self.tables().users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_account(&self, key: &ProviderAccountKey) -> AdapterResult<Option<User>> {
        let t = self.tables();
        Ok(t
            .account_by_key(key)
            .and_then(|a| t.users.get(&a.account.user_id))
            .cloned())
    }

    #[instrument(skip(self, update), fields(user_id = %update.id))]
    async fn update_user(&self, update: UserUpdate) -> AdapterResult<User> {
        update.validate()?;
        let mut t = self.tables();
        if let Some(email) = &update.email {
            if t.email_taken(email, Some(&update.id)) {
                return Err(AdapterError::conflict("user email already exists"));
            }
        }
        let user = t
            .users
            .get_mut(&update.id)
            .ok_or(AdapterError::NotFound("user"))?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(email_verified) = update.email_verified {
            user.email_verified = email_verified.map(normalize);
        }
        if let Some(image) = update.image {
            user.image = image;
        }
        user.updated_at = timestamps::now();
        debug!("user updated");
        Ok(user.clone())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: &str) -> AdapterResult<Option<User>> {
        let mut t = self.tables();
        let removed = t.users.remove(id);
        if removed.is_some() {
            t.accounts.retain(|_, a| a.account.user_id != id);
            t.sessions.retain(|_, s| s.user_id != id);
            info!(user_id = id, "user deleted");
        }
        Ok(removed)
    }

    #[instrument(skip(self, account), fields(provider = %account.provider, user_id = %account.user_id))]
    async fn link_account(&self, account: AdapterAccount) -> AdapterResult<Account> {
        let mut t = self.tables();
        if !t.users.contains_key(&account.user_id) {
            return Err(AdapterError::NotFound("user"));
        }
        if t.account_by_key(&account.key()).is_some() {
            return Err(AdapterError::conflict(
                "account violates provider/providerAccountId uniqueness",
            ));
        }
        let id = fresh_id();
        let linked = Account {
            id: id.clone(),
            account,
        };
        t.accounts.insert(id, linked.clone());
        info!(account_id = %linked.id, "account linked");
        Ok(linked)
    }

    #[instrument(skip(self))]
    async fn unlink_account(&self, key: &ProviderAccountKey) -> AdapterResult<Option<Account>> {
        let mut t = self.tables();
        let id = t.account_by_key(key).map(|a| a.id.clone());
        Ok(id.and_then(|id| t.accounts.remove(&id)))
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn create_session(&self, session: NewSession) -> AdapterResult<AdapterSession> {
        let mut t = self.tables();
        if !t.users.contains_key(&session.user_id) {
            return Err(AdapterError::NotFound("user"));
        }
        if t.session_id_by_token(&session.session_token).is_some() {
            return Err(AdapterError::conflict("session token already exists"));
        }
        let created = AdapterSession {
            id: fresh_id(),
            session_token: session.session_token,
            user_id: session.user_id,
            expires: normalize(session.expires),
        };
        t.sessions.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> AdapterResult<Option<SessionAndUser>> {
        let t = self.tables();
        let Some(session) = t.sessions.values().find(|s| s.session_token == session_token) else {
            return Ok(None);
        };
        Ok(t.users.get(&session.user_id).map(|user| SessionAndUser {
            session: session.clone(),
            user: user.clone(),
        }))
    }

    async fn update_session(&self, update: SessionUpdate) -> AdapterResult<Option<AdapterSession>> {
        let mut t = self.tables();
        let Some(id) = t.session_id_by_token(&update.session_token) else {
            return Ok(None);
        };
        if let Some(user_id) = &update.user_id {
            if !t.users.contains_key(user_id) {
                return Err(AdapterError::NotFound("user"));
            }
        }
        let Some(session) = t.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(user_id) = update.user_id {
            session.user_id = user_id;
        }
        if let Some(expires) = update.expires {
            session.expires = normalize(expires);
        }
        Ok(Some(session.clone()))
    }

    async fn delete_session(&self, session_token: &str) -> AdapterResult<Option<AdapterSession>> {
        let mut t = self.tables();
        let id = t.session_id_by_token(session_token);
        Ok(id.and_then(|id| t.sessions.remove(&id)))
    }

    #[instrument(skip(self, token), fields(identifier = %token.identifier))]
    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> AdapterResult<VerificationToken> {
        let mut t = self.tables();
        if t.tokens.values().any(|v| v.token == token.token) {
            return Err(AdapterError::conflict("verification token already exists"));
        }
        let stored = VerificationToken {
            expires: normalize(token.expires),
            ..token
        };
        t.tokens.insert(stored.key(), stored.clone());
        Ok(stored)
    }

    #[instrument(skip(self, key), fields(identifier = %key.identifier))]
    async fn use_verification_token(
        &self,
        key: &VerificationTokenKey,
    ) -> AdapterResult<Option<VerificationToken>> {
        let consumed = self.tables().tokens.remove(key);
        if consumed.is_none() {
            debug!("verification token already consumed");
        }
        Ok(consumed)
    }
}
