//! The authentication framework's storage contract and its implementations.

use async_trait::async_trait;

use crate::error::AdapterResult;

pub mod dto;
pub mod fields;
pub mod memory;
pub mod repo;
mod repo_types;

pub use dto::{
    Account, AdapterAccount, AdapterSession, NewSession, NewUser, ProviderAccountKey,
    SessionAndUser, SessionUpdate, User, UserUpdate, VerificationToken, VerificationTokenKey,
};
pub use memory::MemoryAdapter;
pub use repo::PgAdapter;

/// Upper bound on regenerating a random row id after a primary-key collision.
pub const MAX_ID_ATTEMPTS: usize = 10;

/// Storage operations the authentication framework calls during sign-in,
/// session and email-verification flows.
///
/// Lookups and deletions report "no such row" as `Ok(None)`.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Validates the input, derives a unique username from the email address
    /// and stores the user under it.
    async fn create_user(&self, user: NewUser) -> AdapterResult<User>;
    async fn get_user(&self, id: &str) -> AdapterResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> AdapterResult<Option<User>>;
    async fn get_user_by_account(&self, key: &ProviderAccountKey) -> AdapterResult<Option<User>>;
    async fn update_user(&self, update: UserUpdate) -> AdapterResult<User>;
    /// Removes the user together with its accounts and sessions.
    async fn delete_user(&self, id: &str) -> AdapterResult<Option<User>>;

    async fn link_account(&self, account: AdapterAccount) -> AdapterResult<Account>;
    async fn unlink_account(&self, key: &ProviderAccountKey) -> AdapterResult<Option<Account>>;

    async fn create_session(&self, session: NewSession) -> AdapterResult<AdapterSession>;
    async fn get_session_and_user(&self, session_token: &str)
        -> AdapterResult<Option<SessionAndUser>>;
    async fn update_session(&self, update: SessionUpdate) -> AdapterResult<Option<AdapterSession>>;
    async fn delete_session(&self, session_token: &str) -> AdapterResult<Option<AdapterSession>>;

    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> AdapterResult<VerificationToken>;
    /// Deletes the token and returns what it held. A token that is already
    /// gone yields `Ok(None)`.
    async fn use_verification_token(
        &self,
        key: &VerificationTokenKey,
    ) -> AdapterResult<Option<VerificationToken>>;
}

/// Rows removed by a purge of expired sessions and verification tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: u64,
    pub verification_tokens: u64,
}

pub(crate) fn fresh_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Behaviour every `Adapter` must show, written once and run against each
/// implementation.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use crate::error::AdapterError;
    use crate::timestamps;
    use time::Duration;
    use uuid::Uuid;

    /// Unique local part so runs against a shared database do not collide.
    pub fn unique_email(prefix: &str) -> String {
        format!("{prefix}.{}@example.com", Uuid::new_v4().simple())
    }

    pub fn new_user(email: &str) -> NewUser {
        NewUser {
            name: Some("Test User".into()),
            email: Some(email.into()),
            email_verified: None,
            image: None,
        }
    }

    pub fn github_account(user_id: &str) -> AdapterAccount {
        AdapterAccount {
            user_id: user_id.into(),
            account_type: "oauth".into(),
            provider: "github".into(),
            provider_account_id: Uuid::new_v4().to_string(),
            access_token: Some("gho_secret".into()),
            token_type: Some("bearer".into()),
            scope: Some("read:user,user:email".into()),
            ..AdapterAccount::default()
        }
    }

    pub async fn create_user_assigns_base_username(adapter: &dyn Adapter) {
        let email = unique_email("jane.doe");
        let user = adapter.create_user(new_user(&email)).await.unwrap();
        assert_eq!(user.id, crate::username::base_username(&email));
        assert_eq!(user.email, email);
        assert_eq!(user.name, "Test User");
        assert_eq!(user.created_at, user.updated_at);

        let fetched = adapter.get_user(&user.id).await.unwrap();
        assert_eq!(fetched.as_ref(), Some(&user));
        let by_email = adapter.get_user_by_email(&email).await.unwrap();
        assert_eq!(by_email, Some(user));
    }

    pub async fn create_user_resolves_collisions(adapter: &dyn Adapter) {
        let local = format!("sam{}", Uuid::new_v4().simple());
        let first = adapter
            .create_user(new_user(&format!("{local}@one.test")))
            .await
            .unwrap();
        let second = adapter
            .create_user(new_user(&format!("{local}@two.test")))
            .await
            .unwrap();
        assert_eq!(first.id, local);
        let suffix = second.id.strip_prefix(&local).expect("keeps base");
        assert_eq!(suffix.len(), 1);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    pub async fn create_user_requires_email(adapter: &dyn Adapter) {
        let err = adapter
            .create_user(NewUser {
                name: Some("Nobody".into()),
                ..NewUser::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }

    pub async fn duplicate_email_is_a_conflict(adapter: &dyn Adapter) {
        let email = unique_email("dup");
        adapter.create_user(new_user(&email)).await.unwrap();
        let err = adapter.create_user(new_user(&email)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Conflict(_)), "{err:?}");
    }

    pub async fn missing_name_falls_back_to_username(adapter: &dyn Adapter) {
        let email = unique_email("anon");
        let user = adapter
            .create_user(NewUser {
                email: Some(email),
                ..NewUser::default()
            })
            .await
            .unwrap();
        assert_eq!(user.name, user.id);
    }

    pub async fn update_user_changes_only_given_fields(adapter: &dyn Adapter) {
        let email = unique_email("upd");
        let mut input = new_user(&email);
        input.image = Some("https://img.test/a.png".into());
        let user = adapter.create_user(input).await.unwrap();

        let verified = timestamps::now();
        let mut update = UserUpdate::new(&user.id);
        update.name = Some("Renamed".into());
        update.email_verified = Some(Some(verified));
        update.image = Some(None);
        let updated = adapter.update_user(update).await.unwrap();

        assert_eq!(updated.id, user.id);
        assert_eq!(updated.email, user.email);
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.email_verified, Some(verified));
        assert_eq!(updated.image, None);
        assert!(updated.updated_at >= user.updated_at);

        let err = adapter
            .update_user(UserUpdate::new("no-such-user-id"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound("user")));
    }

    pub async fn account_link_and_unlink(adapter: &dyn Adapter) {
        let user = adapter
            .create_user(new_user(&unique_email("linker")))
            .await
            .unwrap();
        let input = github_account(&user.id);
        let key = input.key();

        let linked = adapter.link_account(input.clone()).await.unwrap();
        assert_eq!(linked.account, input);
        assert!(!linked.id.is_empty());
        assert_ne!(linked.id, input.provider_account_id);

        let owner = adapter.get_user_by_account(&key).await.unwrap();
        assert_eq!(owner.map(|u| u.id), Some(user.id.clone()));

        let err = adapter.link_account(input).await.unwrap_err();
        assert!(matches!(err, AdapterError::Conflict(_)), "{err:?}");

        let removed = adapter.unlink_account(&key).await.unwrap();
        assert_eq!(removed.map(|a| a.id), Some(linked.id));
        assert_eq!(adapter.get_user_by_account(&key).await.unwrap(), None);
        assert_eq!(adapter.unlink_account(&key).await.unwrap(), None);
    }

    pub async fn link_account_to_missing_user(adapter: &dyn Adapter) {
        let err = adapter
            .link_account(github_account("ghost-user-id"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NotFound("user")), "{err:?}");
    }

    pub async fn session_roundtrip(adapter: &dyn Adapter) {
        let user = adapter
            .create_user(new_user(&unique_email("sess")))
            .await
            .unwrap();
        let input = NewSession {
            session_token: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            expires: timestamps::now() + Duration::days(30),
        };
        let created = adapter.create_session(input.clone()).await.unwrap();
        assert_eq!(created.session_token, input.session_token);
        assert_eq!(created.user_id, input.user_id);
        assert_eq!(created.expires, input.expires);

        let joined = adapter
            .get_session_and_user(&input.session_token)
            .await
            .unwrap()
            .expect("session exists");
        assert_eq!(joined.session, created);
        assert_eq!(joined.user, user);

        let later = input.expires + Duration::days(1);
        let updated = adapter
            .update_session(SessionUpdate {
                session_token: input.session_token.clone(),
                expires: Some(later),
                ..SessionUpdate::default()
            })
            .await
            .unwrap()
            .expect("session updated");
        assert_eq!(updated.expires, later);
        assert_eq!(updated.id, created.id);

        let unchanged = adapter
            .update_session(SessionUpdate {
                session_token: input.session_token.clone(),
                ..SessionUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(unchanged, Some(updated.clone()));

        let deleted = adapter.delete_session(&input.session_token).await.unwrap();
        assert_eq!(deleted, Some(updated));
        assert_eq!(adapter.get_session_and_user(&input.session_token).await.unwrap(), None);
        assert_eq!(adapter.delete_session(&input.session_token).await.unwrap(), None);
        assert_eq!(
            adapter
                .update_session(SessionUpdate {
                    session_token: input.session_token,
                    expires: Some(later),
                    ..SessionUpdate::default()
                })
                .await
                .unwrap(),
            None
        );
    }

    pub async fn verification_token_is_single_use(adapter: &dyn Adapter) {
        let token = VerificationToken {
            identifier: unique_email("magic"),
            token: Uuid::new_v4().to_string(),
            expires: timestamps::now() + Duration::hours(24),
        };
        let created = adapter.create_verification_token(token.clone()).await.unwrap();
        assert_eq!(created, token);

        let first = adapter.use_verification_token(&token.key()).await.unwrap();
        assert_eq!(first, Some(token.clone()));
        let second = adapter.use_verification_token(&token.key()).await.unwrap();
        assert_eq!(second, None);
    }

    pub async fn deleting_user_cascades(adapter: &dyn Adapter) {
        let user = adapter
            .create_user(new_user(&unique_email("gone")))
            .await
            .unwrap();
        let account = github_account(&user.id);
        let key = account.key();
        adapter.link_account(account).await.unwrap();
        let token = Uuid::new_v4().to_string();
        adapter
            .create_session(NewSession {
                session_token: token.clone(),
                user_id: user.id.clone(),
                expires: timestamps::now() + Duration::days(1),
            })
            .await
            .unwrap();

        let deleted = adapter.delete_user(&user.id).await.unwrap();
        assert_eq!(deleted.map(|u| u.id), Some(user.id.clone()));

        assert_eq!(adapter.get_user(&user.id).await.unwrap(), None);
        assert_eq!(adapter.get_session_and_user(&token).await.unwrap(), None);
        assert_eq!(adapter.get_user_by_account(&key).await.unwrap(), None);
        assert_eq!(adapter.delete_user(&user.id).await.unwrap(), None);
    }
}
