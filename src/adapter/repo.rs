use async_trait::async_trait;
use lazy_static::lazy_static;
use rand::{rngs::StdRng, SeedableRng};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::dto::{
    Account, AdapterAccount, AdapterSession, NewSession, NewUser, ProviderAccountKey,
    SessionAndUser, SessionUpdate, User, UserUpdate, VerificationToken, VerificationTokenKey,
};
use super::fields::{
    column_list, placeholders, quoted, table, AccountField, FieldMap, SessionField,
    VerificationTokenField,
};
use super::repo_types::{
    AccountRow, SessionAndUserRow, SessionRow, UserRow, VerificationTokenRow, SESSION_ALIAS,
    USER_COLUMNS,
};
use super::{fresh_id, Adapter, PurgeReport, MAX_ID_ATTEMPTS};
use crate::db::Database;
use crate::error::{AdapterError, AdapterResult};
use crate::timestamps::{self, to_column};
use crate::username::{base_username, resolve_unique_username, UsernameLookup};

lazy_static! {
    static ref ACCOUNT_COLUMNS: String = format!(r#""id", {}"#, column_list::<AccountField>());
    static ref INSERT_ACCOUNT: String = format!(
        r#"INSERT INTO {table} ({cols})
           VALUES ({values})
           ON CONFLICT ("id") DO NOTHING
           RETURNING {cols}"#,
        table = table::<AccountField>(),
        cols = *ACCOUNT_COLUMNS,
        values = placeholders(1, AccountField::ALL.len() + 1),
    );
    static ref DELETE_ACCOUNT: String = format!(
        r#"DELETE FROM {table}
           WHERE {provider} = $1 AND {provider_account_id} = $2
           RETURNING {cols}"#,
        table = table::<AccountField>(),
        provider = quoted(AccountField::Provider.column()),
        provider_account_id = quoted(AccountField::ProviderAccountId.column()),
        cols = *ACCOUNT_COLUMNS,
    );
    static ref PREFIXED_USER_COLUMNS: String = USER_COLUMNS
        .split(", ")
        .map(|c| format!("u.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    static ref SELECT_USER_BY_ACCOUNT: String = format!(
        r#"SELECT {user_cols}
           FROM "User" u
           JOIN {table} a ON a.{user_id} = u."id"
           WHERE a.{provider} = $1 AND a.{provider_account_id} = $2"#,
        user_cols = *PREFIXED_USER_COLUMNS,
        table = table::<AccountField>(),
        user_id = quoted(AccountField::UserId.column()),
        provider = quoted(AccountField::Provider.column()),
        provider_account_id = quoted(AccountField::ProviderAccountId.column()),
    );

    static ref SESSION_COLUMNS: String = column_list::<SessionField>();
    static ref SESSION_BY_TOKEN: String = quoted(SessionField::SessionToken.column());
    static ref INSERT_SESSION: String = format!(
        r#"INSERT INTO {table} ({cols})
           VALUES ({values})
           ON CONFLICT ("id") DO NOTHING
           RETURNING {cols}"#,
        table = table::<SessionField>(),
        cols = *SESSION_COLUMNS,
        values = placeholders(1, SessionField::ALL.len()),
    );
    static ref SELECT_SESSION: String = format!(
        "SELECT {cols} FROM {table} WHERE {token} = $1",
        cols = *SESSION_COLUMNS,
        table = table::<SessionField>(),
        token = *SESSION_BY_TOKEN,
    );
    static ref DELETE_SESSION: String = format!(
        "DELETE FROM {table} WHERE {token} = $1 RETURNING {cols}",
        cols = *SESSION_COLUMNS,
        table = table::<SessionField>(),
        token = *SESSION_BY_TOKEN,
    );
    static ref SELECT_SESSION_AND_USER: String = format!(
        r#"SELECT {session_cols}, {user_cols}
           FROM {table} s
           JOIN "User" u ON u."id" = s.{user_id}
           WHERE s.{token} = $1"#,
        session_cols = SessionField::ALL
            .iter()
            .map(|f| format!(r#"s.{} AS "{SESSION_ALIAS}{}""#, quoted(f.column()), f.column()))
            .collect::<Vec<_>>()
            .join(", "),
        user_cols = *PREFIXED_USER_COLUMNS,
        table = table::<SessionField>(),
        user_id = quoted(SessionField::UserId.column()),
        token = *SESSION_BY_TOKEN,
    );
    static ref PURGE_SESSIONS: String = format!(
        "DELETE FROM {table} WHERE {expires} < $1",
        table = table::<SessionField>(),
        expires = quoted(SessionField::Expires.column()),
    );

    static ref TOKEN_COLUMNS: String = column_list::<VerificationTokenField>();
    static ref INSERT_TOKEN: String = format!(
        "INSERT INTO {table} ({cols}) VALUES ({values}) RETURNING {cols}",
        table = table::<VerificationTokenField>(),
        cols = *TOKEN_COLUMNS,
        values = placeholders(1, VerificationTokenField::ALL.len()),
    );
    static ref CONSUME_TOKEN: String = format!(
        "DELETE FROM {table} WHERE {identifier} = $1 AND {token} = $2 RETURNING {cols}",
        table = table::<VerificationTokenField>(),
        identifier = quoted(VerificationTokenField::Identifier.column()),
        token = quoted(VerificationTokenField::Token.column()),
        cols = *TOKEN_COLUMNS,
    );
    static ref PURGE_TOKENS: String = format!(
        "DELETE FROM {table} WHERE {expires} < $1",
        table = table::<VerificationTokenField>(),
        expires = quoted(VerificationTokenField::Expires.column()),
    );
}

/// `Adapter` backed by PostgreSQL through a shared connection pool.
#[derive(Clone)]
pub struct PgAdapter {
    db: PgPool,
}

impl PgAdapter {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.pool().clone(),
        }
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    /// Removes sessions and verification tokens that expired before `now`.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, now: OffsetDateTime) -> AdapterResult<PurgeReport> {
        let cutoff = to_column(now);
        let mut tx = self.db.begin().await?;
        let sessions = sqlx::query(&PURGE_SESSIONS)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let verification_tokens = sqlx::query(&PURGE_TOKENS)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        info!(sessions, verification_tokens, "expired rows purged");
        Ok(PurgeReport {
            sessions,
            verification_tokens,
        })
    }

    async fn find_session(&self, session_token: &str) -> AdapterResult<Option<AdapterSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&SELECT_SESSION)
            .bind(session_token)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|r| r.0))
    }
}

#[async_trait]
impl UsernameLookup for PgAdapter {
    async fn user_id_exists(&self, id: &str) -> AdapterResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM "User" WHERE "id" = $1)"#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl Adapter for PgAdapter {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: NewUser) -> AdapterResult<User> {
        let user = user.validate()?;
        let base = base_username(&user.email);
        let mut rng = StdRng::from_entropy();
        let id = resolve_unique_username(self, &base, &mut rng).await?;
        let name = user.name.unwrap_or_else(|| id.clone());

        // A concurrent insert that won the same id surfaces as a conflict.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO "User" ("id", "name", "email", "emailVerified", "image")
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(&name)
        .bind(&user.email)
        .bind(user.email_verified.map(to_column))
        .bind(user.image.as_deref())
        .fetch_one(&self.db)
        .await
        .map_err(|e| AdapterError::from_write(e, "user"))?;

        info!(user_id = %row.id, "user created");
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, id: &str) -> AdapterResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"SELECT {USER_COLUMNS} FROM "User" WHERE "id" = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    #[instrument(skip(self))]
    async fn get_user_by_email(&self, email: &str) -> AdapterResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"SELECT {USER_COLUMNS} FROM "User" WHERE "email" = $1"#
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    #[instrument(skip(self))]
    async fn get_user_by_account(&self, key: &ProviderAccountKey) -> AdapterResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&SELECT_USER_BY_ACCOUNT)
            .bind(&key.provider)
            .bind(&key.provider_account_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(User::from))
    }

    #[instrument(skip(self, update), fields(user_id = %update.id))]
    async fn update_user(&self, update: UserUpdate) -> AdapterResult<User> {
        update.validate()?;

        let mut qb = QueryBuilder::<Postgres>::new(r#"UPDATE "User" SET "updatedAt" = "#);
        qb.push_bind(to_column(timestamps::now()));
        if let Some(name) = update.name {
            qb.push(r#", "name" = "#).push_bind(name);
        }
        if let Some(email) = update.email {
            qb.push(r#", "email" = "#).push_bind(email);
        }
        if let Some(email_verified) = update.email_verified {
            qb.push(r#", "emailVerified" = "#)
                .push_bind(email_verified.map(to_column));
        }
        if let Some(image) = update.image {
            qb.push(r#", "image" = "#).push_bind(image);
        }
        qb.push(r#" WHERE "id" = "#).push_bind(update.id);
        qb.push(" RETURNING ").push(USER_COLUMNS);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AdapterError::from_write(e, "user"))?
            .ok_or(AdapterError::NotFound("user"))?;
        debug!("user updated");
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: &str) -> AdapterResult<Option<User>> {
        // Accounts and sessions go with it via ON DELETE CASCADE.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"DELETE FROM "User" WHERE "id" = $1 RETURNING {USER_COLUMNS}"#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        if row.is_some() {
            info!(user_id = id, "user deleted");
        }
        Ok(row.map(User::from))
    }

    #[instrument(skip(self, account), fields(provider = %account.provider, user_id = %account.user_id))]
    async fn link_account(&self, account: AdapterAccount) -> AdapterResult<Account> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = fresh_id();
            let mut query = sqlx::query_as::<_, AccountRow>(&INSERT_ACCOUNT).bind(&id);
            for field in AccountField::ALL.iter().copied() {
                query = match field {
                    AccountField::UserId => query.bind(&account.user_id),
                    AccountField::Type => query.bind(&account.account_type),
                    AccountField::Provider => query.bind(&account.provider),
                    AccountField::ProviderAccountId => query.bind(&account.provider_account_id),
                    AccountField::RefreshToken => query.bind(account.refresh_token.as_deref()),
                    AccountField::AccessToken => query.bind(account.access_token.as_deref()),
                    AccountField::ExpiresAt => query.bind(account.expires_at),
                    AccountField::TokenType => query.bind(account.token_type.as_deref()),
                    AccountField::Scope => query.bind(account.scope.as_deref()),
                    AccountField::IdToken => query.bind(account.id_token.as_deref()),
                    AccountField::SessionState => query.bind(account.session_state.as_deref()),
                };
            }

            let row = query
                .fetch_optional(&self.db)
                .await
                .map_err(|e| AdapterError::from_write(e, "account"))?;
            match row {
                Some(AccountRow(linked)) => {
                    info!(account_id = %linked.id, "account linked");
                    return Ok(linked);
                }
                None => warn!(attempt, "account id collision, regenerating"),
            }
        }
        Err(AdapterError::IdentifierExhausted {
            entity: "account",
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    #[instrument(skip(self))]
    async fn unlink_account(&self, key: &ProviderAccountKey) -> AdapterResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&DELETE_ACCOUNT)
            .bind(&key.provider)
            .bind(&key.provider_account_id)
            .fetch_optional(&self.db)
            .await?;
        if let Some(AccountRow(account)) = &row {
            info!(account_id = %account.id, "account unlinked");
        }
        Ok(row.map(|r| r.0))
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn create_session(&self, session: NewSession) -> AdapterResult<AdapterSession> {
        let expires = to_column(session.expires);
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = fresh_id();
            let mut query = sqlx::query_as::<_, SessionRow>(&INSERT_SESSION);
            for field in SessionField::ALL.iter().copied() {
                query = match field {
                    SessionField::Id => query.bind(&id),
                    SessionField::SessionToken => query.bind(&session.session_token),
                    SessionField::UserId => query.bind(&session.user_id),
                    SessionField::Expires => query.bind(expires),
                };
            }

            let row = query
                .fetch_optional(&self.db)
                .await
                .map_err(|e| AdapterError::from_write(e, "session"))?;
            match row {
                Some(SessionRow(created)) => {
                    debug!(session_id = %created.id, "session created");
                    return Ok(created);
                }
                None => warn!(attempt, "session id collision, regenerating"),
            }
        }
        Err(AdapterError::IdentifierExhausted {
            entity: "session",
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    #[instrument(skip(self, session_token))]
    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> AdapterResult<Option<SessionAndUser>> {
        let row = sqlx::query_as::<_, SessionAndUserRow>(&SELECT_SESSION_AND_USER)
            .bind(session_token)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|r| r.0))
    }

    #[instrument(skip(self, update))]
    async fn update_session(&self, update: SessionUpdate) -> AdapterResult<Option<AdapterSession>> {
        if update.is_empty() {
            return self.find_session(&update.session_token).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", table::<SessionField>()));
        {
            let mut set = qb.separated(", ");
            if let Some(user_id) = update.user_id {
                set.push(format!("{} = ", quoted(SessionField::UserId.column())))
                    .push_bind_unseparated(user_id);
            }
            if let Some(expires) = update.expires {
                set.push(format!("{} = ", quoted(SessionField::Expires.column())))
                    .push_bind_unseparated(to_column(expires));
            }
        }
        qb.push(format!(" WHERE {} = ", *SESSION_BY_TOKEN))
            .push_bind(update.session_token)
            .push(" RETURNING ")
            .push(SESSION_COLUMNS.as_str());

        let row = qb
            .build_query_as::<SessionRow>()
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AdapterError::from_write(e, "session"))?;
        Ok(row.map(|r| r.0))
    }

    #[instrument(skip(self, session_token))]
    async fn delete_session(&self, session_token: &str) -> AdapterResult<Option<AdapterSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&DELETE_SESSION)
            .bind(session_token)
            .fetch_optional(&self.db)
            .await?;
        if let Some(SessionRow(session)) = &row {
            debug!(session_id = %session.id, "session deleted");
        }
        Ok(row.map(|r| r.0))
    }

    #[instrument(skip(self, token), fields(identifier = %token.identifier))]
    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> AdapterResult<VerificationToken> {
        let mut query = sqlx::query_as::<_, VerificationTokenRow>(&INSERT_TOKEN);
        for field in VerificationTokenField::ALL.iter().copied() {
            query = match field {
                VerificationTokenField::Identifier => query.bind(&token.identifier),
                VerificationTokenField::Token => query.bind(&token.token),
                VerificationTokenField::Expires => query.bind(to_column(token.expires)),
            };
        }
        let row = query
            .fetch_one(&self.db)
            .await
            .map_err(|e| AdapterError::from_write(e, "verification token"))?;
        debug!("verification token created");
        Ok(row.0)
    }

    #[instrument(skip(self, key), fields(identifier = %key.identifier))]
    async fn use_verification_token(
        &self,
        key: &VerificationTokenKey,
    ) -> AdapterResult<Option<VerificationToken>> {
        // Single statement: two concurrent uses cannot both get the row back.
        let row = sqlx::query_as::<_, VerificationTokenRow>(&CONSUME_TOKEN)
            .bind(&key.identifier)
            .bind(&key.token)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(VerificationTokenRow(token)) => {
                info!("verification token consumed");
                Ok(Some(token))
            }
            None => {
                debug!("verification token already consumed");
                Ok(None)
            }
        }
    }
}
