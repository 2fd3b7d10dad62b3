use sqlx::{postgres::PgRow, FromRow, Row};
use time::PrimitiveDateTime;

use super::dto::{
    Account, AdapterAccount, AdapterSession, SessionAndUser, User, VerificationToken,
};
use super::fields::{AccountField, FieldMap, SessionField, VerificationTokenField};
use crate::timestamps::from_column;

pub(crate) const USER_COLUMNS: &str =
    r#""id", "name", "email", "emailVerified", "image", "createdAt", "updatedAt""#;

/// Prefix given to session columns when they are selected next to user
/// columns, which share names like `"id"`.
pub(crate) const SESSION_ALIAS: &str = "session_";

/// User record as stored; timestamps are UTC without offset.
#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    #[sqlx(rename = "emailVerified")]
    pub email_verified: Option<PrimitiveDateTime>,
    pub image: Option<String>,
    #[sqlx(rename = "createdAt")]
    pub created_at: PrimitiveDateTime,
    #[sqlx(rename = "updatedAt")]
    pub updated_at: PrimitiveDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            email_verified: r.email_verified.map(from_column),
            image: r.image,
            created_at: from_column(r.created_at),
            updated_at: from_column(r.updated_at),
        }
    }
}

#[derive(Debug)]
pub(crate) struct AccountRow(pub Account);

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use AccountField::*;
        Ok(Self(Account {
            id: row.try_get("id")?,
            account: AdapterAccount {
                user_id: row.try_get(UserId.column())?,
                account_type: row.try_get(Type.column())?,
                provider: row.try_get(Provider.column())?,
                provider_account_id: row.try_get(ProviderAccountId.column())?,
                refresh_token: row.try_get(RefreshToken.column())?,
                access_token: row.try_get(AccessToken.column())?,
                expires_at: row.try_get(ExpiresAt.column())?,
                token_type: row.try_get(TokenType.column())?,
                scope: row.try_get(Scope.column())?,
                id_token: row.try_get(IdToken.column())?,
                session_state: row.try_get(SessionState.column())?,
            },
        }))
    }
}

#[derive(Debug)]
pub(crate) struct SessionRow(pub AdapterSession);

impl<'r> FromRow<'r, PgRow> for SessionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use SessionField::*;
        let expires: PrimitiveDateTime = row.try_get(Expires.column())?;
        Ok(Self(AdapterSession {
            id: row.try_get(Id.column())?,
            session_token: row.try_get(SessionToken.column())?,
            user_id: row.try_get(UserId.column())?,
            expires: from_column(expires),
        }))
    }
}

/// One row of the session/user join; session columns carry `SESSION_ALIAS`.
#[derive(Debug)]
pub(crate) struct SessionAndUserRow(pub SessionAndUser);

impl<'r> FromRow<'r, PgRow> for SessionAndUserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use SessionField::*;
        let col = |field: SessionField| format!("{SESSION_ALIAS}{}", field.column());
        let expires: PrimitiveDateTime = row.try_get(col(Expires).as_str())?;
        let session = AdapterSession {
            id: row.try_get(col(Id).as_str())?,
            session_token: row.try_get(col(SessionToken).as_str())?,
            user_id: row.try_get(col(UserId).as_str())?,
            expires: from_column(expires),
        };
        let user = UserRow::from_row(row)?.into();
        Ok(Self(SessionAndUser { session, user }))
    }
}

#[derive(Debug)]
pub(crate) struct VerificationTokenRow(pub VerificationToken);

impl<'r> FromRow<'r, PgRow> for VerificationTokenRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        use VerificationTokenField::*;
        let expires: PrimitiveDateTime = row.try_get(Expires.column())?;
        Ok(Self(VerificationToken {
            identifier: row.try_get(Identifier.column())?,
            token: row.try_get(Token.column())?,
            expires: from_column(expires),
        }))
    }
}
