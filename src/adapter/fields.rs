//! Framework field names and the stored column names they map to.
//!
//! Each entity gets one enum whose variants are its fields. Both directions
//! of the mapping are exhaustive `match`es, so adding a field without a
//! column (or the reverse) does not compile. `PgAdapter` derives its column
//! lists, bind order and row decoding from these tables.

use std::fmt::Debug;

pub trait FieldMap: Copy + Eq + Debug + 'static {
    const TABLE: &'static str;
    const ALL: &'static [Self];

    fn framework_name(self) -> &'static str;
    fn column(self) -> &'static str;

    fn from_framework_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.framework_name() == name)
    }

    fn from_column(column: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.column() == column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountField {
    UserId,
    Type,
    Provider,
    ProviderAccountId,
    RefreshToken,
    AccessToken,
    ExpiresAt,
    TokenType,
    Scope,
    IdToken,
    SessionState,
}

impl FieldMap for AccountField {
    const TABLE: &'static str = "Account";
    const ALL: &'static [Self] = &[
        Self::UserId,
        Self::Type,
        Self::Provider,
        Self::ProviderAccountId,
        Self::RefreshToken,
        Self::AccessToken,
        Self::ExpiresAt,
        Self::TokenType,
        Self::Scope,
        Self::IdToken,
        Self::SessionState,
    ];

    fn framework_name(self) -> &'static str {
        match self {
            Self::UserId => "userId",
            Self::Type => "type",
            Self::Provider => "provider",
            Self::ProviderAccountId => "providerAccountId",
            Self::RefreshToken => "refresh_token",
            Self::AccessToken => "access_token",
            Self::ExpiresAt => "expires_at",
            Self::TokenType => "token_type",
            Self::Scope => "scope",
            Self::IdToken => "id_token",
            Self::SessionState => "session_state",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::UserId => "userId",
            Self::Type => "type",
            Self::Provider => "provider",
            Self::ProviderAccountId => "providerAccountId",
            Self::RefreshToken => "refreshToken",
            Self::AccessToken => "accessToken",
            Self::ExpiresAt => "expiresAt",
            Self::TokenType => "tokenType",
            Self::Scope => "scope",
            Self::IdToken => "idToken",
            Self::SessionState => "sessionState",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    Id,
    SessionToken,
    UserId,
    Expires,
}

impl FieldMap for SessionField {
    const TABLE: &'static str = "Session";
    const ALL: &'static [Self] = &[Self::Id, Self::SessionToken, Self::UserId, Self::Expires];

    fn framework_name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::SessionToken => "sessionToken",
            Self::UserId => "userId",
            Self::Expires => "expires",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::SessionToken => "sessionToken",
            Self::UserId => "userId",
            Self::Expires => "expiresAt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTokenField {
    Identifier,
    Token,
    Expires,
}

impl FieldMap for VerificationTokenField {
    const TABLE: &'static str = "VerificationToken";
    const ALL: &'static [Self] = &[Self::Identifier, Self::Token, Self::Expires];

    fn framework_name(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Token => "token",
            Self::Expires => "expires",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Token => "token",
            Self::Expires => "expiresAt",
        }
    }
}

pub fn quoted(ident: &str) -> String {
    format!("\"{ident}\"")
}

pub fn table<F: FieldMap>() -> String {
    quoted(F::TABLE)
}

/// `"a", "b", ...` in `ALL` order, which is also the bind order.
pub fn column_list<F: FieldMap>() -> String {
    F::ALL
        .iter()
        .map(|f| quoted(f.column()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `$start, $start+1, ...` for `count` parameters.
pub fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ")
}
