//! Storage adapter binding an authentication framework's users, linked OAuth
//! accounts, sessions and email verification tokens to PostgreSQL.

pub mod adapter;
pub mod config;
pub mod db;
pub mod error;
pub mod providers;
pub mod timestamps;
pub mod username;

pub use adapter::{Adapter, MemoryAdapter, PgAdapter};
pub use error::{AdapterError, AdapterResult};
