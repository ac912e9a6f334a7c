//! Authoritative article store: row models and SQL repositories.
//!
//! - `model`: the article row shape shared by every lookup backend.
//! - `repo`: SQL-only functions over the SQLite pool.
//!
//! The repository API is re-exported at `crate::db::*`.

pub mod model;
pub mod repo;

pub use model::ArticleRow;
pub use repo::*;
