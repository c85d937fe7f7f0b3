//! Database access for the intake service
//!
//! Row-level queries over the tables created by `celeiro_common::db`. All
//! functions are generic over the executor so they run against the pool or
//! inside a transaction/savepoint.

pub mod article_pkgs;
pub mod attempts;
