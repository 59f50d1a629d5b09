//! Site catalog service
//!
//! Keeps sites, categories and tags consistent across create, update, bulk
//! delete with undo, and import, on top of an embedded store where every
//! call is its own transaction.

pub mod bulk;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod handler;
pub mod import;
pub mod list_query;
pub mod model;
pub mod relation_maps;
pub mod relation_sync;
pub mod route;
pub mod taxonomy;
