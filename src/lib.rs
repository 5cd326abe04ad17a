//! Fablab inventory: workshop materials, equipment loans and the
//! administrators allowed to manage them.
//!
//! The whole inventory lives in one JSON document stored in Sled; every
//! write is a read-modify-write of that document (see `storage`).

pub mod auth;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod models;
pub mod storage;
// REST API module: Axum HTTP handlers, bearer auth middleware, OpenAPI docs
pub mod rest;
