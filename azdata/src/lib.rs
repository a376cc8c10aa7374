//! azdata - Azure Storage data-plane clients
//!
//! Typed REST clients for the Table service (tables and entities) and the
//! Blob service (containers), with shared-key and bearer-token request
//! authorization. Retry and polling policy belong to the caller; this crate
//! issues single requests and maps service errors into [`ApiError`].

pub mod auth;
pub mod client;
pub mod containers;
pub mod entities;
pub mod error;
pub mod tables;

pub use auth::{Credentials, SharedKeyKind};
pub use client::{Client, STORAGE_API_VERSION};
pub use entities::{EntityValue, MetadataLevel};
pub use error::ApiError;
