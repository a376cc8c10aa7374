//! Reconciliation handlers for the storage resources.
//!
//! Each resource follows the same shape: look up the account, build a
//! data-plane client with the auth methods the operation supports, and map
//! absent remote objects to `Ok(None)` on read so the caller can drop the
//! resource from state.

pub mod container;
pub mod entity;
pub mod table;

pub use container::{ContainerConfig, ContainerResource, ContainerState, ContainerUpdate};
pub use entity::{TableEntityConfig, TableEntityResource, TableEntityState};
pub use table::{TableAccessPolicy, TableAcl, TableConfig, TableResource, TableState};

use crate::account::AccountError;
use crate::ids::IdParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("locating storage account {0:?}")]
    AccountNotFound(String),

    #[error("{0} already exists and needs to be imported into state")]
    AlreadyExists(String),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Api(#[from] azdata::ApiError),

    #[error(transparent)]
    Id(#[from] IdParseError),
}
