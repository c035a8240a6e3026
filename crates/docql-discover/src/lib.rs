//! Schema discovery and type inference for document keyspaces

use docql_ir::StoreError;
use thiserror::Error;

pub mod config;
pub mod discoverer;
pub mod infer;
pub mod typename;

pub use config::{DiscoveryConfig, DEFAULT_SAMPLE_SIZE};
pub use discoverer::{Discoverer, DEFAULT_NAMESPACE};
pub use infer::{infer_type, widen};
pub use typename::TypeNameMap;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid discovery configuration: {0}")]
    InvalidConfig(String),
}
