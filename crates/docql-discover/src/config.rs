use serde::{Deserialize, Serialize};

use crate::typename::TypeNameMap;
use crate::DiscoveryError;

pub const DEFAULT_SAMPLE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Documents sampled per logical table
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Comma-separated `<keyspace>:<attribute>` pairs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name_list: Option<String>,
}

fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            type_name_list: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.sample_size == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "sample_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn type_names(&self) -> TypeNameMap {
        self.type_name_list
            .as_deref()
            .map(TypeNameMap::parse)
            .unwrap_or_default()
    }
}
