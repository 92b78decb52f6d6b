//! Derivation options accepted by account constructors

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hd::DerivationPath;

/// Where in the key tree an account lives.
///
/// An explicit `path` wins over the BIP-44 index triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivationOptions {
    pub account_index: u32,
    pub change_index: u32,
    pub address_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DerivationOptions {
    pub fn with_address_index(address_index: u32) -> Self {
        Self {
            address_index,
            ..Default::default()
        }
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Resolve to a concrete path
    pub fn derivation_path(&self) -> Result<DerivationPath> {
        match &self.path {
            Some(path) => path.parse(),
            None => DerivationPath::bip44(
                self.account_index,
                self.change_index,
                self.address_index,
            ),
        }
    }
}
