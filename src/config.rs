use crate::error::{Result, StoreError};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// What to do with a verified purchase whose product the entitlement feed
/// does not confirm.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedPolicy {
    /// Report the error and leave the transaction for the update listener or a
    /// clear-unfinished pass.
    #[default]
    LeaveUnfinished,
    /// Report the error and acknowledge the transaction right away.
    FinishAndReport,
}

impl FromStr for UnmatchedPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "leave-unfinished" => Ok(UnmatchedPolicy::LeaveUnfinished),
            "finish-and-report" => Ok(UnmatchedPolicy::FinishAndReport),
            other => Err(StoreError::DeveloperError(format!(
                "unknown unmatched purchase policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub unmatched_purchases: UnmatchedPolicy,
    /// Reject purchases up front when the storefront reports that the device
    /// cannot make payments.
    pub require_payments_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unmatched_purchases: UnmatchedPolicy::default(),
            require_payments_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
