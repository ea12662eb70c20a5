//! Per-store settings, loadable with serde (camelCase keys, every field
//! optional).

use serde::{Deserialize, Serialize};

/// Which dispatches supersede an action stream that is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwitchPolicy {
    /// Every dispatch, plain or streamed, cancels the in-flight stream.
    #[default]
    AnyMessage,
    /// Only a newly dispatched stream cancels the in-flight one.
    StreamsOnly,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Attached as the `store` field on every log event this store emits.
    pub name: String,
    /// How streamed messages are superseded.
    pub switch_policy: SwitchPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            switch_policy: SwitchPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration with a custom store name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_switch_policy(mut self, policy: SwitchPolicy) -> Self {
        self.switch_policy = policy;
        self
    }
}
