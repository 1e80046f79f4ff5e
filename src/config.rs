//! Link configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```
//! use pcat_pmu::config::LinkConfig;
//! use pcat_pmu::protocol::RecoveryPolicy;
//!
//! let config = LinkConfig::from_json(r#"{ "max_retries": 5, "recovery": "resync" }"#).unwrap();
//! assert_eq!(config.max_retries, 5);
//! assert_eq!(config.recovery, RecoveryPolicy::Resync);
//! assert_eq!(config.reply_timeout_ms, 1000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::handler::AddressFilter;
use crate::protocol::{address, RecoveryPolicy, DEFAULT_BUFFER_CAPACITY};
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};

/// Default time to wait for each reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default number of resends after the first write.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Settings for one PMU link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Address this host answers to.
    pub host_address: u8,
    /// Address of the PMU; frames from anyone else are dropped.
    pub pmu_address: u8,
    /// Time to wait for each reply, in milliseconds.
    pub reply_timeout_ms: u64,
    /// Resends after the first write before giving up.
    pub max_retries: u32,
    /// Reassembly buffer capacity in bytes.
    pub buffer_capacity: usize,
    /// What to drop after a malformed frame.
    pub recovery: RecoveryPolicy,
    /// Outbound frame queue depth.
    pub channel_capacity: usize,
}

impl LinkConfig {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`PmuError::Config`](crate::PmuError::Config) on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reply timeout as a `Duration`.
    #[inline]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Writes per request: the first one plus retries.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub(crate) fn address_filter(&self) -> AddressFilter {
        AddressFilter {
            host: self.host_address,
            pmu: self.pmu_address,
        }
    }

    pub(crate) fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            channel_capacity: self.channel_capacity,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host_address: address::HOST,
            pmu_address: address::PMU,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            recovery: RecoveryPolicy::DiscardAll,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
