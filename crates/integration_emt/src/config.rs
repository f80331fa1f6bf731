//! EMT client configuration

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::models::Direction;

/// Configuration for the EMT Madrid API client
#[derive(Clone, Serialize, Deserialize)]
pub struct EmtConfig {
    /// Base URL of the EMT proxy server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Client identifier issued by EMT
    pub client_id: String,

    /// Passkey issued by EMT (sensitive - uses `SecretString`)
    #[serde(skip_serializing)]
    pub passkey: SecretString,

    /// `cultureInfo` sent with every request
    #[serde(default = "default_culture_info")]
    pub culture_info: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for the node/line metadata lookup, which is slow upstream
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,

    /// Check stop existence before fetching arrivals
    #[serde(default = "default_true")]
    pub check_stop_exists: bool,

    /// Wire tokens for the two line directions
    #[serde(default)]
    pub direction_tokens: DirectionTokens,

    /// Optional upper bound on entries held by each cache (unbounded when unset)
    #[serde(default)]
    pub cache_max_entries: Option<u64>,
}

fn default_base_url() -> String {
    "https://openbus.emtmadrid.es:9443/emt-proxy-server/last".to_string()
}

fn default_culture_info() -> String {
    "ES".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_metadata_timeout_secs() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

impl fmt::Debug for EmtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmtConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("passkey", &"[REDACTED]")
            .field("culture_info", &self.culture_info)
            .field("timeout_secs", &self.timeout_secs)
            .field("metadata_timeout_secs", &self.metadata_timeout_secs)
            .field("check_stop_exists", &self.check_stop_exists)
            .field("direction_tokens", &self.direction_tokens)
            .field("cache_max_entries", &self.cache_max_entries)
            .finish()
    }
}

impl EmtConfig {
    /// Create a configuration with the given credentials and default settings
    #[must_use]
    pub fn new(client_id: impl Into<String>, passkey: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            client_id: client_id.into(),
            passkey: SecretString::from(passkey.into()),
            culture_info: default_culture_info(),
            timeout_secs: default_timeout_secs(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            check_stop_exists: true,
            direction_tokens: DirectionTokens::default(),
            cache_max_entries: None,
        }
    }

    /// Create a configuration suitable for testing
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            timeout_secs: 5,
            metadata_timeout_secs: 5,
            ..Self::new("test-client", "test-passkey")
        }
    }

    /// Set a custom base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the accepted direction tokens
    #[must_use]
    pub fn with_direction_tokens(mut self, tokens: DirectionTokens) -> Self {
        self.direction_tokens = tokens;
        self
    }

    /// Enable or disable the existence check before arrivals
    #[must_use]
    pub const fn with_stop_check(mut self, enabled: bool) -> Self {
        self.check_stop_exists = enabled;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("base_url must not be empty".to_string());
        }

        if self.client_id.trim().is_empty() {
            return Err("client_id must not be empty".to_string());
        }

        if self.passkey.expose_secret().trim().is_empty() {
            return Err("passkey must not be empty".to_string());
        }

        if self.timeout_secs == 0 || self.metadata_timeout_secs == 0 {
            return Err("timeouts must be greater than 0".to_string());
        }

        self.direction_tokens.validate()
    }
}

/// The two strings the API accepts for a line direction
///
/// Newer API versions use `"1"`/`"2"`, older ones `"A"`/`"B"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionTokens {
    /// Token for [`Direction::Outbound`]
    pub outbound: String,
    /// Token for [`Direction::Inbound`]
    pub inbound: String,
}

impl Default for DirectionTokens {
    fn default() -> Self {
        Self {
            outbound: "1".to_string(),
            inbound: "2".to_string(),
        }
    }
}

impl DirectionTokens {
    /// Tokens used by the older `"A"`/`"B"` API
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            outbound: "A".to_string(),
            inbound: "B".to_string(),
        }
    }

    /// Map a wire token to a direction
    #[must_use]
    pub fn parse(&self, token: &str) -> Option<Direction> {
        if token == self.outbound {
            Some(Direction::Outbound)
        } else if token == self.inbound {
            Some(Direction::Inbound)
        } else {
            None
        }
    }

    /// Wire token for a direction
    #[must_use]
    pub fn token(&self, direction: Direction) -> &str {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.outbound.is_empty() || self.inbound.is_empty() {
            return Err("direction tokens must not be empty".to_string());
        }
        if self.outbound == self.inbound {
            return Err("direction tokens must differ".to_string());
        }
        Ok(())
    }
}
