//! Codec configuration.
//!
//! The façade's encode/decode operations read the process-wide current
//! configuration. Hosts typically install one at startup, either built in
//! code or loaded from JSON.
//!
//! # Example
//! ```rust
//! use protoz::config::CodecConfig;
//!
//! let cfg = CodecConfig::from_json(r#"{ "recursion_limit": 32 }"#).unwrap();
//! assert_eq!(cfg.recursion_limit, 32);
//! assert!(cfg.preserve_unknown_fields);
//! ```

use std::sync::LazyLock;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum message nesting depth for encode and decode.
pub const DEFAULT_RECURSION_LIMIT: u32 = 100;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum nesting depth of submessages
    pub recursion_limit: u32,
    /// Keep unrecognized wire fields and re-emit them on encode
    pub preserve_unknown_fields: bool,
    /// Pretty-print JSON output
    pub json_pretty: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            preserve_unknown_fields: true,
            json_pretty: false,
        }
    }
}

static CURRENT: LazyLock<RwLock<CodecConfig>> =
    LazyLock::new(|| RwLock::new(CodecConfig::default()));

impl CodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; absent keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: CodecConfig = serde_json::from_str(text)?;
        if cfg.recursion_limit == 0 {
            return Err(Error::ParseError(
                "recursion_limit must be at least 1".into(),
            ));
        }
        Ok(cfg)
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    pub fn with_preserve_unknown_fields(mut self, preserve: bool) -> Self {
        self.preserve_unknown_fields = preserve;
        self
    }

    pub fn with_json_pretty(mut self, pretty: bool) -> Self {
        self.json_pretty = pretty;
        self
    }

    /// Snapshot of the process-wide configuration.
    pub fn current() -> CodecConfig {
        CURRENT.read().clone()
    }

    /// Replace the process-wide configuration, returning the previous one.
    pub fn install(self) -> CodecConfig {
        tracing::debug!("[CFG] Installing codec config: {:?}", self);
        std::mem::replace(&mut *CURRENT.write(), self)
    }
}
