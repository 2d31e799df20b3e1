// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model configuration, optionally loaded from environment variables.

use std::str::FromStr;

/// How reverse lookups ("who points at this record?") are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReverseLookup {
    /// Linear scan over every record on each query.
    Scan,
    /// Referrer index maintained on every pointer write.
    #[default]
    Indexed,
}

impl FromStr for ReverseLookup {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(ReverseLookup::Scan),
            "indexed" | "index" => Ok(ReverseLookup::Indexed),
            _ => Err(()),
        }
    }
}

/// Per-model configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Reverse lookup strategy. Both strategies answer identically.
    pub reverse_lookup: ReverseLookup,
    /// Emit a warning when a singular lookup finds several matches.
    pub warn_on_ambiguous: bool,
}

impl ModelConfig {
    /// Load configuration from environment variables.
    ///
    /// `BEM_LITE_REVERSE_LOOKUP` is `scan` or `indexed`;
    /// `BEM_LITE_WARN_AMBIGUOUS` is `true` or `false`. Absent or unparsable
    /// values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reverse_lookup: std::env::var("BEM_LITE_REVERSE_LOOKUP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reverse_lookup),
            warn_on_ambiguous: std::env::var("BEM_LITE_WARN_AMBIGUOUS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.warn_on_ambiguous),
        }
    }

    /// Same configuration with a different reverse lookup strategy.
    pub fn with_reverse_lookup(mut self, reverse_lookup: ReverseLookup) -> Self {
        self.reverse_lookup = reverse_lookup;
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            reverse_lookup: ReverseLookup::Indexed,
            warn_on_ambiguous: true,
        }
    }
}
