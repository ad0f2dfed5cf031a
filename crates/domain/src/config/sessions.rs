use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session store configuration.
///
/// By default sessions live for the lifetime of the process.  Setting
/// `idle_ttl_secs` turns on a background sweeper that evicts sessions idle
/// longer than the TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,
    #[serde(default = "d_60")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: None,
            sweep_interval_secs: 60,
        }
    }
}

fn d_60() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_disabled_by_default() {
        let cfg: SessionsConfig = toml::from_str("").unwrap();
        assert!(cfg.idle_ttl_secs.is_none());
        assert_eq!(cfg.sweep_interval_secs, 60);
    }
}
