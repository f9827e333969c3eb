use serde::{Deserialize, Serialize};

use crate::ops::undo::HISTORY_LIMIT;

/// Configuration from `.canopy/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanopyConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum undo entries kept. Values above the built-in cap are clamped.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            limit: HISTORY_LIMIT,
        }
    }
}

impl HistoryConfig {
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, HISTORY_LIMIT)
    }
}

fn default_history_limit() -> usize {
    HISTORY_LIMIT
}

/// Defaults for `canopy list`. Values use the same syntax as the CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub default_section: Option<String>,
    #[serde(default)]
    pub default_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Truncate tree lines to this many terminal cells. Unset means no limit.
    #[serde(default)]
    pub width: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: CanopyConfig = toml::from_str("").unwrap();
        assert_eq!(config, CanopyConfig::default());
        assert_eq!(config.history.limit, 50);
    }

    #[test]
    fn partial_tables_fill_in_defaults() {
        let config: CanopyConfig = toml::from_str(
            r#"
[view]
default_section = "today"

[display]
width = 60
"#,
        )
        .unwrap();
        assert_eq!(config.view.default_section.as_deref(), Some("today"));
        assert_eq!(config.view.default_status, None);
        assert_eq!(config.display.width, Some(60));
        assert_eq!(config.history.limit, 50);
    }

    #[test]
    fn history_limit_is_clamped_to_the_cap() {
        let high = HistoryConfig { limit: 500 };
        assert_eq!(high.effective_limit(), 50);
        let zero = HistoryConfig { limit: 0 };
        assert_eq!(zero.effective_limit(), 1);
        let low = HistoryConfig { limit: 10 };
        assert_eq!(low.effective_limit(), 10);
    }
}
