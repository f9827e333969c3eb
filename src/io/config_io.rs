use std::fs;

use crate::io::atomic::atomic_write;
use crate::io::project_io::{ProjectError, ProjectPaths};
use crate::model::config::CanopyConfig;
use crate::view::{SectionFilter, StatusFilter};

const CONFIG_TEMPLATE: &str = r##"# canopy project configuration

[history]
# Undo steps kept between invocations (at most 50)
limit = 50

[view]
# Section shown by `canopy list` when none is given:
# all, today, upcoming, past, no-date, focus, YYYY-MM, YYYY, or START..END
# default_section = "all"
# default_status = "incomplete"   # all, completed, incomplete

[display]
# Truncate tree lines to this many columns
# width = 100
"##;

/// Keys accepted by `canopy config`
pub const CONFIG_KEYS: &[&str] = &[
    "history.limit",
    "view.default_section",
    "view.default_status",
    "display.width",
];

/// Read the project config, returning both the parsed config and the raw
/// toml_edit document for round-trip-safe editing. A missing file reads as
/// the defaults.
pub fn read_config(paths: &ProjectPaths) -> Result<(CanopyConfig, toml_edit::DocumentMut), ProjectError> {
    let config_path = paths.config();
    if !config_path.exists() {
        return Ok((CanopyConfig::default(), toml_edit::DocumentMut::new()));
    }
    let config_text = fs::read_to_string(&config_path).map_err(|e| ProjectError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: CanopyConfig = toml::from_str(&config_text)?;
    let doc: toml_edit::DocumentMut = config_text.parse()?;
    Ok((config, doc))
}

/// Write the config document back to disk, preserving formatting.
pub fn write_config(paths: &ProjectPaths, doc: &toml_edit::DocumentMut) -> Result<(), ProjectError> {
    atomic_write(&paths.config(), doc.to_string().as_bytes())?;
    Ok(())
}

pub fn write_template(paths: &ProjectPaths) -> Result<(), ProjectError> {
    atomic_write(&paths.config(), CONFIG_TEMPLATE.as_bytes())?;
    Ok(())
}

/// Set a single dotted key in the document after validating the value.
pub fn set_value(doc: &mut toml_edit::DocumentMut, key: &str, value: &str) -> Result<(), ProjectError> {
    let invalid = |reason: String| ProjectError::InvalidConfigValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    };
    let (table, field) = key
        .split_once('.')
        .filter(|_| CONFIG_KEYS.contains(&key))
        .ok_or_else(|| ProjectError::UnknownConfigKey(key.to_string()))?;

    let item = match key {
        "history.limit" | "display.width" => {
            let n: i64 = value.parse().map_err(|_| invalid("expected a number".into()))?;
            if n < 1 {
                return Err(invalid("must be at least 1".into()));
            }
            toml_edit::value(n)
        }
        "view.default_section" => {
            value
                .parse::<SectionFilter>()
                .map_err(|e| invalid(e.to_string()))?;
            toml_edit::value(value)
        }
        "view.default_status" => {
            value
                .parse::<StatusFilter>()
                .map_err(|e| invalid(e.to_string()))?;
            toml_edit::value(value)
        }
        _ => return Err(ProjectError::UnknownConfigKey(key.to_string())),
    };

    if !doc.contains_key(table) {
        doc[table] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc[table][field] = item;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> (TempDir, ProjectPaths) {
        let tmp = TempDir::new().unwrap();
        let paths = ProjectPaths::new(tmp.path());
        fs::create_dir_all(&paths.dir).unwrap();
        (tmp, paths)
    }

    #[test]
    fn template_parses_to_defaults() {
        let (_tmp, paths) = project();
        write_template(&paths).unwrap();
        let (config, _doc) = read_config(&paths).unwrap();
        assert_eq!(config, CanopyConfig::default());
    }

    #[test]
    fn missing_config_reads_as_defaults() {
        let (_tmp, paths) = project();
        let (config, doc) = read_config(&paths).unwrap();
        assert_eq!(config, CanopyConfig::default());
        assert!(doc.is_empty());
    }

    #[test]
    fn round_trip_preserves_comments() {
        let (_tmp, paths) = project();
        write_template(&paths).unwrap();
        let (_config, doc) = read_config(&paths).unwrap();
        write_config(&paths, &doc).unwrap();
        assert_eq!(fs::read_to_string(paths.config()).unwrap(), CONFIG_TEMPLATE);
    }

    #[test]
    fn set_value_edits_in_place() {
        let mut doc: toml_edit::DocumentMut = CONFIG_TEMPLATE.parse().unwrap();
        set_value(&mut doc, "history.limit", "20").unwrap();
        set_value(&mut doc, "view.default_section", "today").unwrap();
        let text = doc.to_string();
        assert!(text.contains("limit = 20"));
        assert!(text.contains("# Undo steps kept"));

        let config: CanopyConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.history.limit, 20);
        assert_eq!(config.view.default_section.as_deref(), Some("today"));
    }

    #[test]
    fn set_value_creates_missing_tables() {
        let mut doc = toml_edit::DocumentMut::new();
        set_value(&mut doc, "display.width", "80").unwrap();
        let config: CanopyConfig = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(config.display.width, Some(80));
    }

    #[test]
    fn set_value_rejects_bad_input() {
        let mut doc = toml_edit::DocumentMut::new();
        assert!(matches!(
            set_value(&mut doc, "ui.theme", "dark"),
            Err(ProjectError::UnknownConfigKey(_))
        ));
        assert!(matches!(
            set_value(&mut doc, "history.limit", "lots"),
            Err(ProjectError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            set_value(&mut doc, "view.default_status", "maybe"),
            Err(ProjectError::InvalidConfigValue { .. })
        ));
    }
}
