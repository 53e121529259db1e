use std::path::{Path, PathBuf};

use crate::config::schema::{Config, MAX_BATCH_SIZE, MAX_CONCURRENT_BATCHES};
use crate::error::ConfigError;

/// Environment variable overriding `database_url`.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Returns `~/.element-import/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".element-import").join("config.json"))
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
        if !url.trim().is_empty() {
            log::debug!("Using database URL from {}", DATABASE_URL_ENV);
            config.database_url = url;
        }
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.database_url.trim().is_empty() {
        return Err(invalid("database_url must not be empty".to_string()));
    }

    let import = &config.import;
    if !(1..=MAX_BATCH_SIZE).contains(&import.batch_size) {
        return Err(invalid(format!(
            "import.batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, import.batch_size
        )));
    }
    if !(1..=MAX_CONCURRENT_BATCHES).contains(&import.concurrent_batches) {
        return Err(invalid(format!(
            "import.concurrent_batches must be between 1 and {}, got {}",
            MAX_CONCURRENT_BATCHES, import.concurrent_batches
        )));
    }
    if !(25..=50).contains(&import.monitor_interval_ms) {
        return Err(invalid(format!(
            "import.monitor_interval_ms must be between 25 and 50, got {}",
            import.monitor_interval_ms
        )));
    }
    if import.progress_interval_secs == 0 {
        return Err(invalid(
            "import.progress_interval_secs must be positive".to_string(),
        ));
    }
    if import.pending_window_minutes <= 0 {
        return Err(invalid(
            "import.pending_window_minutes must be positive".to_string(),
        ));
    }
    if import.max_cell_quantity < 1 {
        return Err(invalid(format!(
            "import.max_cell_quantity must be positive, got {}",
            import.max_cell_quantity
        )));
    }

    for (i, group) in config.hierarchy.aliases.iter().enumerate() {
        if group.len() < 2 {
            return Err(invalid(format!(
                "hierarchy.aliases[{}] needs at least two spellings",
                i
            )));
        }
        if let Some(empty) = group.iter().position(|alias| alias.trim().is_empty()) {
            return Err(invalid(format!(
                "hierarchy.aliases[{}][{}] is empty",
                i, empty
            )));
        }
    }

    let workbook = &config.workbook;
    if workbook.element_sheet.trim().is_empty() || workbook.summary_sheet.trim().is_empty() {
        return Err(invalid("workbook sheet names must not be empty".to_string()));
    }
    if workbook.data_start_row < 3 {
        return Err(invalid(format!(
            "workbook.data_start_row must be at least 3, got {}",
            workbook.data_start_row
        )));
    }

    Ok(())
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.import.batch_size, 30);
        assert_eq!(config.import.concurrent_batches, 15);
        assert_eq!(config.import.progress_interval_secs, 5);
        assert_eq!(config.import.monitor_interval_ms, 40);
        assert!(!config.import.rollback_enabled_by_default);
        assert_eq!(config.hierarchy.aliases.len(), 2);
        assert_eq!(config.workbook.element_sheet, "Element Types");
        assert_eq!(config.workbook.data_start_row, 4);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_url": "postgres://localhost/projects",
            "import": {
                "batch_size": 10,
                "concurrent_batches": 4,
                "monitor_interval_ms": 25,
                "rollback_enabled_by_default": true
            },
            "hierarchy": {
                "aliases": [["block_", "blk_"]]
            },
            "workbook": {
                "element_sheet": "Elements",
                "summary_sheet": "Overview"
            }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/projects");
        assert_eq!(config.import.batch_size, 10);
        assert_eq!(config.import.concurrent_batches, 4);
        assert!(config.import.rollback_enabled_by_default);
        assert_eq!(config.hierarchy.aliases, vec![vec!["block_", "blk_"]]);
        assert_eq!(config.workbook.element_sheet, "Elements");
        assert_eq!(config.workbook.summary_sheet, "Overview");
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_batch_size_out_of_range() {
        let result = load_config_from_str(r#"{ "import": { "batch_size": 51 } }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));

        let result = load_config_from_str(r#"{ "import": { "batch_size": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_concurrent_batches_out_of_range() {
        let result = load_config_from_str(r#"{ "import": { "concurrent_batches": 21 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_monitor_interval_out_of_range() {
        let result = load_config_from_str(r#"{ "import": { "monitor_interval_ms": 200 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_max_cell_quantity() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.import.max_cell_quantity, 10_000);

        let config = load_config_from_str(r#"{ "import": { "max_cell_quantity": 250 } }"#).unwrap();
        assert_eq!(config.import.max_cell_quantity, 250);

        let result = load_config_from_str(r#"{ "import": { "max_cell_quantity": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_alias_group_needs_two_entries() {
        let result = load_config_from_str(r#"{ "hierarchy": { "aliases": [["tower_"]] } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/element-import.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    #[serial]
    fn test_load_config_from_file_with_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "database_url": "sqlite::memory:" }"#).unwrap();

        std::env::remove_var(DATABASE_URL_ENV);
        let config = load_config(&path).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");

        std::env::set_var(DATABASE_URL_ENV, "postgres://db/override");
        let config = load_config(&path).unwrap();
        std::env::remove_var(DATABASE_URL_ENV);
        assert_eq!(config.database_url, "postgres://db/override");
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("config.json"));
            assert!(path.to_string_lossy().contains(".element-import"));
        }
    }
}
