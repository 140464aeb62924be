use std::path::Path;

use fairgate_core::FairgateConfig;
use tracing::info;

use crate::error::ServerError;

/// Locations searched for a config file, first match wins.
pub const CONFIG_PATHS: [&str; 2] = ["fairgate.toml", "/etc/fairgate/fairgate.toml"];

/// Load the first config file found in `paths`, or defaults when none
/// exists, then apply environment overrides and validate.
pub fn load_config(paths: &[&str]) -> Result<FairgateConfig, ServerError> {
    let mut config = read_first(paths)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

fn read_first(paths: &[&str]) -> Result<FairgateConfig, ServerError> {
    for path in paths {
        if !Path::new(path).exists() {
            continue;
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_string(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ServerError::ConfigParse {
            path: path.to_string(),
            source,
        })?;
        info!(path, "loaded configuration");
        return Ok(config);
    }

    info!("no config file found, using defaults");
    Ok(FairgateConfig::default())
}

/// `FAIRGATE_DATA_DIR` and `FAIRGATE_REDIS_URL` take precedence over the
/// file.
pub fn apply_env_overrides(config: &mut FairgateConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = var("FAIRGATE_DATA_DIR") {
        config.store.data_dir = dir;
    }
    if let Some(url) = var("FAIRGATE_REDIS_URL") {
        config.store.redis_url = url;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use fairgate_core::broker::config::StoreBackend;

    use super::*;

    #[test]
    fn first_existing_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        std::fs::write(&first, "[admission]\nthreshold = 7\n").unwrap();
        std::fs::write(&second, "[admission]\nthreshold = 9\n").unwrap();

        let missing = dir.path().join("missing.toml");
        let paths = [
            missing.to_str().unwrap(),
            first.to_str().unwrap(),
            second.to_str().unwrap(),
        ];
        let config = read_first(&paths).unwrap();
        assert_eq!(config.admission.threshold, 7);
    }

    #[test]
    fn no_file_gives_defaults() {
        let config = read_first(&["/nonexistent/fairgate.toml"]).unwrap();
        assert_eq!(config.admission.threshold, 100);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[scheduler\nquantum = 1").unwrap();
        let err = read_first(&[path.to_str().unwrap()]).unwrap_err();
        assert!(matches!(err, ServerError::ConfigParse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "[scheduler]\nquantum = 0\n").unwrap();
        let err = load_config(&[path.to_str().unwrap()]).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn env_overrides_replace_store_locations() {
        let vars: HashMap<&str, &str> = [
            ("FAIRGATE_DATA_DIR", "/var/lib/fairgate"),
            ("FAIRGATE_REDIS_URL", "redis://cache:6379"),
        ]
        .into_iter()
        .collect();

        let mut config = FairgateConfig::default();
        apply_env_overrides(&mut config, |name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.store.data_dir, "/var/lib/fairgate");
        assert_eq!(config.store.redis_url, "redis://cache:6379");
    }
}
