//! Layered configuration loading: defaults, then a TOML file, then
//! prefixed environment variables.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Load a configuration struct from `T::default()`, an optional TOML file
/// and environment variables.
///
/// An explicit `path` must exist. Without one, `default_file` is merged
/// only if present in the working directory. Environment variables use
/// `env_prefix` and `__` as the nesting separator, so
/// `FLEETRENT_DATABASE__URL` overrides `database.url`.
pub fn load_layered<T>(
    path: Option<&Path>,
    default_file: &str,
    env_prefix: &str,
) -> Result<T, ConfigurationError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigurationError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let default_path = PathBuf::from(default_file);
            if default_path.exists() {
                figment = figment.merge(Toml::file(default_path));
            }
        }
    }

    figment = figment.merge(Env::prefixed(env_prefix).split("__"));

    figment
        .extract()
        .map_err(|e| ConfigurationError::ParseError {
            details: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        nested: Nested,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Nested {
        port: u16,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                nested: Nested { port: 8080 },
            }
        }
    }

    #[test]
    fn defaults_apply_without_file() {
        let cfg: Sample =
            load_layered(None, "definitely-missing.toml", "FLEETRENT_COMMON_TEST_A_").unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"from-file\"\n[nested]\nport = 9000").unwrap();

        let cfg: Sample =
            load_layered(Some(file.path()), "unused.toml", "FLEETRENT_COMMON_TEST_B_").unwrap();
        assert_eq!(cfg.name, "from-file");
        assert_eq!(cfg.nested.port, 9000);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result: Result<Sample, _> = load_layered(
            Some(Path::new("/nonexistent/fleetrent.toml")),
            "unused.toml",
            "FLEETRENT_COMMON_TEST_C_",
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::FileNotFound { .. })
        ));
    }
}
