//! TOML defaults for subject fields, key parameters and output.
//!
//! A missing default config file is not an error; an explicitly named one
//! that cannot be read is.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::csr::params::SubjectFields;
use crate::error::{MakeCsrError, Result};
use crate::key::KeyType;
use crate::output::OutputFormat;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MAKECSR_CONFIG";

const APP_DIR: &str = "makecsr";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub format: Option<OutputFormat>,
    /// Directory for `<cn>.key` and `<cn>.csr` when no output path is given.
    pub output_dir: Option<PathBuf>,
    /// One common name per line, selectable by index.
    pub common_names_file: Option<PathBuf>,
    pub subject: SubjectDefaults,
    pub key: KeyConfig,
}

/// Subject values used when the matching flag is absent.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubjectDefaults {
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
}

impl SubjectDefaults {
    /// Fill every field of `overrides` that is `None` from these defaults.
    pub fn apply(&self, overrides: SubjectFields) -> SubjectFields {
        SubjectFields {
            common_name: overrides.common_name,
            organization: overrides.organization.or_else(|| self.organization.clone()),
            organizational_unit: overrides
                .organizational_unit
                .or_else(|| self.organizational_unit.clone()),
            locality: overrides.locality.or_else(|| self.locality.clone()),
            state: overrides.state.or_else(|| self.state.clone()),
            country: overrides.country.or_else(|| self.country.clone()),
            email: overrides.email.or_else(|| self.email.clone()),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyConfig {
    #[serde(rename = "type")]
    pub key_type: Option<KeyType>,
    pub size: Option<usize>,
    pub curve: Option<String>,
}

impl Config {
    /// Load `explicit` if given, else the default file if it exists, else
    /// built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                debug!("no config file, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config file");
        let contents = fs::read_to_string(path).map_err(|e| {
            MakeCsrError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config: Config = toml::from_str(&contents).map_err(|e| {
            MakeCsrError::ConfigError(format!("failed to parse {}: {e}", path.display()))
        })?;

        config.output_dir = config.output_dir.map(|p| expand_tilde(&p));
        config.common_names_file = config.common_names_file.map(|p| expand_tilde(&p));
        Ok(config)
    }

    /// The common-name list file, falling back to `cn.txt` next to the
    /// default config file.
    pub fn common_names_path(&self) -> Option<PathBuf> {
        self.common_names_file
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR).join("cn.txt")))
    }
}

/// `<platform config dir>/makecsr/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// Replace a leading `~` component with the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Read a common-name list: one name per line, trimmed, blank lines skipped.
pub fn load_common_names(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path).map_err(|source| MakeCsrError::ReadFailure {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Pick the `index`-th (1-based) common name.
pub fn select_common_name(names: &[String], index: usize) -> Result<String> {
    index
        .checked_sub(1)
        .and_then(|i| names.get(i))
        .cloned()
        .ok_or_else(|| {
            MakeCsrError::invalid_field(
                "common-name-index",
                format!("must be between 1 and {}", names.len()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let contents = r#"
            format = "der"
            output_dir = "/tmp/csr"

            [subject]
            organization = "BRIDGE CO.,LTD."
            country = "JP"

            [key]
            type = "ecdsa"
            curve = "p384"
        "#;
        fs::write(&path, contents).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.format, Some(OutputFormat::Der));
        assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/csr")));
        assert_eq!(
            config.subject.organization.as_deref(),
            Some("BRIDGE CO.,LTD.")
        );
        assert_eq!(config.key.key_type, Some(KeyType::Ecdsa));
        assert_eq!(config.key.curve.as_deref(), Some("p384"));
        assert_eq!(config.key.size, None);
    }

    #[test]
    fn test_explicit_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, MakeCsrError::ConfigError(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[subject]\norganisation = \"typo\"\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(MakeCsrError::ConfigError(_))
        ));
    }

    #[test]
    fn test_defaults_fill_and_flags_override() {
        let defaults = SubjectDefaults {
            organization: Some("Default Org".to_string()),
            country: Some("JP".to_string()),
            ..Default::default()
        };
        let fields = defaults.apply(
            SubjectFields::builder()
                .common_name("example.com".to_string())
                .country("SE".to_string())
                .build(),
        );
        assert_eq!(fields.common_name.as_deref(), Some("example.com"));
        assert_eq!(fields.organization.as_deref(), Some("Default Org"));
        assert_eq!(fields.country.as_deref(), Some("SE"));
        assert_eq!(fields.locality, None);
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde(Path::new("~/csr")), home.join("csr"));
        assert_eq!(expand_tilde(Path::new("/abs/csr")), PathBuf::from("/abs/csr"));
    }

    #[test]
    fn test_common_names_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cn.txt");
        fs::write(&path, "www.example.com\n\n  api.example.com  \n").unwrap();

        let names = load_common_names(&path).unwrap();
        assert_eq!(names, vec!["www.example.com", "api.example.com"]);
        assert_eq!(select_common_name(&names, 2).unwrap(), "api.example.com");
        assert!(select_common_name(&names, 0).is_err());
        assert!(select_common_name(&names, 3).is_err());
    }
}
