//! Persistence unit configuration.
//!
//! # Responsibility
//! - Load named persistence units from a TOML file.
//! - Offer programmatic construction producing the same `StoreConfig`.
//!
//! # Invariants
//! - Only the `sqlite` driver and dialect are accepted.
//! - A missing file or unit is a fatal startup error, never retried.
//!
//! File layout:
//!
//! ```toml
//! [units.config]
//! store_url = "sqlite://crudkit.db"
//! driver = "sqlite"
//! schema_mode = "update"
//! statement_timeout_ms = 5000
//!
//! [units.config.mappings.Employee]
//! table = "EMP_2"
//! columns = { id = "e_id", name = "e_name" }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUPPORTED_DRIVER: &str = "sqlite";
pub const MEMORY_URL: &str = "sqlite::memory:";
const FILE_URL_PREFIX: &str = "sqlite://";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Missing(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        origin: String,
        message: String,
    },
    UnknownUnit(String),
    InvalidOption {
        unit: String,
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "configuration file not found: {}", path.display()),
            Self::Io { path, source } => {
                write!(f, "failed to read configuration `{}`: {source}", path.display())
            }
            Self::Parse { origin, message } => {
                write!(f, "malformed configuration `{origin}`: {message}")
            }
            Self::UnknownUnit(unit) => write!(f, "persistence unit `{unit}` is not defined"),
            Self::InvalidOption {
                unit,
                key,
                value,
                expected,
            } => write!(
                f,
                "unit `{unit}`: invalid `{key}` value `{value}`; expected {expected}"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Schema generation policy applied when a connection is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaMode {
    /// No DDL is issued.
    None,
    /// Every mapped table and column must already exist.
    Validate,
    /// Missing tables are created; existing ones are left alone.
    #[default]
    Update,
    /// Mapped tables are dropped and recreated.
    Create,
    /// Like `Create`, and tables are dropped again on close.
    CreateDrop,
}

impl SchemaMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Validate => "validate",
            Self::Update => "update",
            Self::Create => "create",
            Self::CreateDrop => "create-drop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Table/column renames applied on top of an entity's declared mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingOverride {
    pub table: Option<String>,
    /// Field name -> column name.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

/// Resolved options of one persistence unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub unit: String,
    pub store_url: String,
    pub location: StoreLocation,
    pub driver: String,
    pub dialect: String,
    pub schema_mode: SchemaMode,
    pub credentials: Option<Credentials>,
    pub statement_timeout: Option<Duration>,
    pub show_sql: bool,
    /// Entity name -> mapping override.
    pub mappings: BTreeMap<String, MappingOverride>,
}

impl StoreConfig {
    /// Programmatic in-memory unit named `default`.
    pub fn in_memory() -> Self {
        Self::with_location("default", MEMORY_URL.to_string(), StoreLocation::Memory)
    }

    /// Programmatic file-backed unit named `default`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let url = format!("{FILE_URL_PREFIX}{}", path.display());
        Self::with_location("default", url, StoreLocation::File(path))
    }

    fn with_location(unit: &str, store_url: String, location: StoreLocation) -> Self {
        Self {
            unit: unit.to_string(),
            store_url,
            location,
            driver: SUPPORTED_DRIVER.to_string(),
            dialect: SUPPORTED_DRIVER.to_string(),
            schema_mode: SchemaMode::default(),
            credentials: None,
            statement_timeout: None,
            show_sql: false,
            mappings: BTreeMap::new(),
        }
    }

    pub fn with_schema_mode(mut self, schema_mode: SchemaMode) -> Self {
        self.schema_mode = schema_mode;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_mapping(mut self, entity: impl Into<String>, mapping: MappingOverride) -> Self {
        self.mappings.insert(entity.into(), mapping);
        self
    }

    /// Loads one named unit from a TOML configuration file.
    ///
    /// # Errors
    /// - `Missing` when the file does not exist.
    /// - `Parse` / `InvalidOption` when the content is malformed.
    /// - `UnknownUnit` when the file has no such unit.
    pub fn load(path: impl AsRef<Path>, unit: &str) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string(), unit)
    }

    /// Parses one named unit out of TOML text. `origin` labels parse errors.
    pub fn from_toml_str(text: &str, origin: &str, unit: &str) -> ConfigResult<Self> {
        let file: ConfigFile = toml::from_str(text).map_err(|err| ConfigError::Parse {
            origin: origin.to_string(),
            message: err.to_string(),
        })?;
        let raw = file
            .units
            .get(unit)
            .ok_or_else(|| ConfigError::UnknownUnit(unit.to_string()))?;
        raw.resolve(unit)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    units: BTreeMap<String, RawUnit>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUnit {
    store_url: String,
    driver: Option<String>,
    dialect: Option<String>,
    #[serde(default)]
    schema_mode: SchemaMode,
    username: Option<String>,
    password: Option<String>,
    statement_timeout_ms: Option<u64>,
    #[serde(default)]
    show_sql: bool,
    #[serde(default)]
    mappings: BTreeMap<String, MappingOverride>,
}

impl RawUnit {
    fn resolve(&self, unit: &str) -> ConfigResult<StoreConfig> {
        let invalid = |key: &'static str, value: &str, expected: &'static str| {
            ConfigError::InvalidOption {
                unit: unit.to_string(),
                key,
                value: value.to_string(),
                expected,
            }
        };

        let driver = normalize_name(self.driver.as_deref().unwrap_or(SUPPORTED_DRIVER));
        if driver != SUPPORTED_DRIVER {
            return Err(invalid("driver", &driver, "`sqlite`"));
        }
        let dialect = normalize_name(self.dialect.as_deref().unwrap_or(&driver));
        if dialect != SUPPORTED_DRIVER {
            return Err(invalid("dialect", &dialect, "`sqlite`"));
        }

        let store_url = self.store_url.trim().to_string();
        let location = parse_store_url(&store_url).ok_or_else(|| {
            invalid(
                "store_url",
                &store_url,
                "`sqlite::memory:` or `sqlite://<path>`",
            )
        })?;

        let credentials = match (&self.username, &self.password) {
            (None, None) => None,
            (Some(username), password) => Some(Credentials {
                username: username.clone(),
                password: password.clone().unwrap_or_default(),
            }),
            (None, Some(_)) => {
                return Err(invalid("password", "<redacted>", "a `username` alongside it"))
            }
        };

        let statement_timeout = match self.statement_timeout_ms {
            Some(0) => return Err(invalid("statement_timeout_ms", "0", "a positive duration")),
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };

        Ok(StoreConfig {
            unit: unit.to_string(),
            store_url,
            location,
            driver,
            dialect,
            schema_mode: self.schema_mode,
            credentials,
            statement_timeout,
            show_sql: self.show_sql,
            mappings: self.mappings.clone(),
        })
    }
}

fn normalize_name(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn parse_store_url(url: &str) -> Option<StoreLocation> {
    if url == MEMORY_URL {
        return Some(StoreLocation::Memory);
    }
    let path = url.strip_prefix(FILE_URL_PREFIX)?;
    if path.is_empty() {
        return None;
    }
    Some(StoreLocation::File(PathBuf::from(path)))
}
