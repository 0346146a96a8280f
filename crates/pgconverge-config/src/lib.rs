//! Facet types for pgconverge configuration and spec files.
//!
//! Connection defaults live in `.config/pgconverge.styx`, found by searching
//! from the working directory upward:
//!
//! ```text
//! connection {
//!     host db.internal
//!     user app
//!     database app
//! }
//! ```
//!
//! Desired tables and rows can be described in their own styx files and
//! turned into [`pgconverge::DesiredTable`] / [`pgconverge::RowTarget`]:
//!
//! ```text
//! name app_config
//! owner app
//! columns {
//!     key { type text, nullable false }
//!     value { type "character varying(200)" }
//! }
//! primary-key (key)
//! ```

use std::path::{Path, PathBuf};

use facet::Facet;
use indexmap::IndexMap;
use pgconverge::{ConnectionParams, DesiredColumn, DesiredTable, Presence, RowTarget, Value};

mod error;

pub use error::ConfigError;

/// Location of the config file relative to a project directory.
pub const CONFIG_PATH: &str = ".config/pgconverge.styx";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    #[facet(default)]
    pub connection: ConnectionConfig,
}

/// Connection settings. Anything left out keeps its default.
#[derive(Debug, Clone, Default, Facet)]
#[facet(rename_all = "kebab-case")]
pub struct ConnectionConfig {
    /// A `postgres://` URL; wins over the individual fields.
    #[facet(default)]
    pub url: Option<String>,
    #[facet(default)]
    pub host: Option<String>,
    #[facet(default)]
    pub port: Option<u16>,
    #[facet(default)]
    pub user: Option<String>,
    #[facet(default)]
    pub password: Option<String>,
    #[facet(default)]
    pub database: Option<String>,
    #[facet(default)]
    pub unix_socket: Option<String>,
}

impl ConnectionConfig {
    /// Overwrite the fields of `params` that this config sets.
    pub fn apply(&self, params: &mut ConnectionParams) {
        if let Some(url) = &self.url {
            params.url = Some(url.clone());
        }
        if let Some(host) = &self.host {
            params.host = host.clone();
        }
        if let Some(port) = self.port {
            params.port = port;
        }
        if let Some(user) = &self.user {
            params.user = user.clone();
        }
        if let Some(password) = &self.password {
            params.password = password.clone();
        }
        if let Some(database) = &self.database {
            params.database = database.clone();
        }
        if let Some(unix_socket) = &self.unix_socket {
            params.unix_socket = unix_socket.clone();
        }
    }
}

/// A desired table as written in a spec file.
#[derive(Debug, Clone, Facet)]
#[facet(rename_all = "kebab-case")]
pub struct TableSpec {
    pub name: String,
    #[facet(default)]
    pub schema: Option<String>,
    #[facet(default)]
    pub owner: Option<String>,
    /// `present` (default) or `absent`.
    #[facet(default)]
    pub state: Option<String>,
    /// Columns in table order, keyed by name.
    #[facet(default)]
    pub columns: IndexMap<String, ColumnSpec>,
    #[facet(default)]
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, Facet)]
pub struct ColumnSpec {
    #[facet(rename = "type", default)]
    pub sql_type: Option<String>,
    /// Defaults to `true`.
    #[facet(default)]
    pub nullable: Option<bool>,
}

impl TableSpec {
    /// Build and validate the desired table.
    pub fn to_desired(&self) -> pgconverge::Result<DesiredTable> {
        let mut table = DesiredTable::new(&self.name);
        if let Some(schema) = &self.schema {
            table = table.in_schema(schema);
        }
        if let Some(owner) = &self.owner {
            table = table.owned_by(owner);
        }
        if let Some(state) = &self.state {
            table.state = state.parse::<Presence>()?;
        }
        for (name, spec) in &self.columns {
            table = table.column(DesiredColumn {
                name: name.clone(),
                sql_type: spec.sql_type.clone().unwrap_or_default(),
                nullable: spec.nullable.unwrap_or(true),
            });
        }
        table = table.primary_key(self.primary_key.iter().cloned());
        table.validate()?;
        Ok(table)
    }
}

/// A desired row as written in a spec file.
///
/// Values are text; Postgres parses them with the column's input function.
#[derive(Debug, Clone, Facet)]
pub struct RowSpec {
    pub table: String,
    #[facet(default)]
    pub schema: Option<String>,
    #[facet(default)]
    pub state: Option<String>,
    #[facet(default)]
    pub row: IndexMap<String, String>,
}

impl RowSpec {
    /// Build and validate the row target.
    pub fn to_target(&self) -> pgconverge::Result<RowTarget> {
        let row = self
            .row
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect();
        let mut target = RowTarget::new(&self.table, row);
        if let Some(schema) = &self.schema {
            target = target.in_schema(schema);
        }
        if let Some(state) = &self.state {
            target.state = state.parse::<Presence>()?;
        }
        target.validate()?;
        Ok(target)
    }
}

/// Load configuration from `.config/pgconverge.styx`, searching up the directory tree.
pub fn load() -> Result<(Config, PathBuf), ConfigError> {
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Path) -> Result<(Config, PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    let content = read(&config_path)?;
    let config: Config = facet_styx::from_str(&content).map_err(|e| ConfigError::Parse {
        path: config_path.clone(),
        message: e.to_string(),
    })?;
    tracing::debug!(path = %config_path.display(), "loaded config");
    Ok((config, config_path))
}

/// Find `.config/pgconverge.styx` by searching up the directory tree.
fn find_config_file(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_PATH);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a table spec file into a validated [`DesiredTable`].
pub fn load_table_spec(path: &Path) -> Result<DesiredTable, ConfigError> {
    let content = read(path)?;
    let spec: TableSpec = facet_styx::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    spec.to_desired().map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a row spec file into a validated [`RowTarget`].
pub fn load_row_spec(path: &Path) -> Result<RowTarget, ConfigError> {
    let content = read(path)?;
    let spec: RowSpec = facet_styx::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    spec.to_target().map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}
