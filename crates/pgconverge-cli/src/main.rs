//! pgconverge CLI
//!
//! Converges one table, one row, or runs one query per invocation.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use pgconverge::{
    ColumnStrategy, ConnectionParams, Presence, ReconcileOptions, RowTarget, Value, connect,
    reconcile_row, reconcile_table, run_query,
};
use pgconverge_config::ConfigError;
use tracing_subscriber::EnvFilter;

mod output;

/// Declarative Postgres tables and rows.
#[derive(Parser, Debug)]
#[command(name = "pgconverge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection flags. Each one overrides the config file.
#[derive(Args, Debug, Default)]
struct ConnectionArgs {
    /// Connection URL; wins over the individual flags.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "PGCONVERGE_HOST", global = true)]
    host: Option<String>,

    #[arg(long, env = "PGCONVERGE_PORT", global = true)]
    port: Option<u16>,

    #[arg(long, env = "PGCONVERGE_USER", global = true)]
    user: Option<String>,

    #[arg(long, env = "PGCONVERGE_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    #[arg(long, env = "PGCONVERGE_DATABASE", global = true)]
    database: Option<String>,

    /// Directory holding the server's unix socket, used when host is empty or localhost.
    #[arg(long, env = "PGCONVERGE_UNIX_SOCKET", global = true)]
    unix_socket: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Converge a table to the shape described in a spec file.
    Table {
        /// Styx file describing the table.
        #[arg(long)]
        spec: PathBuf,

        /// Report what would change without changing anything.
        #[arg(long)]
        check: bool,

        /// Alter mismatched columns in place instead of dropping and re-adding them.
        #[arg(long)]
        alter_columns: bool,
    },

    /// Make sure a row exists (or does not).
    Row {
        /// Styx file describing the row; replaces --table/--set/--state.
        #[arg(long, conflicts_with_all = ["table", "set"])]
        spec: Option<PathBuf>,

        #[arg(long, required_unless_present = "spec")]
        table: Option<String>,

        #[arg(long)]
        schema: Option<String>,

        /// Column value, as `column=value`. Repeatable.
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, String)>,

        /// `present` or `absent`.
        #[arg(long)]
        state: Option<String>,

        /// Report what would change without changing anything.
        #[arg(long)]
        check: bool,
    },

    /// Run one statement with bound parameters.
    Query {
        /// SQL with `$1`, `$2`, ... placeholders.
        sql: String,

        /// Parameter value, in order. Repeatable.
        #[arg(long = "param")]
        params: Vec<String>,

        /// Commit instead of rolling back.
        #[arg(long)]
        commit: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] pgconverge::Error),
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, value)) if !column.is_empty() => {
            Ok((column.to_string(), value.to_string()))
        }
        _ => Err(format!("expected column=value, got `{}`", s)),
    }
}

impl ConnectionArgs {
    /// Overwrite the fields of `params` given on the command line or in the environment.
    fn apply(&self, params: &mut ConnectionParams) {
        if let Some(url) = &self.database_url {
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

/// Defaults, then the config file, then environment and flags.
fn connection_params(args: &ConnectionArgs) -> Result<ConnectionParams, CliError> {
    let mut params = ConnectionParams::default();

    match pgconverge_config::load() {
        Ok((config, path)) => {
            tracing::debug!(path = %path.display(), "using config file");
            config.connection.apply(&mut params);
        }
        Err(ConfigError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    args.apply(&mut params);
    Ok(params)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgconverge=info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

async fn run(cli: Cli, color: bool) -> Result<(), CliError> {
    let params = connection_params(&cli.connection)?;

    match cli.command {
        Commands::Table {
            spec,
            check,
            alter_columns,
        } => {
            // Validate before connecting.
            let desired = pgconverge_config::load_table_spec(&spec)?;
            let options = ReconcileOptions {
                check_only: check,
                column_strategy: if alter_columns {
                    ColumnStrategy::Alter
                } else {
                    ColumnStrategy::Recreate
                },
            };
            tracing::info!(db = %params.redacted(), table = %desired.name, "reconciling table");
            let mut client = connect(&params).await?;
            let outcome = reconcile_table(&mut client, &desired, &options).await?;
            print!("{}", output::table(&outcome, check, color));
        }
        Commands::Row {
            spec,
            table,
            schema,
            set,
            state,
            check,
        } => {
            let target = match spec {
                Some(path) => pgconverge_config::load_row_spec(&path)?,
                None => row_target_from_flags(table.unwrap_or_default(), schema, set, state)?,
            };
            tracing::info!(db = %params.redacted(), table = %target.table, "reconciling row");
            let mut client = connect(&params).await?;
            let outcome = reconcile_row(&mut client, &target, check).await?;
            print!("{}", output::row(&outcome, check, color));
        }
        Commands::Query {
            sql,
            params: values,
            commit,
        } => {
            let values: Vec<Value> = values.into_iter().map(Value::from).collect();
            tracing::info!(db = %params.redacted(), "running query");
            let mut client = connect(&params).await?;
            let outcome = run_query(&mut client, &sql, &values, commit).await?;
            print!("{}", output::query(&outcome, color));
        }
    }

    Ok(())
}

fn row_target_from_flags(
    table: String,
    schema: Option<String>,
    set: Vec<(String, String)>,
    state: Option<String>,
) -> Result<RowTarget, CliError> {
    let row = set
        .into_iter()
        .map(|(column, value)| (column, Value::from(value)))
        .collect();
    let mut target = RowTarget::new(table, row);
    if let Some(schema) = schema {
        target = target.in_schema(schema);
    }
    if let Some(state) = state {
        target.state = state.parse::<Presence>()?;
    }
    target.validate()?;
    Ok(target)
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stdout().is_terminal();

    match run(cli, color).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if color {
                eprintln!("{} {}", "error:".red().bold(), e);
            } else {
                eprintln!("error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("key=a=b").unwrap(),
            ("key".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_assignment("value=").unwrap(),
            ("value".to_string(), String::new())
        );
        assert!(parse_assignment("=x").is_err());
        assert!(parse_assignment("novalue").is_err());
    }

    #[test]
    fn test_row_flags() {
        let cli = Cli::try_parse_from([
            "pgconverge",
            "row",
            "--table",
            "app_config",
            "--set",
            "key=environment",
            "--set",
            "value=production",
            "--state",
            "absent",
        ])
        .unwrap();
        let Commands::Row {
            table,
            schema,
            set,
            state,
            ..
        } = cli.command
        else {
            panic!("expected row command");
        };
        let target = row_target_from_flags(table.unwrap(), schema, set, state).unwrap();
        assert_eq!(target.schema, "public");
        assert_eq!(target.state, Presence::Absent);
        assert_eq!(target.row[1], ("value".to_string(), Value::from("production")));
    }

    #[test]
    fn test_row_without_columns_is_rejected() {
        let err = row_target_from_flags("t".into(), None, vec![], None).unwrap_err();
        assert_eq!(err.to_string(), "no columns given for row in [public.t]");
    }

    #[test]
    fn test_flags_override_config() {
        let mut params = ConnectionParams::default();
        let file = pgconverge_config::ConnectionConfig {
            host: Some("from-config".into()),
            user: Some("app".into()),
            ..Default::default()
        };
        file.apply(&mut params);

        let args = ConnectionArgs {
            host: Some("db.internal".into()),
            port: Some(6543),
            ..Default::default()
        };
        args.apply(&mut params);

        assert_eq!(params.host, "db.internal");
        assert_eq!(params.port, 6543);
        assert_eq!(params.user, "app");
        assert_eq!(params.database, "postgres");
    }
}
