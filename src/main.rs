use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::load_config;
use credentials::CredentialProvider;
use database::{ConnectionSpec, QueryExecutor, SqlParam};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// The main entry point for the Granite database access tool.
#[tokio::main]
async fn main() {
    // Load environment variables (e.g., an override access token) from .env.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Parse command-line arguments
    let cli = Cli::parse();

    // Execute the appropriate command
    match cli.command {
        Commands::Query(args) => {
            if let Err(e) = handle_query(args).await {
                eprintln!("Error executing query: {e:#}");
                std::process::exit(1);
            }
        }
        Commands::Inspect(args) => {
            if let Err(e) = handle_inspect(args) {
                eprintln!("Error inspecting connection string: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A fault-tolerant, identity-aware database query runner.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SQL query against the configured database, with retries.
    Query(QueryArgs),
    /// Show how a connection string is interpreted, without connecting.
    Inspect(InspectArgs),
}

#[derive(Parser)]
struct QueryArgs {
    /// The SQL text to execute.
    #[arg(long)]
    sql: String,

    /// Positional query parameters. Plain values are bound as text; prefix
    /// with a type for others, e.g. "int:42", "float:2.5", "bool:true",
    /// or pass "null".
    #[arg(long = "param")]
    params: Vec<String>,
}

#[derive(Parser)]
struct InspectArgs {
    /// The connection string to inspect, as `key=value;` pairs.
    #[arg(long)]
    connection_string: String,
}

// ==============================================================================
// Command Logic
// ==============================================================================

/// Handles the orchestration of a retried query execution.
async fn handle_query(args: QueryArgs) -> anyhow::Result<()> {
    let settings = load_config()?;
    let provider = Arc::new(CredentialProvider::from_settings(&settings.identity));
    let executor = QueryExecutor::new(&settings, provider);

    let params = args
        .params
        .iter()
        .map(|raw| parse_param(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    // Ctrl-C aborts the in-flight attempt instead of leaving it dangling.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let rows = executor
        .execute_with_retry(&args.sql, &params, Ok, &cancel)
        .await?;

    println!("{}", render_rows(&rows));
    println!("({} rows)", rows.len());
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let spec = ConnectionSpec::parse(&args.connection_string)?;
    let descriptor = spec.descriptor();

    println!("host:                     {}", spec.host());
    println!("user:                     {}", spec.user().unwrap_or("<absent>"));
    println!("has user:                 {}", descriptor.has_user);
    println!("has password:             {}", descriptor.has_password);
    println!("has explicit auth method: {}", descriptor.has_explicit_auth_method);
    println!(
        "identity injection:       {}",
        if descriptor.needs_identity_injection() {
            "yes (a token will be acquired and used as the password)"
        } else {
            "no (the connection string is authoritative)"
        }
    );
    Ok(())
}

/// Parses a CLI parameter into a typed `SqlParam`.
fn parse_param(raw: &str) -> anyhow::Result<SqlParam> {
    if raw == "null" {
        return Ok(SqlParam::Null);
    }
    if let Some(value) = raw.strip_prefix("int:") {
        return Ok(SqlParam::Int(value.parse()?));
    }
    if let Some(value) = raw.strip_prefix("float:") {
        return Ok(SqlParam::Float(value.parse()?));
    }
    if let Some(value) = raw.strip_prefix("bool:") {
        return Ok(SqlParam::Bool(value.parse()?));
    }
    Ok(SqlParam::Text(raw.to_string()))
}

/// Renders a result set as a terminal table.
fn render_rows(rows: &[PgRow]) -> Table {
    let mut table = Table::new();
    let Some(first) = rows.first() else {
        table.set_header(vec!["(empty result set)"]);
        return table;
    };

    table.set_header(first.columns().iter().map(|c| c.name().to_string()));
    for row in rows {
        let cells: Vec<String> = (0..row.columns().len())
            .map(|idx| render_value(row, idx))
            .collect();
        table.add_row(cells);
    }
    table
}

/// Decodes a single column to displayable text, by the column's type name.
fn render_value(row: &PgRow, idx: usize) -> String {
    let type_name = row.columns()[idx].type_info().name().to_string();

    fn show<T: std::fmt::Display>(value: Result<Option<T>, sqlx::Error>) -> String {
        match value {
            Ok(Some(v)) => v.to_string(),
            Ok(None) => "NULL".to_string(),
            Err(_) => "<decode error>".to_string(),
        }
    }

    match type_name.as_str() {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => show(row.try_get::<Option<String>, _>(idx)),
        "INT2" => show(row.try_get::<Option<i16>, _>(idx)),
        "INT4" => show(row.try_get::<Option<i32>, _>(idx)),
        "INT8" => show(row.try_get::<Option<i64>, _>(idx)),
        "FLOAT4" => show(row.try_get::<Option<f32>, _>(idx)),
        "FLOAT8" => show(row.try_get::<Option<f64>, _>(idx)),
        "BOOL" => show(row.try_get::<Option<bool>, _>(idx)),
        other => format!("<{}>", other),
    }
}
