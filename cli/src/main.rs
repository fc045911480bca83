//! Vigil CLI
//!
//! Command-line interface for running tenant-scoped security event queries.
//!
//! # Usage
//!
//! ```bash
//! vigil --help
//! vigil --tenant tenant-alpha query 'severity = "high" AND user.name = alice' --last 24h
//! vigil --tenant tenant-alpha validate 'src_endpoint.ip IN_SUBNET 10.0.0.0/8'
//! vigil --tenant tenant-alpha compile 'process.name CONTAINS powershell'
//! vigil backends
//! ```

#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use shared::config::EngineConfig;
use shared::manager::QueryManager;
use shared::providers::{Backend, SqlProvider};
use shared::query::{parse_with_diagnostics, QueryAst, TimeRange};

/// Vigil CLI - Security event query command-line interface
#[derive(Parser)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tenant to scope queries to
    #[arg(short, long, global = true, env = "VIGIL_TENANT")]
    tenant: Option<String>,

    /// User recorded in the audit trail
    #[arg(short, long, global = true, env = "VIGIL_USER")]
    user: Option<String>,

    /// Backend to use instead of the configured default (mock or sql)
    #[arg(short, long, global = true)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print the response envelope
    Query(QueryArgs),
    /// Validate a query without running it
    Validate(QueryArgs),
    /// Print the SQL a query compiles to
    Compile(QueryArgs),
    /// List registered backends
    Backends,
    /// Describe one backend
    Describe {
        /// Backend name
        #[arg(value_name = "BACKEND")]
        name: Backend,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Query text, e.g. `severity = "high" AND user.name = alice`
    text: String,

    /// Restrict to events newer than this duration (e.g. 15m, 24h, 7d)
    #[arg(long)]
    last: Option<String>,

    /// Maximum number of rows to return
    #[arg(short, long)]
    limit: Option<usize>,

    /// Number of rows to skip
    #[arg(long)]
    offset: Option<usize>,
}

impl QueryArgs {
    /// Parses the text and applies the paging and time options.
    fn to_ast(&self, tenant: Option<&str>) -> QueryAst {
        let outcome = parse_with_diagnostics(&self.text, tenant);
        for skipped in &outcome.skipped {
            tracing::warn!(fragment = %skipped.fragment, reason = %skipped.reason, "Ignored query fragment");
        }

        let mut ast = outcome.ast;
        if let Some(last) = &self.last {
            ast = ast.with_time_range(TimeRange::last(last.as_str()));
        }
        if let Some(limit) = self.limit {
            ast = ast.with_limit(limit);
        }
        if let Some(offset) = self.offset {
            ast = ast.with_offset(offset);
        }
        ast
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    let tenant = cli.tenant.as_deref();

    match cli.command {
        Some(Commands::Query(args)) => {
            let manager = QueryManager::from_config(&config)?;
            let response = manager.execute(&args.to_ast(tenant), cli.user.as_deref(), cli.backend);
            print_json(&response)?;
            if !response.success {
                bail!(response.error.unwrap_or_else(|| "query failed".to_string()));
            }
        }
        Some(Commands::Validate(args)) => {
            let manager = QueryManager::from_config(&config)?;
            let report = manager.validate(&args.to_ast(tenant), cli.backend);
            print_json(&report)?;
            if !report.valid {
                bail!("query is invalid");
            }
        }
        Some(Commands::Compile(args)) => {
            let database = config.database.clone().unwrap_or_default();
            let provider = SqlProvider::new(database).with_limits(config.limits());
            let compiled = provider.compile(&args.to_ast(tenant))?;
            println!("{}", compiled.sql);
            println!("-- total: {}", compiled.count_sql);
        }
        Some(Commands::Backends) => {
            let manager = QueryManager::from_config(&config)?;
            print_json(&manager.list_backends())?;
        }
        Some(Commands::Describe { name }) => {
            let manager = QueryManager::from_config(&config)?;
            match manager.describe_backend(name) {
                Some(info) => print_json(&info)?,
                None => bail!("backend '{name}' is not configured"),
            }
        }
        None => {
            println!("Vigil CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        // Verify CLI can parse without arguments
        let cli = Cli::try_parse_from(["vigil"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_query_command() {
        let cli = Cli::try_parse_from([
            "vigil",
            "--tenant",
            "tenant-alpha",
            "query",
            "severity = high",
            "--last",
            "24h",
            "--limit",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.tenant.as_deref(), Some("tenant-alpha"));
        let Some(Commands::Query(args)) = cli.command else {
            panic!("expected query command");
        };
        let ast = args.to_ast(cli.tenant.as_deref());
        assert_eq!(ast.tenant_id.as_deref(), Some("tenant-alpha"));
        assert_eq!(ast.limit, Some(5));
        assert_eq!(ast.time_range, Some(TimeRange::last("24h")));
        assert!(ast.where_clause.is_some());
    }

    #[test]
    fn test_cli_backend_flag() {
        let cli = Cli::try_parse_from(["vigil", "describe", "clickhouse"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Describe {
                name: Backend::Sql
            })
        ));

        let cli = Cli::try_parse_from(["vigil", "backends", "--backend", "mock"]).unwrap();
        assert_eq!(cli.backend, Some(Backend::Mock));

        assert!(Cli::try_parse_from(["vigil", "describe", "oracle"]).is_err());
    }

    #[test]
    fn test_cli_compile_requires_text() {
        assert!(Cli::try_parse_from(["vigil", "compile"]).is_err());
    }
}
