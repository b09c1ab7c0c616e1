use anyhow::{Context, Result};
use catalog_gateway::catalog::ItemId;
use catalog_gateway::commands::{self, CommandStatus, ProductInfoArgs};
use catalog_gateway::config::GatewayConfig;
use catalog_gateway::logging::{self, LogLevel};
use catalog_gateway::{gateway_paths, rpc, GatewayContext, BUILD_SHA};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser)]
#[command(name = "catalog-gateway")]
#[command(about = "Authenticated catalog-query gateway serving JSON-RPC over websocket")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Config file (defaults to ~/.catalog-gateway/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fixture file the catalog backend serves from
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Log verbosity (RUST_LOG overrides)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve JSON-RPC over websocket until Ctrl-C
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:5000
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print raw product info for the given app IDs
    ProductInfo {
        #[arg(required = true)]
        app_ids: Vec<ItemId>,

        /// Query without checking the account's licenses
        #[arg(long)]
        skip_licenses: bool,

        /// Account to log in as (defaults to the last saved session)
        #[arg(long)]
        user: Option<String>,

        #[arg(long, requires = "user")]
        password: Option<String>,
    },
    /// Print a KeyValues (VDF) file as JSON
    ParseVdf { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(cli.config.as_deref())?;
    if let Some(fixture) = cli.fixture {
        config.backend.fixture = Some(fixture);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Command::Serve {
        bind: Some(bind), ..
    } = &cli.command
    {
        config.server.bind = bind.clone();
    }

    let log_file = if config.logging.file {
        Some(gateway_paths::log_file_path()?)
    } else {
        None
    };
    logging::init(config.logging.level, log_file.as_deref())?;
    debug!(build = BUILD_SHA, "catalog-gateway starting");

    let status = match cli.command {
        Command::Serve { .. } => {
            let context = GatewayContext::new(&config, commands::build_backend(&config)?)?;
            rpc::serve(context, &config.server).await?;
            CommandStatus::Success
        }
        Command::ProductInfo {
            app_ids,
            skip_licenses,
            user,
            password,
        } => {
            let context = GatewayContext::new(&config, commands::build_backend(&config)?)?;
            let args = ProductInfoArgs {
                app_ids,
                skip_licenses,
                user,
                password,
            };
            let mut stdout = std::io::stdout().lock();
            commands::product_info(&context, &args, &mut stdout).await?
        }
        Command::ParseVdf { file } => {
            let mut stdout = std::io::stdout().lock();
            commands::parse_vdf(&file, &mut stdout)
                .with_context(|| format!("Failed to parse {}", file.display()))?
        }
    };
    Ok(status.into())
}
