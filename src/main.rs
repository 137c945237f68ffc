//! dashops command-line interface.

use clap::{Args, Parser, Subcommand};
use dashops::ops::{self, Context, Report};
use dashops::steps::github::DeployAction;
use dashops::{Config, StoreType};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

/// Provision and configure per-client Azure dashboards
#[derive(Parser, Debug)]
#[command(name = "dashops")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Directory holding {client}.env files
    #[arg(long, global = true, env = "DASHOPS_CONFIG_DIR", default_value = "clients")]
    config_dir: PathBuf,

    /// Store holding the remote configuration record
    #[arg(long, global = true, env = "DASHOPS_STORE", default_value = "keyvault")]
    store: StoreType,

    /// Vault holding the record (defaults to the client's VAULT_NAME)
    #[arg(long, global = true, env = "DASHOPS_VAULT")]
    vault: Option<String>,

    /// Dashboard repository, owner/name
    #[arg(long, global = true, env = "DASHOPS_GITHUB_REPO")]
    repo: Option<String>,

    /// Configuration value at the local tier, KEY=VALUE (repeatable)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    set: Vec<(String, String)>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or reconcile the client's Azure resources
    Provision {
        /// Client identifier
        client: String,
    },

    /// Set up the GitHub OIDC deployment identity
    Fedcred {
        /// Client identifier
        client: String,

        /// Role to grant on the resource group (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// Push the resolved configuration to GitHub environment secrets
    Sync {
        /// Client identifier
        client: String,
    },

    /// Mint a new SAS token for the client's data container
    RefreshSas {
        /// Client identifier
        client: String,

        /// Token lifetime in days
        #[arg(env = "DASHOPS_SAS_DAYS", default_value_t = dashops::config::DEFAULT_SAS_DAYS)]
        days: u32,

        /// Also update the SAS_URL GitHub secret
        #[arg(long)]
        sync_github: bool,
    },

    /// Trigger the deployment workflow
    Dispatch {
        /// Client identifier
        client: String,

        /// Pipeline action
        #[arg(value_enum)]
        action: DeployAction,

        /// Workflow file
        #[arg(long, env = "DASHOPS_WORKFLOW", default_value = "deploy.yml")]
        workflow: String,

        /// Git ref to run on
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,
    },

    /// Show where each configuration value comes from
    Resolve {
        /// Client identifier
        client: String,

        /// Print values as well as their source
        #[arg(long)]
        show_values: bool,
    },
}

impl Commands {
    fn client(&self) -> &str {
        match self {
            Self::Provision { client }
            | Self::Fedcred { client, .. }
            | Self::Sync { client }
            | Self::RefreshSas { client, .. }
            | Self::Dispatch { client, .. }
            | Self::Resolve { client, .. } => client,
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    dashops::validation::validate_config_key(key.trim()).map_err(|e| e.to_string())?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn build_config(global: &GlobalArgs, command: &Commands) -> dashops::Result<Config> {
    let mut config = Config::new(command.client())?
        .with_config_dir(&global.config_dir)
        .with_store(global.store);

    if let Some(vault) = &global.vault {
        config = config.with_vault(vault);
    }
    if let Some(repo) = &global.repo {
        config = config.with_github_repo(repo);
    }
    for (key, value) in &global.set {
        config = config.with_option(key, value);
    }

    match command {
        Commands::Fedcred { roles, .. } if !roles.is_empty() => {
            config = config.with_roles(roles.iter().cloned());
        }
        Commands::RefreshSas { days, .. } => {
            config = config.with_sas_days(*days)?;
        }
        Commands::Dispatch { workflow, git_ref, .. } => {
            config = config.with_workflow(workflow).with_git_ref(git_ref);
        }
        _ => {}
    }

    Ok(config)
}

fn print_report(title: &str, report: &Report) {
    print!("{}", report.render(title));
}

async fn run(cli: Cli) -> dashops::Result<()> {
    let config = build_config(&cli.global, &cli.command)?;
    debug!(client = %config.client, store = %config.store, "configuration built");
    let mut ctx = Context::new(config).await?;

    match cli.command {
        Commands::Provision { .. } => {
            let report = ops::provision(&mut ctx).await?;
            print_report("provisioned", &report);
            if let Some(url) = report.written.get(dashops::keys::DASHBOARD_URL) {
                println!("dashboard: {}", url);
            }
        }

        Commands::Fedcred { .. } => {
            let report = ops::fedcred(&mut ctx).await?;
            print_report("federated credential", &report);
        }

        Commands::Sync { .. } => {
            let report = ops::sync(&mut ctx).await?;
            print_report("synced", &report);
        }

        Commands::RefreshSas { sync_github, .. } => {
            let report = ops::refresh_sas(&mut ctx, sync_github).await?;
            print_report("SAS refreshed", &report);
            if let Some(expiry) = report.written.get(dashops::keys::SAS_EXPIRY) {
                println!("expires: {}", expiry);
            }
        }

        Commands::Dispatch { action, .. } => {
            let report = ops::dispatch(&mut ctx, action).await?;
            print_report("dispatched", &report);
        }

        Commands::Resolve { show_values, .. } => {
            let resolution = ops::resolve(&mut ctx).await?;
            if show_values {
                println!("configuration for client {}:", resolution.client());
                for (key, tier) in resolution.provenance() {
                    let value = resolution.get(key).unwrap_or("");
                    println!("  {}={}  ({})", key, value, tier);
                }
            } else {
                print!("{}", resolution.provenance_report());
            }
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.global.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dashops={}", log_level).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
