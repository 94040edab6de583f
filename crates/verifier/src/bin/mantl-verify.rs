//! Mantl federation verifier CLI
//!
//! Waits for the example job, runs the live federation checks against a
//! control node, or inspects the local host layout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mantl_verify::{
    CheckContext, CheckId, ConsulClient, KubeCluster, NomadClient, ReadinessVerifier,
    SuiteReport, VaultClient, VerifierConfig,
};

/// Readiness and federation checks for the Kubernetes + Nomad integration
#[derive(Parser)]
#[command(name = "mantl-verify")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Control node hostname
    #[arg(long, env = "CONTROL_NODE", global = true)]
    control_node: Option<String>,

    /// Vault token used by the secrets checks
    #[arg(long, env = "VAULT_TOKEN", global = true, hide_env_values = true)]
    vault_token: Option<String>,

    /// Output format
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    Json,
    #[default]
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for a Nomad job and one of its allocations to be running
    Wait {
        /// Job ID (defaults to the example job)
        #[arg(long)]
        job: Option<String>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run the live federation checks
    Check {
        /// Comma-separated check names (see `list`)
        #[arg(long, value_delimiter = ',')]
        only: Vec<CheckId>,

        /// Do not wait for the example job before checking
        #[arg(long)]
        skip_wait: bool,
    },

    /// Check the local host layout
    Host {
        /// Inspect a filesystem mounted at this root
        #[arg(long)]
        root: Option<PathBuf>,

        /// Treat this host as a worker node
        #[arg(long)]
        worker: bool,
    },

    /// List the available live checks
    List,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("mantl_verify=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        VerifierConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(node) = &cli.control_node {
        config.control_node.clone_from(node);
    }
    if let Some(token) = &cli.vault_token {
        config.vault_token = Some(token.clone());
    }

    match cli.command {
        Commands::Wait { job, timeout } => {
            let mut settings = config.readiness.clone();
            if let Some(timeout) = timeout {
                settings.timeout_secs = timeout;
            }
            let verifier = ReadinessVerifier::from_settings(&settings)?;
            let nomad = NomadClient::new(config.nomad_addr(), config.request_timeout())?;
            let job_id = job.unwrap_or_else(|| config.expectations.job_id.clone());

            let ready = verifier.wait_for_job(&nomad, &job_id).await?;
            if ready {
                println!("{} {job_id} is ready", "✓".green());
                Ok(ExitCode::SUCCESS)
            } else {
                println!(
                    "{} {job_id} was not ready within {}s",
                    "✗".red(),
                    verifier.timeout().as_secs()
                );
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Check { only, skip_wait } => {
            let selection = if only.is_empty() {
                CheckId::ALL.to_vec()
            } else {
                only
            };
            let ctx = build_context(config).await?;
            let verifier = if skip_wait {
                None
            } else {
                Some(ReadinessVerifier::from_settings(&ctx.config.readiness)?)
            };

            info!(checks = selection.len(), control_node = %ctx.config.control_node, "Running federation checks");
            let report =
                mantl_verify::suite::run_live_checks(&ctx, &selection, verifier.as_ref()).await;
            emit(&report, cli.format)
        }
        Commands::Host { root, worker } => {
            let mut profile = config.host.clone();
            if let Some(root) = root {
                profile.root = root;
            }
            if worker {
                profile.control_node = false;
            }
            let report = mantl_verify::suite::run_host_checks(&profile, &config.paths).await;
            emit(&report, cli.format)
        }
        Commands::List => {
            for id in CheckId::ALL {
                println!("{:<18} {}", id.name().bold(), id.description());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn build_context(config: VerifierConfig) -> Result<CheckContext> {
    let timeout = config.request_timeout();
    let nomad = NomadClient::new(config.nomad_addr(), timeout)?;
    let consul = ConsulClient::new(config.consul_addr(), timeout)?;
    let vault = VaultClient::new(config.vault_addr(), config.resolve_vault_token(), timeout)?;
    let cluster = KubeCluster::connect(&config)
        .await
        .context("Failed to create Kubernetes client")?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")?;

    Ok(CheckContext {
        nomad: Arc::new(nomad),
        consul: Arc::new(consul),
        vault: Arc::new(vault),
        cluster: Arc::new(cluster),
        http,
        config,
    })
}

fn emit(report: &SuiteReport, format: OutputFormat) -> Result<ExitCode> {
    match format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => print!("{}", report.render_text()),
    }
    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
