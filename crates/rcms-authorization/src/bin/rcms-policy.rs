//! Privilege policy inspector
//!
//! Loads a fixture of actors and override rows and answers
//! `EvaluateCapability` / `FetchGrantSet` against it, printing JSON.
//!
//! ```toml
//! [[actors]]
//! id = "u2"
//! tier = "ScopeAdmin"
//! scope_id = "E1"
//!
//! [[overrides]]
//! actor_id = "u2"
//! scope_id = "E1"
//! capability = "activity_add"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rcms_authorization::{MemoryActorDirectory, MemoryPolicyStore, OverrideRow, PrivilegeService};
use rcms_core::{
    Actor, Capability, CapabilityCatalog, EvaluateCapabilityRequest, FetchGrantSetRequest,
    GrantSet, PrivilegeConfig, PrivilegeEndpoint, RcmsConfig,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rcms-policy")]
#[command(about = "Evaluate RCMS privileges against an override fixture", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Fixture with actors and override rows
    #[arg(short, long, global = true, default_value = "privileges.toml")]
    fixture: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a single capability
    Evaluate {
        /// Actor id
        #[arg(short, long)]
        actor: String,
        /// Capability name
        #[arg(short = 'p', long)]
        capability: String,
        /// Scope id; defaults to the actor's home scope
        #[arg(short, long)]
        scope: Option<String>,
    },
    /// Resolve an actor's complete grant set
    Fetch {
        /// Actor id
        #[arg(short, long)]
        actor: String,
        /// Scope id; defaults to the actor's home scope
        #[arg(short, long)]
        scope: Option<String>,
    },
    /// List known capabilities grouped by category
    Catalog,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    actors: Vec<Actor>,
    overrides: Vec<OverrideRow>,
}

fn load_config(path: Option<&PathBuf>) -> Result<PrivilegeConfig> {
    let mut config = match path {
        Some(path) => PrivilegeConfig::load_from_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => PrivilegeConfig::default(),
    };
    config.merge_with_env()?;
    config.validate()?;
    Ok(config)
}

fn load_fixture(path: &PathBuf) -> Result<Fixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read fixture {}", path.display()))?;
    toml::from_str(&content).context("parse fixture")
}

fn load_service(
    path: &PathBuf,
    config: &PrivilegeConfig,
) -> Result<PrivilegeService<MemoryPolicyStore, MemoryActorDirectory>> {
    let fixture = load_fixture(path)?;
    tracing::info!(
        actors = fixture.actors.len(),
        overrides = fixture.overrides.len(),
        "loaded fixture"
    );
    Ok(PrivilegeService::new(
        Arc::new(MemoryPolicyStore::with_rows(fixture.overrides)),
        Arc::new(MemoryActorDirectory::with_actors(fixture.actors)),
        config,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_ref())?;

    let output = run(cli.command, &cli.fixture, &config).await?;
    println!("{output}");
    Ok(())
}

/// Execute one subcommand and render its JSON output. `catalog` needs no
/// fixture.
async fn run(command: Commands, fixture: &PathBuf, config: &PrivilegeConfig) -> Result<String> {
    let output = match command {
        Commands::Evaluate {
            actor,
            capability,
            scope,
        } => {
            let response = load_service(fixture, config)?
                .evaluate_capability(EvaluateCapabilityRequest {
                    actor_id: actor.into(),
                    scope_id: scope.map(Into::into),
                    capability: Capability::new(capability)?,
                })
                .await?;
            serde_json::to_string(&response)?
        }
        Commands::Fetch { actor, scope } => {
            let response = load_service(fixture, config)?
                .fetch_grant_set(FetchGrantSetRequest {
                    actor_id: actor.into(),
                    scope_id: scope.map(Into::into),
                })
                .await?;
            serde_json::to_string(&response)?
        }
        Commands::Catalog => {
            let groups = CapabilityCatalog::default().grouped(&GrantSet::AllCapabilities);
            serde_json::to_string_pretty(&groups)?
        }
    };
    Ok(output)
}
