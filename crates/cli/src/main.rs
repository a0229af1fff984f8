//! scmrelease CLI.
//!
//! Operator-facing entry point: writes and validates configuration, previews
//! the versions a release would produce and runs the release pipeline.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use scmrelease_core::build::CommandBuildInvoker;
use scmrelease_core::config::{ReleaseConfig, CONFIG_FILE, DEFAULT_CONFIG_TEMPLATE};
use scmrelease_core::errors::PipelineError;
use scmrelease_core::project::{ProjectModel, TomlProject};
use scmrelease_core::scm::provider_name;
use scmrelease_core::version::{calculate_next_snapshot_version, calculate_release_version, is_snapshot};
use scmrelease_core::{release_pipeline, ReleaseContext, ReleaseOptions, RunOptions, ScmProviderRegistry};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "scmrelease",
    version,
    about = "Release multi-module projects from git or svn working copies"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file.
    Init {
        #[arg(short, long, default_value = CONFIG_FILE)]
        output: PathBuf,
    },

    /// Validate the configuration file.
    Validate,

    /// Show the versions a release would set.
    Versions {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show which provider a connection string selects.
    Provider {
        /// Connection string, e.g. `scm:git:https://example.com/repo.git`.
        connection: String,
    },

    /// Run the release.
    Release {
        /// Refuse to run steps that need the remote repository.
        #[arg(long)]
        offline: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.config);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins, then `[logging] level` from the config file, then `warn`.
fn init_logging(config_path: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = ReleaseConfig::load_from_file(config_path)
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "warn".to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Versions { json } => {
            let config = load_config(&cli.config)?;
            cmd_versions(&config, json)
        }
        Commands::Provider { connection } => cmd_provider(&connection),
        Commands::Release { offline } => {
            let config = load_config(&cli.config)?;
            cmd_release(&config, offline)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<ReleaseConfig> {
    ReleaseConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration file {}", path.display()))
}

fn open_project(config: &ReleaseConfig) -> Result<TomlProject> {
    let root = &config.scm.working_directory;
    TomlProject::open(root).with_context(|| format!("failed to open project at {}", root.display()))
}

/// Assemble a release context from configuration: project, provider,
/// artifact repository and build.
fn build_context(config: &ReleaseConfig) -> Result<ReleaseContext> {
    let project = open_project(config)?;

    let connection = match &config.scm.connection {
        Some(connection) => connection.clone(),
        None => project
            .scm_connection()
            .context("failed to read the project's scm connection")?
            .context("no scm connection configured and the root module declares none")?,
    };

    let registry = ScmProviderRegistry::with_default_providers();
    let scm = registry
        .for_connection(&connection, &config.scm.provider_settings())
        .with_context(|| format!("no provider for connection '{}'", connection))?;

    let mut context = ReleaseContext::new(Box::new(project), scm, ReleaseOptions::from(config));
    if let Some(repository) = config.artifacts.repository() {
        context = context.with_artifacts(repository);
    }
    if !config.build.command.is_empty() {
        let invoker = CommandBuildInvoker::new(&config.build.command).context("invalid build command")?;
        context = context.with_build(Box::new(invoker));
    }
    Ok(context)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG_TEMPLATE).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set the scm connection and working directory");
    println!("  2. Export the variable named by password_env, if any");
    println!("  3. Validate with: scmrelease validate --config {}", output.display());
    println!("  4. Preview with:  scmrelease versions --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config = ReleaseConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    if let Err(e) = config.resolve_env_vars() {
        println!("  {}", style::error(&e.to_string()));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("Environment variable references resolved"));

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All fields are valid"));

    let set_or = |present: bool, missing: &str| if present { "set".to_string() } else { missing.to_string() };

    println!();
    println!("{}", style::header("Configuration summary:"));
    println!(
        "  Connection       : {}",
        config.scm.connection.as_deref().unwrap_or("(from root module)")
    );
    println!("  Working directory: {}", config.scm.working_directory.display());
    println!("  Remote           : {}", config.scm.remote);
    println!("  Merge strategy   : {}", config.scm.merge_strategy.strategy().name());
    println!("  Username         : {}", config.scm.username.as_deref().unwrap_or("-"));
    println!("  Password         : {}", set_or(config.scm.password.is_some(), "not set"));
    println!("  Tag pattern      : {}", config.release.tag_pattern);
    println!("  Upgrade strategy : {}", config.release.upgrade_strategy);
    println!(
        "  Build command    : {}",
        if config.build.command.is_empty() {
            style::dim("(none)")
        } else {
            config.build.command.join(" ")
        }
    );
    println!(
        "  Artifacts        : {}",
        set_or(config.artifacts.repository().is_some(), &style::dim("(none)"))
    );
    println!();
    println!("{}", style::success("Configuration is valid."));

    Ok(())
}

struct VersionRow {
    module: String,
    current: String,
    release: Option<String>,
    next: Option<String>,
}

fn cmd_versions(config: &ReleaseConfig, json: bool) -> Result<()> {
    let project = open_project(config)?;
    let strategy = config.release.upgrade_strategy;

    let mut rows = Vec::new();
    for module in project.modules().context("failed to read modules")? {
        let (release, next) = if is_snapshot(&module.version) {
            let release = calculate_release_version(&module.version)
                .with_context(|| format!("no release version for {}", module.coordinate))?;
            let next = calculate_next_snapshot_version(&module.version, strategy)
                .with_context(|| format!("no development version for {}", module.coordinate))?;
            (Some(release), Some(next))
        } else {
            (None, None)
        };
        rows.push(VersionRow {
            module: module.coordinate.to_string(),
            current: module.version,
            release,
            next,
        });
    }

    if json {
        let value: Vec<serde_json::Value> = rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "module": r.module,
                    "current": r.current,
                    "release": r.release,
                    "next": r.next,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Module", "Current", "Release", "Next"]);
    for row in &rows {
        let pending = |v: &Option<String>| match v {
            Some(v) => Cell::new(v),
            None => Cell::new("-").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(&row.module),
            Cell::new(&row.current),
            pending(&row.release).fg(Color::Green),
            pending(&row.next),
        ]);
    }

    println!("{}", table);
    if rows.iter().all(|r| r.release.is_none()) {
        println!("{}", style::warn("No module has a development version; nothing to release."));
    }
    Ok(())
}

fn cmd_provider(connection: &str) -> Result<()> {
    let name = provider_name(connection)
        .with_context(|| format!("'{}' is not an scm connection string", connection))?;
    let registry = ScmProviderRegistry::with_default_providers();
    if registry.contains(&name) {
        println!("{}", name);
    } else {
        println!("{} {}", name, style::dim("(no provider registered)"));
    }
    Ok(())
}

fn cmd_release(config: &ReleaseConfig, offline: bool) -> Result<()> {
    let mut context = build_context(config)?;
    let pipeline = release_pipeline();

    match pipeline.run(&mut context, &RunOptions { offline }) {
        Ok(summary) => {
            let tag = context.metadata.tag.as_deref().unwrap_or("-");
            println!("{}", style::success(&format!("Released {}", tag)));
            println!("  {}", style::dim(&format!("{} steps completed", summary.completed.len())));
            Ok(())
        }
        Err(err) => {
            match &err {
                PipelineError::Blocked { step, source, .. } => {
                    eprintln!("{}", style::warn(&format!("Release blocked by {}: {}", step, source)));
                }
                PipelineError::Failed { step, source, .. } => {
                    eprintln!("{}", style::error(&format!("Release failed in {}: {}", step, source)));
                }
                PipelineError::OfflineViolation { steps } => {
                    eprintln!(
                        "{}",
                        style::warn(&format!("Offline run, these steps need the remote: {}", steps.join(", ")))
                    );
                }
            }
            for failure in err.rollback_failures() {
                eprintln!(
                    "  {}",
                    style::error(&format!("rollback of {} failed: {}", failure.step, failure.error))
                );
            }
            Err(err).context("release did not complete")
        }
    }
}
