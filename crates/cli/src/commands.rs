use anyhow::{anyhow, Context, Result};
use autom4b_config::{Config, ConfigManager, OnComplete};
use autom4b_inbox::{
    CycleReport, EnvFailedBookStore, InboxError, InboxProcessor, M4bToolConverter, SkipReason,
};
use clap::ArgMatches;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;


const DEFAULT_ENV_FILE: &str = ".env";

/// Command-line flags, applied on top of file and environment settings
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub debug: bool,
    pub test: bool,
    pub max_loops: Option<u32>,
    pub match_filter: Option<String>,
    pub init_config: bool,
}

impl CliOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config: matches.get_one::<String>("config").map(PathBuf::from),
            env_file: matches.get_one::<String>("env").map(PathBuf::from),
            debug: matches.get_flag("debug"),
            test: matches.get_flag("test"),
            max_loops: matches.get_one::<u32>("max-loops").copied(),
            match_filter: matches.get_one::<String>("match-filter").cloned(),
            init_config: matches.get_flag("init-config"),
        }
    }
}

fn config_manager(options: &CliOptions) -> Result<ConfigManager> {
    match &options.config {
        Some(path) => Ok(ConfigManager::with_config_file(path.clone())),
        None => ConfigManager::new().context("Could not locate the config directory"),
    }
}

/// `--env` if given, otherwise `./.env` when it exists
pub fn resolve_env_file(explicit: Option<&Path>, cwd: &Path) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) if path.is_file() => Ok(Some(path.to_path_buf())),
        Some(path) => Err(anyhow!("env file {} does not exist", path.display())),
        None => {
            let default = cwd.join(DEFAULT_ENV_FILE);
            Ok(default.is_file().then_some(default))
        }
    }
}

/// Applies CLI flags and re-validates the result
pub fn apply_cli_overrides(config: &mut Config, options: &CliOptions) -> Result<()> {
    if options.debug {
        config.app.debug = true;
    }
    if options.test {
        config.app.test = true;
    }
    if let Some(max_loops) = options.max_loops {
        config.app.max_loops = Some(max_loops);
    }
    if let Some(pattern) = &options.match_filter {
        config.conversion.match_filter = Some(pattern.clone());
    }
    // Test runs never move or delete originals
    if config.app.test {
        config.conversion.on_complete = OnComplete::TestDoNothing;
    }

    config.validate().map_err(|errors| {
        let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow!("Invalid configuration: {}", details.join("; "))
    })
}

/// Layers file, `.env`, environment and flags into the final config
pub fn load_config(options: &CliOptions) -> Result<(Config, Option<PathBuf>)> {
    let cwd = std::env::current_dir().context("Could not read the working directory")?;
    let env_file = resolve_env_file(options.env_file.as_deref(), &cwd)?;

    let manager = config_manager(options)?;
    let mut config = manager
        .load_with_env_overrides(env_file.as_deref())
        .with_context(|| format!("Could not load {}", manager.config_path().display()))?;
    apply_cli_overrides(&mut config, options)?;
    Ok((config, env_file))
}

pub fn init_config(options: &CliOptions) -> Result<()> {
    let manager = config_manager(options)?;
    if manager.initialize()? {
        println!(
            "{} Wrote default config to {}",
            style("✓").green().bold(),
            manager.config_path().display()
        );
    } else {
        println!(
            "Config already exists at {}",
            style(manager.config_path().display()).bold()
        );
    }
    Ok(())
}

fn print_banner(config: &Config) {
    println!("\n{}", style("autom4b").bold().cyan());
    println!("{}", "=".repeat(60));
    println!("  Inbox:      {}", config.paths.inbox_dir.display());
    println!("  Converted:  {}", config.paths.converted_dir.display());
    println!("  On success: {}", config.conversion.on_complete);
    if let Some(filter) = &config.conversion.match_filter {
        println!("  Filter:     {}", style(filter).yellow());
    }
    if config.app.test {
        println!("  {}", style("Test mode: originals are left in place").yellow());
    }
    println!();
}

/// Human summary of a cycle; `None` when there is nothing worth printing
pub fn format_cycle(report: &CycleReport) -> Option<Vec<String>> {
    if matches!(
        report.skipped,
        Some(SkipReason::Unchanged) | Some(SkipReason::EmptyInbox)
    ) {
        return None;
    }

    let mut lines = Vec::new();
    for key in &report.converted {
        lines.push(format!("{} Converted {}", style("✓").green().bold(), key));
    }
    for key in &report.already_converted {
        lines.push(format!("{} {} was already converted", style("-").dim(), key));
    }
    for (key, reason) in &report.failed {
        let again = if report.failed_again.contains(key) {
            " (failed again)"
        } else {
            ""
        };
        lines.push(format!("{} {}{}: {}", style("✗").red().bold(), key, again, reason));
    }
    if report.did_work() || report.counts.failed > 0 {
        lines.push(format!("  Inbox: {}", report.counts));
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines)
    }
}

fn print_cycle(report: &CycleReport) {
    if let Some(lines) = format_cycle(report) {
        for line in lines {
            println!("{}", line);
        }
    }
}

fn report_fatal(err: InboxError) -> InboxError {
    log::error!("{}", err);
    eprintln!(
        "{} {}",
        style("✗").red().bold(),
        style(err.severity().recovery_action()).red()
    );
    err
}

/// Resolves on SIGINT, or SIGTERM on unix, with the signal's name
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "Interrupt")
    }
}

/// Runs the processing loop until SIGINT/SIGTERM or the loop limit
pub async fn watch_inbox(config: Config, env_file: Option<PathBuf>) -> Result<()> {
    print_banner(&config);

    let mut store = EnvFailedBookStore::new(config.conversion.failed_books_var.clone());
    if let Some(path) = env_file {
        store = store.with_env_file(path);
    }
    let converter = Arc::new(M4bToolConverter::new(config.conversion.m4b_tool.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(signal) => {
                log::info!("{} received, finishing the current book", signal);
                let _ = shutdown_tx.send(true);
            }
            Err(e) => log::warn!("Could not listen for shutdown signals: {}", e),
        }
    });

    let mut processor = InboxProcessor::new(config, Box::new(store), converter)?
        .with_shutdown(shutdown_rx);
    processor.startup_checks().map_err(report_fatal)?;

    let loops = processor.run_with(print_cycle).await.map_err(report_fatal)?;

    let counts = processor.state().counts();
    println!(
        "\n{} after {} cycles: {}",
        style("Stopped").bold(),
        loops,
        counts
    );
    let failed = processor.state().failed_books();
    if !failed.is_empty() {
        println!("{}", style("Books needing attention:").red().bold());
        for item in failed {
            println!(
                "  {} {}",
                item.key(),
                style(item.failed_reason().unwrap_or_default()).dim()
            );
        }
    }
    Ok(())
}
