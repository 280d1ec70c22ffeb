use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

mod commands;

use commands::CliOptions;

fn build_cli() -> Command {
    Command::new("autom4b")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Watches an audiobook inbox and converts finished books to M4B")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to the config file (defaults to the user config directory)"),
        )
        .arg(
            Arg::new("env")
                .short('e')
                .long("env")
                .value_name("FILE")
                .help("Load environment overrides from this .env file (default: ./.env if present)"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Verbose logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test")
                .short('t')
                .long("test")
                .help("Test mode: converted books are left in the inbox")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-loops")
                .short('l')
                .long("max-loops")
                .value_name("N")
                .help("Exit after N cycles")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("match-filter")
                .short('m')
                .long("match-filter")
                .value_name("PATTERN")
                .help("Only process books whose path matches this pattern (case-insensitive)"),
        )
        .arg(
            Arg::new("init-config")
                .long("init-config")
                .help("Write a default config file and exit")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let options = CliOptions::from_matches(&matches);

    if options.init_config {
        return commands::init_config(&options);
    }

    let (config, env_file) = commands::load_config(&options).context("Failed to load configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.app.effective_log_level().to_string()),
    )
    .init();

    commands::watch_inbox(config, env_file)
        .await
        .context("autom4b stopped on a fatal error")
}
