pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use caserules_core::config::{AppConfig, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "caserules",
    about = "Caserules business-rule CLI",
    long_about = "Evaluate, lint and inspect workspace business rules against case contexts.",
    after_help = "Examples:\n  caserules evaluate --schema schema.json --rules rules.json --context case.json\n  caserules lint --schema schema.json --rules rules.json\n  caserules doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of ./caserules.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run a rule set against one context and print the evaluation result")]
    Evaluate {
        #[arg(long, help = "Workspace context schema (JSON or TOML)")]
        schema: PathBuf,
        #[arg(long, help = "Rule set or list of rules (JSON or TOML)")]
        rules: PathBuf,
        #[arg(long, help = "Context to evaluate (JSON or TOML)")]
        context: PathBuf,
        #[arg(long, help = "Trigger kind to select rules for (default from config)")]
        trigger: Option<String>,
        #[arg(long, help = "Evaluation instant as RFC 3339, for relative times")]
        now: Option<String>,
    },
    #[command(about = "Report configuration problems in a rule set without evaluating it")]
    Lint {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        rules: PathBuf,
    },
    #[command(about = "Extract declared context fields from a free-text message")]
    Extract {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long, help = "Text file to scan")]
        text: PathBuf,
        #[arg(long, help = "Context to merge extracted values into")]
        context: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config and run engine readiness checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = load_options(cli.config.clone());

    match AppConfig::load(options.clone()) {
        Ok(config) => init_logging(&config),
        Err(_) => init_logging(&AppConfig::default()),
    }

    let result = match cli.command {
        Command::Evaluate { schema, rules, context, trigger, now } => {
            commands::evaluate::run(&commands::evaluate::EvaluateArgs {
                options,
                schema,
                rules,
                context,
                trigger,
                now,
            })
        }
        Command::Lint { schema, rules } => commands::lint::run(options, &schema, &rules),
        Command::Extract { schema, text, context } => {
            commands::extract::run(&schema, &text, context.as_deref())
        }
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn load_options(config_path: Option<PathBuf>) -> LoadOptions {
    let require_file = config_path.is_some();
    LoadOptions { config_path, require_file, ..LoadOptions::default() }
}

/// Logs go to stderr; stdout carries the command's JSON document.
fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
