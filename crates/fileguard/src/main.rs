use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use std::process::ExitCode;
use tracing::{debug, info};

use file_access_guard::{Category, ResolveOptions, SensitivePathClassifier, Sensitivity, SignatureDatabase};
use fileguard::{Config, ToolError, ToolGateway, logging};

/// Exit status when the engine refused the path
const EXIT_REJECTED: u8 = 2;

#[derive(Parser)]
#[command(name = "fileguard")]
#[command(version)]
#[command(about = "Validate untrusted paths and inspect what files really contain")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (defaults to $FILEGUARD_CONFIG or fileguard.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Log level (overrides the config file)
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON on stderr
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a path through the resolution pipeline
    Resolve {
        path: String,
        /// The path must already exist (default)
        #[arg(long, conflicts_with = "allow_missing")]
        must_exist: bool,
        /// Accept a path that does not exist yet if its parent is writable
        #[arg(long)]
        allow_missing: bool,
        /// Also require write access
        #[arg(long)]
        write: bool,
        /// Follow symlinks regardless of the configured policy
        #[arg(long, conflicts_with = "no_symlinks")]
        allow_symlinks: bool,
        /// Refuse symlinks regardless of the configured policy
        #[arg(long)]
        no_symlinks: bool,
    },
    /// Validate a path and classify its content
    Inspect { path: String },
    /// Check whether a path looks like it holds secrets
    Sensitive {
        path: String,
        /// Use the broader pattern set
        #[arg(long)]
        strict: bool,
    },
    /// List the known file signatures in match order
    Signatures {
        #[arg(long)]
        category: Option<Category>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Serialize)]
struct ResolveReport<'a> {
    input: &'a str,
    real_path: String,
    existed: bool,
}

#[derive(Serialize)]
struct SensitiveReport<'a> {
    path: String,
    sensitivity: Sensitivity,
    is_sensitive: bool,
    matched_pattern_description: Option<&'a str>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
        config.validate()?;
    }
    logging::init(&config.logging.level, cli.json_logs || config.logging.json);
    debug!("fileguard v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Resolve {
            path,
            must_exist,
            allow_missing,
            write,
            allow_symlinks,
            no_symlinks,
        } => {
            let mut options = resolve_options(must_exist, allow_missing, write);
            if allow_symlinks {
                options = options.with_symlinks(true);
            } else if no_symlinks {
                options = options.with_symlinks(false);
            }

            let gateway = ToolGateway::from_config(&config)?;
            match gateway.validate_with(&Value::String(path), options).await {
                Ok(validated) => {
                    print_json(&ResolveReport {
                        input: validated.raw_input(),
                        real_path: validated.real_path().display().to_string(),
                        existed: validated.existed(),
                    })?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => rejected(&err),
            }
        }
        Command::Inspect { path } => {
            let gateway = ToolGateway::from_config(&config)?;
            match gateway.inspect(&Value::String(path)).await {
                Ok(report) => {
                    print_json(&report)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => rejected(&err),
            }
        }
        Command::Sensitive { path, strict } => {
            let sensitivity = if strict {
                Sensitivity::Strict
            } else {
                config.sensitivity()
            };
            let classifier = SensitivePathClassifier::for_sensitivity(sensitivity);
            let verdict = classifier.verdict(&path);
            print_json(&SensitiveReport {
                path: classifier.sanitize_for_logging(&path),
                sensitivity,
                is_sensitive: verdict.is_sensitive,
                matched_pattern_description: verdict.matched_pattern_description,
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Signatures { category } => {
            let database = SignatureDatabase::global();
            let descriptors: Vec<_> = database
                .descriptors()
                .iter()
                .filter(|d| category.is_none_or(|c| d.category == c))
                .collect();
            info!("{} signatures", descriptors.len());
            print_json(&json!({
                "signatures": descriptors,
                "shadowed": database
                    .shadowed_type_ids()
                    .iter()
                    .map(|(shadowed, by)| json!({ "type_id": shadowed, "shadowed_by": by }))
                    .collect::<Vec<_>>(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `--must-exist` is the default; `--allow-missing` relaxes it.
fn resolve_options(must_exist: bool, allow_missing: bool, write: bool) -> ResolveOptions {
    let options = if allow_missing && !must_exist {
        ResolveOptions::allow_missing()
    } else {
        ResolveOptions::must_exist()
    };
    options.with_write(write)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn rejected(err: &ToolError) -> Result<ExitCode> {
    print_json(err)?;
    Ok(ExitCode::from(EXIT_REJECTED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_flags_choose_options() {
        assert!(resolve_options(false, false, false).require_exists);
        assert!(resolve_options(true, false, false).require_exists);
        assert!(!resolve_options(false, true, false).require_exists);
        assert!(resolve_options(true, true, false).require_exists);
        assert!(resolve_options(false, true, true).check_write);
    }

    #[test]
    fn test_must_exist_conflicts_with_allow_missing() {
        let parsed = Cli::try_parse_from(["fileguard", "resolve", "a.txt", "--must-exist", "--allow-missing"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["fileguard", "resolve", "a.txt", "--must-exist"]);
        assert!(matches!(
            parsed.map(|cli| cli.command),
            Ok(Command::Resolve { must_exist: true, allow_missing: false, .. })
        ));
    }
}
