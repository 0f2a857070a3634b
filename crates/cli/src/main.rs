use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use specedit_core::eval::EvalMode;
use specedit_core::stop::StopMatcher;
use specedit_core::MatcherBackend;
use tokio::io::BufReader;

use specedit_cli::config::CliConfig;
use specedit_cli::{logging, simulate, stop};

#[derive(Parser)]
#[command(name = "specedit", about = "Speculative-edit draft proposer tooling")]
struct Cli {
    /// Log level when RUST_LOG is unset (overrides the config file).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay recorded cases and report draft acceptance as JSON
    Simulate {
        /// JSON array or JSON-lines file of cases
        #[arg(long)]
        input: PathBuf,

        /// Matcher backend (sequential, parallel, indexed)
        #[arg(long)]
        backend: Option<MatcherBackend>,

        /// Draft tokens per step
        #[arg(long)]
        num_speculative_tokens: Option<usize>,

        /// Maximum model context length
        #[arg(long)]
        max_model_len: Option<usize>,

        /// Replay mode; both modes when omitted
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Print only the per-mode summary
        #[arg(long)]
        summary_only: bool,
    },

    /// Copy stdin to stdout until a stop sequence completes
    Stop {
        /// Stop string, or `r/<regex>/` for a pattern; repeatable
        #[arg(long = "stop", required = true)]
        stops: Vec<String>,
    },

    /// Inspect or persist the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the merged configuration and the file it came from
    Show,
    /// Write configuration values to the config file
    Save {
        #[arg(long)]
        backend: Option<MatcherBackend>,
        #[arg(long)]
        num_speculative_tokens: Option<usize>,
        #[arg(long)]
        max_model_len: Option<usize>,
        #[arg(long)]
        max_sessions: Option<usize>,
        #[arg(long)]
        min_tail_match: Option<usize>,
        #[arg(long)]
        log_level: Option<String>,
        /// Write to this path instead of the default location
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Specedit,
    Ngram,
}

impl From<ModeArg> for EvalMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Specedit => EvalMode::SpecEdit,
            ModeArg::Ngram => EvalMode::NGram,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let file_config = CliConfig::load();
    let cli = Cli::parse();

    let log_level = cli.log_level.clone().or_else(|| file_config.log_level.clone());
    logging::init(log_level.as_deref())?;
    if let Some(path) = CliConfig::default_path() {
        if path.exists() {
            tracing::info!(path = %path.display(), "loaded config");
        }
    }

    match cli.command {
        Command::Simulate {
            input,
            backend,
            num_speculative_tokens,
            max_model_len,
            mode,
            summary_only,
        } => {
            let mut config = file_config;
            config.merge(&CliConfig {
                backend,
                num_speculative_tokens,
                max_model_len,
                ..Default::default()
            });
            let spec_config = config.to_spec_config();

            let cases = simulate::load_cases(&input)?;
            let modes: Vec<EvalMode> = match mode {
                Some(mode) => vec![mode.into()],
                None => EvalMode::ALL.to_vec(),
            };
            let report = simulate::run(&spec_config, &cases, &modes)?;

            let json = if summary_only {
                serde_json::to_string_pretty(&report.summary)?
            } else {
                serde_json::to_string_pretty(&report)?
            };
            println!("{json}");
        }
        Command::Stop { stops } => {
            let matcher = StopMatcher::new(&stops);
            if matcher.is_empty() {
                anyhow::bail!("no usable stop patterns given");
            }
            let stdin = BufReader::new(tokio::io::stdin());
            stop::copy_until_stop(stdin, tokio::io::stdout(), matcher)
                .await
                .context("failed to copy stdin")?;
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                match CliConfig::default_path() {
                    Some(path) if path.exists() => println!("# {}", path.display()),
                    Some(path) => println!("# {} (not present, showing defaults)", path.display()),
                    None => println!("# no config directory available"),
                }
                let effective = file_config.to_spec_config();
                println!("{}", file_config.to_toml()?);
                println!("# effective: {}", serde_json::to_string(&effective)?);
            }
            ConfigAction::Save {
                backend,
                num_speculative_tokens,
                max_model_len,
                max_sessions,
                min_tail_match,
                log_level,
                path,
            } => {
                let mut config = file_config;
                config.merge(&CliConfig {
                    backend,
                    num_speculative_tokens,
                    max_model_len,
                    max_sessions,
                    min_tail_match,
                    log_level,
                    ..Default::default()
                });
                config
                    .to_spec_config()
                    .validate()
                    .context("refusing to save invalid configuration")?;

                let saved = match path {
                    Some(path) => {
                        config.save_to(&path)?;
                        path
                    }
                    None => config.save()?,
                };
                eprintln!("Saved config to: {}", saved.display());
            }
        },
    }

    Ok(())
}
