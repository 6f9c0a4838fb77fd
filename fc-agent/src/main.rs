//! fc-agent
//!
//! Pick an Ollama model, load a CSV with `analyze`, then ask questions,
//! request forecasts or have analysis code written, run and repaired.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fc_chat::ForecastAgent;
use fc_core::config::{load_environment, AgentConfig};
use fc_llm::{available_models, OllamaClient};
use fc_sandbox::PythonRuntime;

mod console;

use console::{Console, TerminalOperator};

const USAGE: &str = "Usage: analyze <csv_path> <target_column> <series_id_column>";

#[derive(Parser, Debug)]
#[command(name = "fc-agent")]
#[command(about = "Conversational forecasting agent backed by a local Ollama model")]
struct Args {
    /// Model to use; without it the available models are listed
    #[arg(short, long)]
    model: Option<String>,

    /// Ollama base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Python interpreter for generated code
    #[arg(long)]
    python: Option<String>,

    /// Directory sessions are saved under
    #[arg(long)]
    sessions_dir: Option<PathBuf>,

    /// Periods to forecast per series
    #[arg(long)]
    horizon: Option<usize>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

impl Args {
    /// Flags win over environment settings
    fn apply(&self, mut config: AgentConfig) -> AgentConfig {
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(url) = &self.base_url {
            config.ollama_url = url.clone();
        }
        if let Some(python) = &self.python {
            config.python = python.clone();
        }
        if let Some(dir) = &self.sessions_dir {
            config.sessions_dir = dir.clone();
        }
        if let Some(horizon) = self.horizon.filter(|h| *h > 0) {
            config.forecast_horizon = horizon;
        }
        config
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Empty,
    Bye,
    Help,
    Analyze {
        csv_path: &'a str,
        target_column: &'a str,
        series_id_column: &'a str,
    },
    AnalyzeUsage,
    Query(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[..] {
            [] => Command::Empty,
            ["/bye"] => Command::Bye,
            ["help"] => Command::Help,
            ["analyze", csv_path, target_column, series_id_column] => Command::Analyze {
                csv_path,
                target_column,
                series_id_column,
            },
            ["analyze", ..] => Command::AnalyzeUsage,
            _ => Command::Query(line),
        }
    }
}

fn print_help() {
    println!("\nAvailable commands:");
    println!("analyze <csv_path> <target_column> <series_id_column> - Analyze a new dataset");
    println!("help - Show this help message");
    println!("/bye - Exit the program");
    println!("You can also ask general questions about the data or request forecasts!");
    println!("Use 'fix <instructions>' to revise the code that ran last.");
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in ["fc_agent", "fc_chat", "fc_sandbox", "fc_llm", "fc_memory", "fc_core"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Let the operator pick from the models Ollama reports
async fn select_model(config: &AgentConfig, console: &mut Console) -> Result<Option<String>> {
    let models = available_models(&config.ollama_url, config.connect_retries, config.retry_delay).await;
    println!("Available models:");
    for (idx, model) in models.iter().enumerate() {
        println!("{}. {}", idx + 1, model.name);
    }

    loop {
        let Some(reply) = console.read_line("Select model number: ").await? else {
            return Ok(None);
        };
        match reply.trim().parse::<usize>() {
            Ok(n) if (1..=models.len()).contains(&n) => return Ok(Some(models[n - 1].name.clone())),
            _ => println!("{}", format!("Please enter a number between 1 and {}", models.len()).yellow()),
        }
    }
}

fn save_session(agent: &ForecastAgent) -> bool {
    match agent.save_session() {
        Ok(path) => {
            info!("Session written to {}", path.display());
            true
        }
        Err(e) => {
            error!("Failed to save session: {}", e);
            println!("{} {}", "Error:".red(), e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;
    if args.no_color {
        colored::control::set_override(false);
    }
    load_environment();
    let config = args.apply(AgentConfig::from_env());

    let mut console = Console::new();
    let model = match config.model.clone() {
        Some(model) => model,
        None => match select_model(&config, &mut console).await? {
            Some(model) => model,
            None => return Ok(()),
        },
    };

    let runtime = Arc::new(PythonRuntime::new(config.python.clone()));
    let mut agent = ForecastAgent::from_config(&config, runtime);

    match OllamaClient::from_config(&config, model.as_str()).connect().await {
        Ok(oracle) => {
            info!(model = %model, url = %oracle.base_url(), "Connected to Ollama");
            agent = agent.with_oracle(Arc::new(oracle));
        }
        Err(e) if e.is_recoverable() => {
            warn!("Continuing without a model: {}", e);
            println!("{} {}", "Warning:".yellow(), e);
        }
        Err(e) => {
            println!("{}", e.to_string().red());
            return Err(e.into());
        }
    }

    println!("\nForecast Agent initialized. Type 'help' for available commands.");

    loop {
        let prompt = format!("\n{}", "Enter command: ".green());
        let Some(line) = console.read_line(&prompt).await? else {
            save_session(&agent);
            break;
        };

        match Command::parse(&line) {
            Command::Empty => continue,
            Command::Bye => {
                if save_session(&agent) {
                    println!("Session saved. Goodbye!");
                    break;
                }
            }
            Command::Help => print_help(),
            Command::AnalyzeUsage => println!("{}", USAGE),
            Command::Analyze {
                csv_path,
                target_column,
                series_id_column,
            } => match agent.analyze(csv_path, target_column, series_id_column) {
                Ok(analysis) => println!("{}", analysis),
                Err(e) => println!("{} {}", "Error:".red(), e),
            },
            Command::Query(query) => {
                let mut operator = TerminalOperator::new(&mut console);
                let response = agent.process_query(query, &mut operator).await;
                println!("\n{}", "Agent Response:".bold());
                println!("{}", response);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("/bye"), Command::Bye);
        assert_eq!(Command::parse(" help "), Command::Help);
        assert_eq!(
            Command::parse("analyze data/sales.csv value store"),
            Command::Analyze {
                csv_path: "data/sales.csv",
                target_column: "value",
                series_id_column: "store",
            }
        );
        assert_eq!(Command::parse("analyze data/sales.csv value"), Command::AnalyzeUsage);
        assert_eq!(
            Command::parse("help me plot the trend"),
            Command::Query("help me plot the trend")
        );
        assert_eq!(Command::parse("fix write to csv"), Command::Query("fix write to csv"));
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "fc-agent",
            "--model",
            "llama3",
            "--base-url",
            "http://gpu-box:11434",
            "--horizon",
            "24",
        ]);

        let config = args.apply(AgentConfig::default());

        assert_eq!(config.model.as_deref(), Some("llama3"));
        assert_eq!(config.ollama_url, "http://gpu-box:11434");
        assert_eq!(config.forecast_horizon, 24);
        assert_eq!(config.python, "python3");
    }

    #[test]
    fn test_zero_horizon_ignored() {
        let args = Args::parse_from(["fc-agent", "--horizon", "0"]);
        assert_eq!(args.apply(AgentConfig::default()).forecast_horizon, 10);
    }
}
