use clap::Parser;
use std::path::PathBuf;

/// Switchboard - chat with LLM agents that can hand the conversation to each other
#[derive(Parser, Debug, Clone)]
#[command(name = "switchboard", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SWITCHBOARD_CONFIG", default_value = "switchboard.toml")]
    pub config: PathBuf,

    /// Show model details and fail loudly on loop errors
    #[arg(short, long)]
    pub verbose: bool,

    /// Agent to activate at start
    #[arg(short, long, env = "SWITCHBOARD_AGENT")]
    pub agent: Option<String>,

    /// Default model name (overrides `default_model`)
    #[arg(short, long, env = "SWITCHBOARD_MODEL")]
    pub model: Option<String>,
}

/// A line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/bye`
    Exit,
    /// `/reset`
    Reset,
    /// `/NAME`
    Switch(String),
    /// Anything else
    Ask(String),
    /// Blank line
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.strip_prefix('/') {
            Some("bye") => Command::Exit,
            Some("reset") => Command::Reset,
            Some(name) if !name.is_empty() => Command::Switch(name.to_string()),
            Some(_) => Command::Empty,
            None if line.is_empty() => Command::Empty,
            None => Command::Ask(line.to_string()),
        }
    }
}
