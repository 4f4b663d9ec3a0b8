use clap::Parser;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use switchboard::agents::{ChatApplication, ChatEvent};
use switchboard::cli::{Cli, Command};
use switchboard::config::{Credentials, Settings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let settings = Settings::new_with_cli(&cli)?;
    let credentials = Credentials::from_env(settings.credential_names());
    info!(
        agents = settings.manifests.len(),
        models = settings.models.len(),
        "Configuration loaded"
    );

    let mid_line = Arc::new(AtomicBool::new(false));
    let printer = mid_line.clone();
    let mut app = ChatApplication::new(settings, credentials)?.with_callback(move |agent, event| {
        print_event(agent, event, &printer);
    });

    if let Some(agent) = &cli.agent {
        app.switch_session(Some(agent), true, None, None).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}: ", app.session().agent_name().unwrap_or("You"));
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Command::Exit => break,
            Command::Empty => {}
            Command::Reset => {
                let agent = app.session().agent_name().map(str::to_string);
                app.switch_session(agent.as_deref(), true, None, None).await;
            }
            Command::Switch(agent) => {
                app.switch_session(Some(&agent), true, None, None).await;
            }
            Command::Ask(text) => {
                let cancel = app.cancel_handle();
                let interrupt = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                });

                let result = app.ask(text).await;
                interrupt.abort();
                if mid_line.swap(false, Ordering::SeqCst) {
                    println!();
                }
                result?;
            }
        }
    }

    Ok(())
}

fn print_event(agent: Option<&str>, event: &ChatEvent, mid_line: &AtomicBool) {
    let speaker = agent.unwrap_or("GPT");

    if let ChatEvent::Bot { text, partial: true } = event {
        if !mid_line.swap(true, Ordering::SeqCst) {
            print!("{}: ", speaker);
        }
        print!("{}", text);
        let _ = std::io::stdout().flush();
        return;
    }

    if mid_line.swap(false, Ordering::SeqCst) {
        println!();
    }

    match event {
        ChatEvent::Info { message } => println!("{}", message),
        ChatEvent::Bot { text, .. } => println!("{}: {}", speaker, text),
        ChatEvent::Function { name, result } => println!("function({}): {}", name, result),
        ChatEvent::Emit { action } => tracing::debug!(method = action.method(), "Action emitted"),
        ChatEvent::Error { message } => eprintln!("Error: {}", message),
    }
}
