//! Marginalia CLI bridge
//!
//! Reads the export snapshot (`document.json`) written by the annotation
//! workspace and bridges it to the agent process: print the prompt, show a
//! status summary, invoke the agent with the prompt as an argument, or watch
//! the snapshot and raise a desktop notification when it changes.

use anyhow::Context;
use clap::{Parser, Subcommand};
use marginalia_core::{ExportSnapshot, SharedPaths, Severity};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marginalia")]
#[command(about = "Bridge between an annotated document and a coding agent", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Shared directory holding state.json, document.json, agent-response.json
    #[arg(long, env = "MARGINALIA_DIR")]
    dir: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the generated prompt from the export snapshot
    Prompt,

    /// Show a status summary of the exported document
    Status,

    /// Invoke the agent process with the prompt as its argument
    Agent {
        /// Agent command to run
        #[arg(long, default_value = "claude")]
        command: String,
    },

    /// Poll the export snapshot and notify when it changes
    Watch {
        /// Poll interval in seconds
        #[arg(long, default_value = "2")]
        interval: u64,
    },

    /// Print an MCP server descriptor (copy into your agent configuration)
    McpConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let filter = EnvFilter::new(format!("marginalia={}", level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let paths = SharedPaths::resolve(cli.dir);
    debug!("Using shared directory {}", paths.dir().display());

    match cli.command {
        Commands::Prompt => {
            let snapshot = read_export(&paths)?;
            print!("{}", snapshot.prompt);
            Ok(())
        }
        Commands::Status => {
            let snapshot = read_export(&paths)?;
            print_status(&snapshot);
            Ok(())
        }
        Commands::Agent { command } => {
            let snapshot = read_export(&paths)?;
            invoke_agent(&command, &snapshot)
        }
        Commands::Watch { interval } => watch_export(&paths, interval).await,
        Commands::McpConfig => {
            print_mcp_config(&paths);
            Ok(())
        }
    }
}

/// Read and parse the export snapshot
///
/// A missing or unparseable snapshot is a hard error; the process exits
/// with code 1.
fn read_export(paths: &SharedPaths) -> anyhow::Result<ExportSnapshot> {
    let path = paths.export_path();
    let json = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "No export snapshot at {}; is the annotation workspace running?",
            path.display()
        )
    })?;
    serde_json::from_str(&json)
        .with_context(|| format!("Export snapshot {} is not valid", path.display()))
}

fn print_status(snapshot: &ExportSnapshot) {
    println!("Document: {}", snapshot.title);
    if let Some(filename) = &snapshot.filename {
        println!("File:     {}", filename);
    }
    println!("Words:    {}", snapshot.word_count);
    println!("Feedback: {} unresolved", snapshot.annotations.len());

    for severity in [Severity::MustFix, Severity::ShouldFix, Severity::Consider] {
        let count = snapshot
            .annotations
            .iter()
            .filter(|a| a.severity == severity)
            .count();
        if count > 0 {
            println!("  {:<10} {}", severity.label(), count);
        }
    }
}

/// Run the agent with the prompt as a single argument, inheriting stdio
fn invoke_agent(command: &str, snapshot: &ExportSnapshot) -> anyhow::Result<()> {
    println!(
        "Invoking {} with feedback for \"{}\"...",
        command, snapshot.title
    );
    let status = std::process::Command::new(command)
        .arg(&snapshot.prompt)
        .status()
        .with_context(|| format!("Failed to launch agent command '{}'", command))?;

    if !status.success() {
        anyhow::bail!("Agent command '{}' exited with {}", command, status);
    }
    Ok(())
}

/// Poll the export snapshot's modification time and notify on advance
async fn watch_export(paths: &SharedPaths, interval_secs: u64) -> anyhow::Result<()> {
    let path = paths.export_path();
    println!(
        "Watching {} (every {}s, Ctrl-C to stop)",
        path.display(),
        interval_secs
    );

    let mut last_modified: Option<SystemTime> = None;
    let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    loop {
        timer.tick().await;

        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };

        match last_modified {
            None => last_modified = Some(modified),
            Some(previous) if modified > previous => {
                last_modified = Some(modified);
                let title = read_export(paths)
                    .map(|s| s.title)
                    .unwrap_or_else(|_| "document".to_string());
                notify_desktop("Marginalia", &format!("\"{}\" was updated", title));
            }
            Some(_) => {}
        }
    }
}

/// Raise a desktop notification, falling back to stderr
fn notify_desktop(summary: &str, body: &str) {
    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("osascript")
        .arg("-e")
        .arg(format!(
            "display notification \"{}\" with title \"{}\"",
            body, summary
        ))
        .status();

    #[cfg(not(target_os = "macos"))]
    let result = std::process::Command::new("notify-send")
        .arg(summary)
        .arg(body)
        .status();

    match result {
        Ok(status) if status.success() => {}
        _ => {
            warn!("Desktop notification unavailable");
            eprintln!("{}: {}", summary, body);
        }
    }
}

/// Print an MCP server descriptor pointing at this binary
///
/// Convenience only; correctness of the descriptor is the agent side's
/// concern.
fn print_mcp_config(paths: &SharedPaths) {
    let descriptor = serde_json::json!({
        "mcpServers": {
            "marginalia": {
                "command": "marginalia",
                "args": ["prompt"],
                "env": {
                    "MARGINALIA_DIR": paths.dir().display().to_string()
                }
            }
        }
    });
    // to_string_pretty on a literal cannot fail.
    println!(
        "{}",
        serde_json::to_string_pretty(&descriptor).unwrap_or_default()
    );
}
