mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use bridge::{Bridge, RuntimeLayout};
use chrono::{Local, TimeZone};
use clap::{ArgAction, Parser, Subcommand};
use runtime::{
    OpenAiBackend, Orchestrator, RunOutcome, Solver, SolverToolHost, ToolCall, ToolHost,
};
use storage::{Event, EventKind, EventStore, Role};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const JOURNAL_FILE: &str = "journal.db";
const PREVIEW_CHARS: usize = 200;

type Agent = Orchestrator<OpenAiBackend, SolverToolHost<Bridge>>;

#[derive(Parser)]
#[command(name = "graphbees")]
#[command(about = "Describe an optimization problem, get a solved and explained answer", long_about = None)]
#[command(version)]
struct Cli {
    /// More logging (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to ./graphbees.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single prompt
    Ask {
        /// The problem, in plain language
        prompt: String,
    },
    /// Start an interactive session; every line is a fresh run
    Chat,
    /// Prepare the Julia environment and report its thread count
    Setup,
    /// List the solver tools
    Tools,
    /// Invoke a tool directly, without a model
    Call {
        /// Tool name, e.g. bin_packing
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },
    /// List recorded runs
    Runs {
        /// Show only the last N runs
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show the events of a run
    Logs {
        /// Run ID (prefix match supported)
        #[arg(short, long)]
        run: String,
        /// Filter by event kind (message, tool_call, tool_result, ...)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Ask { prompt }) => cmd_ask(&config, &prompt).await,
        Some(Commands::Chat) | None => cmd_chat(&config).await,
        Some(Commands::Setup) => cmd_setup(&config).await,
        Some(Commands::Tools) => {
            cmd_tools();
            Ok(())
        }
        Some(Commands::Call { tool, arguments }) => cmd_call(&config, tool, arguments).await,
        Some(Commands::Runs { limit }) => cmd_runs(&config, limit),
        Some(Commands::Logs { run, kind }) => cmd_logs(&config, &run, kind.as_deref()),
    }
}

/// Validate provider settings, open the journal, and bring up Julia, in that
/// order, so a missing key fails before anything slow happens.
async fn agent(config: &Config, bridge: &Arc<Bridge>) -> Result<Agent> {
    let llm = config.llm()?;
    let mut builder = OpenAiBackend::builder(llm.api_key, llm.base_url, llm.model);
    if let Some(max_tokens) = llm.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    let backend = builder.build()?;

    let journal_path = journal_path(config);
    if let Some(parent) = journal_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let journal = Arc::new(EventStore::open(&journal_path)?);

    bridge.ensure_ready().await?;
    let mut agent =
        Orchestrator::new(backend, SolverToolHost::new(Arc::clone(bridge))).with_journal(journal);
    if let Some(max_turns) = config.max_turns {
        agent = agent.with_max_turns(max_turns);
    }
    info!(journal = %journal_path.display(), max_turns = agent.max_turns(), "agent ready");
    Ok(agent)
}

fn bridge(config: &Config) -> Result<Arc<Bridge>> {
    let layout = RuntimeLayout::configure(&config.runtime)?;
    Ok(Arc::new(Bridge::new(layout, config.julia.clone())))
}

async fn cmd_ask(config: &Config, prompt: &str) -> Result<()> {
    let bridge = bridge(config)?;
    let agent = agent(config, &bridge).await?;
    let outcome = agent.run(prompt).await;
    bridge.shutdown().await?;
    print_outcome(&outcome?);
    Ok(())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    println!("graphbees v{}", env!("CARGO_PKG_VERSION"));

    let bridge = bridge(config)?;
    let agent = agent(config, &bridge).await?;

    println!("Runtime: {}", bridge.layout().root.display());
    if config.allow_shutdown {
        println!("Type 'quit' or Ctrl+D to exit, '/shutdown' to stop Julia and exit.\n");
    } else {
        println!("Type 'quit' or Ctrl+D to exit.\n");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }
        if input == "/shutdown" {
            if config.allow_shutdown {
                bridge.shutdown().await?;
                println!("Julia session stopped.");
                return Ok(());
            }
            println!("Shutdown is disabled in this environment.\n");
            continue;
        }

        match agent.run(input).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => eprintln!("Error: {e}\n"),
        }
    }

    bridge.shutdown().await?;
    println!("\nBye.");
    Ok(())
}

async fn cmd_setup(config: &Config) -> Result<()> {
    let bridge = bridge(config)?;
    let layout = bridge.layout();
    println!("Runtime root: {}", layout.root.display());
    println!("Project:      {}", layout.project.display());

    let threads = bridge::Runtime::threads(bridge.as_ref()).await?;
    println!("Julia ready with {threads} thread(s).");
    bridge.shutdown().await?;
    Ok(())
}

fn cmd_tools() {
    for solver in Solver::ALL {
        let meta = solver.metadata();
        println!("{:<30}  {}", solver.name(), meta.display_name);
        println!("{:<30}  algorithm:  {}", "", meta.algorithm);
        println!("{:<30}  guarantee:  {}", "", meta.guarantee);
        println!("{:<30}  complexity: {}", "", meta.complexity);
    }
}

async fn cmd_call(config: &Config, tool: String, arguments: String) -> Result<()> {
    let bridge = bridge(config)?;
    bridge.ensure_ready().await?;
    let host = SolverToolHost::new(Arc::clone(&bridge));
    let call = ToolCall {
        id: "cli".into(),
        name: tool,
        arguments,
    };
    let result = host.execute(&call).await;
    bridge.shutdown().await?;

    let value = result?;
    let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    println!("{pretty}");
    Ok(())
}

fn cmd_runs(config: &Config, limit: usize) -> Result<()> {
    let store = open_journal(config)?;
    let runs = store.list_runs()?;

    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<5}  {:<8}  PROMPT",
        "RUN ID", "STARTED", "TOOLS", "STATUS"
    );
    println!("{}", "-".repeat(100));

    for summary in runs.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let status = if summary.ended_at.is_some() {
            "done"
        } else {
            "failed"
        };
        println!(
            "{:<36}  {:<16}  {:<5}  {status:<8}  {}",
            summary.id,
            started,
            summary.tool_calls,
            preview(&summary.prompt, 40)
        );
    }

    Ok(())
}

fn cmd_logs(config: &Config, run_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_journal(config)?;

    let runs = store.list_runs()?;
    let matching: Vec<_> = runs
        .iter()
        .filter(|r| r.id.to_string().starts_with(run_prefix))
        .collect();

    let run_id = match matching.as_slice() {
        [] => {
            return Err(Error::RunNotFound {
                prefix: run_prefix.to_string(),
            });
        }
        [only] => only.id,
        _ => {
            return Err(Error::AmbiguousRun {
                prefix: run_prefix.to_string(),
                matches: matching.iter().map(|r| r.id.to_string()).collect(),
            });
        }
    };

    let events = store.load_run(run_id, kind_filter)?;

    if events.is_empty() {
        println!("No events found for run {run_id}");
        return Ok(());
    }

    println!("Run: {run_id}\n");

    for event in events {
        print_event(&event);
    }

    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    println!("\n{}\n", outcome.answer);
    for result in &outcome.tool_results {
        let name = result.solver().unwrap_or(result.tool());
        match result.error() {
            Some(error) => println!("  {name}: failed after {:.4}s: {error}", result.elapsed_s()),
            None => {
                let threads = result
                    .julia_threads()
                    .map(|n| format!(", {n} Julia thread(s)"))
                    .unwrap_or_default();
                println!(
                    "  {name}: {} | {} | {}s{threads}",
                    result.algorithm().unwrap_or("-"),
                    result.guarantee().unwrap_or("-"),
                    result.elapsed_s()
                );
            }
        }
        println!("    input: {}", result.input_summary());
    }
    if !outcome.tool_results.is_empty() {
        println!();
    }
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &event.kind {
        EventKind::RunStart { prompt } => {
            println!("[{time}] === Run started: {} ===", preview(prompt, PREVIEW_CHARS));
        }
        EventKind::RunEnd { turns } => {
            println!("[{time}] === Run finished after {turns} turn(s) ===");
        }
        EventKind::Message { role, content } => {
            let role_str = match role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
                Role::System => "SYSTEM",
                Role::Tool => "TOOL",
            };
            println!("[{time}] {role_str}: {}", preview(content, PREVIEW_CHARS));
        }
        EventKind::ToolCall { name, arguments } => {
            println!("[{time}] TOOL CALL: {name} {}", preview(arguments, PREVIEW_CHARS));
        }
        EventKind::ToolResult { name, record } => {
            let detail = match (record.get("error"), record.get("result")) {
                (Some(error), _) if !error.is_null() => format!("error: {error}"),
                (_, Some(result)) => preview(&result.to_string(), PREVIEW_CHARS),
                _ => String::new(),
            };
            println!("[{time}] TOOL RESULT: {name} {detail}");
        }
    }
}

/// First `max` characters of `text`, with an ellipsis when cut.
fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}

fn journal_path(config: &Config) -> PathBuf {
    config.journal.clone().unwrap_or_else(|| {
        dirs_data_dir()
            .unwrap_or_else(|| ".graphbees".into())
            .join(JOURNAL_FILE)
    })
}

fn open_journal(config: &Config) -> Result<EventStore> {
    let path = journal_path(config);
    if !path.exists() {
        return Err(Error::JournalNotFound { path });
    }
    Ok(EventStore::open(&path)?)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/graphbees"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("graphbees"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("graphbees"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_commands() {
        let cli = Cli::try_parse_from(["graphbees", "-vv", "logs", "--run", "ab12", "--kind", "tool_call"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Some(Commands::Logs { ref run, kind: Some(ref kind) }) if run == "ab12" && kind == "tool_call"
        ));

        let cli = Cli::try_parse_from(["graphbees", "call", "bin_packing"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Call { ref tool, ref arguments }) if tool == "bin_packing" && arguments == "{}"
        ));

        let cli = Cli::try_parse_from(["graphbees", "--config", "x.toml", "runs"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Some(Commands::Runs { limit: 10 })));
    }

    #[test]
    fn preview_cuts_on_characters() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }
}
