//! carvm CLI - Command-line front-end for the cardinals protocol runtime.
//!
//! Loads a `.car` document, optionally binds a persistent state file, and
//! runs one command against the protocol. Mutating commands save the
//! state file back when one was given.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use carvm::runtime::{Runtime, RuntimeError};

#[derive(Parser)]
#[command(name = "carvm")]
#[command(about = "Deterministic runtime for cardinals protocol documents", long_about = None)]
struct Cli {
    /// Protocol document (.car file)
    car_file: PathBuf,

    /// Persistent state file, loaded before and saved after the command
    #[arg(long)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a method with positional arguments
    Call {
        /// Method name
        method: String,

        /// Positional arguments
        args: Vec<String>,
    },

    /// Get a state value
    Get {
        /// State key
        key: String,
    },

    /// Set a state value
    Set {
        /// State key
        key: String,

        /// New value
        value: String,
    },

    /// Show the event log
    Events,

    /// Show all state
    State,

    /// Show the derived ABI
    Abi,

    /// Create a snapshot and print it
    Snapshot,
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("❌ {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let mut runtime = Runtime::new();

    runtime
        .load_protocol(&cli.car_file)
        .map_err(|e| format!("Failed to load protocol: {}", e))?;

    println!(
        "✅ Protocol loaded: {} v{}",
        runtime.protocol_name(),
        runtime.protocol_version()
    );

    if let Some(state_file) = &cli.state {
        match runtime.load_state_from_file(state_file) {
            Ok(()) => println!("📁 State loaded from {:?}", state_file),
            Err(error) => {
                tracing::warn!(%error, "state file not loaded, starting fresh");
                println!("ℹ️  No existing state file, starting fresh");
            }
        }
    }

    let command = match cli.command {
        Some(command) => command,
        None => {
            println!("\nAvailable methods:");
            for method in runtime.method_names() {
                println!("  - {}", method);
            }
            return Ok(());
        }
    };

    match command {
        Commands::Call { method, args } => {
            let result = runtime.call_method(&method, &args);
            if !result.success {
                return Err(result
                    .error_message()
                    .unwrap_or_else(|| "method execution failed".to_string()));
            }
            if !result.return_value.is_empty() {
                println!("📥 {}", result.return_value);
            }
            for event in &result.events {
                println!("📢 {}({})", event.name, event.values.join(", "));
            }
            save_state(&runtime, cli.state.as_deref())?;
        }

        Commands::Get { key } => {
            println!("{}: {}", key, runtime.get_state(&key));
        }

        Commands::Set { key, value } => {
            runtime.set_state(&key, &value);
            println!("✅ Set {} = {}", key, value);
            save_state(&runtime, cli.state.as_deref())?;
        }

        Commands::Events => {
            let log = runtime.event_log();
            if log.is_empty() {
                println!("No events in log");
            } else {
                for event in log.entries() {
                    println!(
                        "{}({}) at {}",
                        event.name,
                        event.values.join(", "),
                        event.timestamp
                    );
                }
            }
        }

        Commands::State => {
            for (key, value) in runtime.get_all_state() {
                println!("{}: {}", key, value);
            }
        }

        Commands::Abi => match runtime.abi() {
            Some(abi) => println!("{}", abi.to_string_pretty()),
            None => return Err("no protocol loaded".to_string()),
        },

        Commands::Snapshot => {
            let snapshot = runtime.create_snapshot(None);
            let json = serde_json::to_string_pretty(&snapshot)
                .map_err(|e| format!("Failed to serialize snapshot: {}", e))?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn save_state(runtime: &Runtime, state_file: Option<&std::path::Path>) -> Result<(), String> {
    if let Some(path) = state_file {
        runtime
            .save_state_to_file(path)
            .map_err(|e: RuntimeError| format!("Failed to save state: {}", e))?;
    }
    Ok(())
}
