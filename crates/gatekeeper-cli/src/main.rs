// ============================================================================
// gatectl: Operator CLI for the gate controller
// ============================================================================
// Usage:
//   gatectl status                          Show the current gate status
//   gatectl log [--format json]             Show history with durations and stats
//   gatectl badge ABC123 [--wait]           Present a badge
//   gatectl control open|close              Drive the gate through the actuator
//   gatectl clear-log                       Delete the operation log
//   gatectl uid list|add|update|remove      Manage registered badges
//   gatectl run                             Process JSON events from stdin
// ============================================================================

use anyhow::Result;
use clap::{Parser, Subcommand};
use gatekeeper_core::{
    format_timestamp, AccessDecision, DashboardSnapshot, GateConfig, GateController, GateError,
    PermissionEntry, StorageBackend,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Gate controller operator tool
#[derive(Parser)]
#[command(name = "gatectl", version, about = "Operate the access gate and inspect its audit log")]
struct Cli {
    /// Storage backend: json or redb (default from GATE_BACKEND, else json)
    #[arg(long, global = true)]
    backend: Option<StorageBackend>,

    /// Path to the redb database file (default: ~/.gatekeeper/gate.redb)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current gate status
    Status,

    /// Show the operation history with open durations and statistics
    Log {
        /// Output format: table or json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Present a badge as the NFC reader would
    Badge {
        uid: String,

        /// Stay alive until a granted badge's auto-close has fired
        #[arg(long)]
        wait: bool,
    },

    /// Manually open or close the gate
    Control {
        /// open or close
        action: String,
    },

    /// Delete the whole operation log and cancel pending auto-closes
    ClearLog,

    /// Manage registered badges
    Uid {
        #[command(subcommand)]
        command: UidCommands,
    },

    /// Process JSON-line events from stdin until EOF
    Run,
}

#[derive(Subcommand)]
enum UidCommands {
    /// List registered badges
    List,

    /// Register a new badge
    Add {
        uid: String,
        #[arg(long, default_value = "")]
        name: String,
        /// Window start (HH:MM)
        #[arg(long, default_value = "")]
        from: String,
        /// Window end (HH:MM)
        #[arg(long, default_value = "")]
        to: String,
    },

    /// Replace a badge's name and window
    Update {
        uid: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        from: String,
        #[arg(long, default_value = "")]
        to: String,
    },

    /// Remove a badge
    Remove { uid: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gatectl=info".parse()?)
                .add_directive("gatekeeper_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = GateConfig::from_env();
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(path) = cli.db_path {
        config.db_path = Some(path);
    }

    let gate = GateController::from_config(&config)?;

    match cli.command {
        Commands::Status => cmd_status(&gate).await,
        Commands::Log { format } => cmd_log(&gate, &format).await,
        Commands::Badge { uid, wait } => cmd_badge(&gate, &uid, wait, config.auto_close_delay).await,
        Commands::Control { action } => cmd_control(&gate, &action).await,
        Commands::ClearLog => cmd_clear_log(&gate).await,
        Commands::Uid { command } => cmd_uid(&gate, command).await,
        Commands::Run => cmd_run(&gate).await,
    }
}

async fn cmd_status(gate: &GateController) -> Result<()> {
    let status = gate.status().await;
    match status.operation {
        Some(op) => println!(
            "Gate {} since {} (operation {}, {})",
            op.status,
            format_timestamp(&op.timestamp),
            op.id,
            op.reason
        ),
        None => println!("Gate status unknown (never operated)"),
    }

    let pending = gate.pending_timers().await;
    if !pending.is_empty() {
        println!("Pending auto-close for operations: {:?}", pending);
    }
    Ok(())
}

async fn cmd_log(gate: &GateController, format: &str) -> Result<()> {
    let snapshot = gate.dashboard().await;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        "table" => print_snapshot(&snapshot),
        other => anyhow::bail!("Unsupported format '{}'. Use 'table' or 'json'.", other),
    }
    Ok(())
}

fn print_snapshot(snapshot: &DashboardSnapshot) {
    let current = snapshot
        .current_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());
    println!("=== Gate: {} ===", current);
    println!();

    if snapshot.operations.is_empty() {
        println!("No operations logged.");
        return;
    }

    println!(
        "{:<6}  {:<20}  {:<15}  {:<8}  {:<16}  {}",
        "ID", "TIMESTAMP", "STATUS", "REASON", "UID", "DURATION (s)"
    );
    println!("{}", "-".repeat(84));
    for op in &snapshot.operations {
        println!(
            "{:<6}  {:<20}  {:<15}  {:<8}  {:<16}  {}",
            op.id,
            format_timestamp(&op.timestamp),
            op.status.as_str(),
            op.reason.as_str(),
            op.uid,
            op.duration
        );
    }

    let stats = &snapshot.stats;
    println!();
    println!(
        "Total: {}  opened: {}  closed: {}  denied: {}  time-restricted: {}",
        stats.total_operations,
        stats.open_count,
        stats.closed_count,
        stats.denied_count,
        stats.time_restricted_count
    );
}

async fn cmd_badge(gate: &GateController, uid: &str, wait: bool, delay: Duration) -> Result<()> {
    let decision = gate.handle_badge(uid).await?;
    match &decision {
        AccessDecision::AlreadyOpen => println!("Access granted, gate is already open"),
        AccessDecision::Logged { verdict, record } => println!(
            "{:?}: logged operation {} ({})",
            verdict, record.id, record.status
        ),
    }

    if wait && decision.granted() {
        info!("Waiting {}s for auto-close", delay.as_secs());
        while !gate.pending_timers().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        let status = gate.status().await;
        println!(
            "Gate now {}",
            status.status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into())
        );
    } else if decision.granted() {
        warn!("Exiting before auto-close; the pending timer is discarded");
    }
    Ok(())
}

async fn cmd_control(gate: &GateController, action: &str) -> Result<()> {
    let outcome = gate.control_str(action).await?;
    println!(
        "Gate {} (operation {})",
        outcome.record.status, outcome.record.id
    );
    if let Some(open_id) = outcome.cancelled_timer {
        println!("Cancelled auto-close for operation {}", open_id);
    }
    Ok(())
}

async fn cmd_clear_log(gate: &GateController) -> Result<()> {
    let removed = gate.clear_log().await;
    println!("Deleted {} operations", removed);
    Ok(())
}

async fn cmd_uid(gate: &GateController, command: UidCommands) -> Result<()> {
    match command {
        UidCommands::List => {
            let uids = gate.list_permissions().await;
            if uids.is_empty() {
                println!("No badges registered.");
                return Ok(());
            }
            println!("{:<16}  {:<24}  {}", "UID", "NAME", "WINDOW");
            println!("{}", "-".repeat(56));
            for (uid, entry) in &uids {
                let window = if entry.window_from.is_empty() || entry.window_to.is_empty() {
                    "any time".to_string()
                } else {
                    format!("{}-{}", entry.window_from, entry.window_to)
                };
                println!("{:<16}  {:<24}  {}", uid, entry.name, window);
            }
            println!("\nTotal: {} badges", uids.len());
        }
        UidCommands::Add { uid, name, from, to } => {
            gate.create_permission(&uid, PermissionEntry::new(name, from, to)).await?;
            println!("Added badge {}", uid);
        }
        UidCommands::Update { uid, name, from, to } => {
            gate.update_permission(&uid, PermissionEntry::new(name, from, to)).await?;
            println!("Updated badge {}", uid);
        }
        UidCommands::Remove { uid } => {
            gate.delete_permission(&uid).await?;
            println!("Removed badge {}", uid);
        }
    }
    Ok(())
}

/// One stdin event: a badge presentation or a control request
#[derive(Deserialize)]
#[serde(untagged)]
enum InboundEvent {
    Control { action: String },
    Badge(serde_json::Value),
}

async fn cmd_run(gate: &GateController) -> Result<()> {
    info!("Reading events from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_event(gate, line).await;
        println!("{}", response);
    }

    let pending = gate.pending_timers().await;
    if !pending.is_empty() {
        warn!("Input closed with {} pending auto-close timers; discarding", pending.len());
    }
    Ok(())
}

async fn handle_event(gate: &GateController, line: &str) -> serde_json::Value {
    let event = match serde_json::from_str::<InboundEvent>(line) {
        Ok(event) => event,
        Err(e) => return error_json(&GateError::MalformedPayload(e.to_string())),
    };

    match event {
        InboundEvent::Control { action } => match gate.control_str(&action).await {
            Ok(outcome) => serde_json::json!({
                "success": true,
                "message": format!("Gate {}", outcome.record.status),
                "operation": outcome.record,
            }),
            Err(e) => error_json(&e),
        },
        InboundEvent::Badge(_) => match gate.handle_badge_payload(line).await {
            Ok(AccessDecision::AlreadyOpen) => serde_json::json!({
                "access": false,
                "message": "Gate is already open",
            }),
            Ok(decision) => serde_json::json!({ "access": decision.granted() }),
            Err(e) => error_json(&e),
        },
    }
}

fn error_json(err: &GateError) -> serde_json::Value {
    let kind = if err.is_client_error() {
        "client"
    } else if err.is_actuator_failure() {
        "actuator"
    } else {
        "internal"
    };
    serde_json::json!({
        "success": false,
        "error": kind,
        "message": err.to_string(),
    })
}
