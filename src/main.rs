//! LPD8 tool
//!
//! Backup, restore and edit the programs of an Akai LPD8 pad controller.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lpd8::backup::{self, Backup};
use lpd8::commands;
use lpd8::config::ToolConfig;
use lpd8::device::{discovery, MidiTransport};
use lpd8::{inbound_queue, Connection, ProgramIndex};

/// LPD8 tool - backup, restore and edit Akai LPD8 programs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// MIDI device name (substring of the port name)
    #[arg(short, long, env = "LPD8_DEVICE", global = true)]
    device: Option<String>,

    /// Path to YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable logging (same as --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read all programs into a backup file
    Backup { file: PathBuf },
    /// Write all programs from a backup file
    Restore { file: PathBuf },
    /// Print one program as JSON
    ReadProg { program: ProgramIndex },
    /// Write one program from a JSON file
    WriteProg { program: ProgramIndex, file: PathBuf },
    /// Print the active program
    GetActive,
    /// Select the active program
    SetActive { program: ProgramIndex },
    /// List available MIDI ports
    ListPorts,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = if args.verbose { "debug" } else { args.log_level.as_str() };
    init_logging(level)?;

    let mut config = match &args.config {
        Some(path) => ToolConfig::load(path).await?,
        None => ToolConfig::default(),
    };
    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    debug!("Configuration: {:?}", config);

    if let Command::ListPorts = args.command {
        return list_ports();
    }

    // Validate local input before touching the device.
    let program_file = match &args.command {
        Command::WriteProg { file, .. } => {
            let program = backup::load_program(file).await?;
            program.validate().context("Invalid program file")?;
            Some(program)
        }
        _ => None,
    };
    let restore_data = match &args.command {
        Command::Restore { file } => Some(Backup::load_from_file(file).await?),
        _ => None,
    };

    let (sink, queue) = inbound_queue(config.queue_capacity);
    let transport = MidiTransport::open(&config.device, sink)?;
    info!("Opened LPD8 on '{}'", transport.port_name());
    let conn = Connection::new(transport, queue).with_timeout(config.response_timeout());

    let result = execute(&conn, args.command, program_file, restore_data).await;
    conn.close();
    result
}

async fn execute(
    conn: &Connection<MidiTransport>,
    command: Command,
    program_file: Option<lpd8::Program>,
    restore_data: Option<Backup>,
) -> Result<()> {
    match command {
        Command::Backup { file } => {
            let data = commands::backup(conn).await?;
            println!("Writing backup: {}", file.display());
            data.save_to_file(&file).await?;
        }
        Command::Restore { .. } => {
            let data = restore_data.context("backup not loaded")?;
            let report = commands::restore(conn, &data)?;
            for index in &report.missing {
                println!(
                    "{} program {} is missing in backup file.",
                    "Note:".yellow(),
                    index
                );
            }
            println!("{}", "OK".green());
        }
        Command::ReadProg { program } => {
            let prog = conn.read_program(program).await?;
            println!("{}", backup::program_to_json(&prog)?);
        }
        Command::WriteProg { program: index, .. } => {
            let prog = program_file.context("program not loaded")?;
            conn.write_program(index, &prog)?;
            println!("{}", "OK".green());
        }
        Command::GetActive => {
            let index = conn.active_program().await?;
            println!("{}", index);
        }
        Command::SetActive { program } => {
            conn.set_active_program(program)?;
            println!("{}", "OK".green());
        }
        Command::ListPorts => {}
    }
    Ok(())
}

fn list_ports() -> Result<()> {
    println!("\n{}", "=== MIDI Input Ports ===".bold().cyan());
    for (i, name) in discovery::list_input_ports()?.iter().enumerate() {
        println!("  {}: {}", i, name);
    }

    println!("\n{}", "=== MIDI Output Ports ===".bold().cyan());
    for (i, name) in discovery::list_output_ports()?.iter().enumerate() {
        println!("  {}: {}", i, name);
    }
    println!();
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
