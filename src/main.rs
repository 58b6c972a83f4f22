use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use flowloop::config::{GlobalConfig, LoopType};
use flowloop::domain::{LogEvent, LogLevel, format_log_message};
use flowloop::expr::{Bindings, ExpressionEvaluator};
use flowloop::flow::{FlowDefinition, run_flow};
use flowloop::id::generate_run_id;
use flowloop::runtime::ActivationFlag;

mod cli;

use cli::Cli;
use cli::commands::Commands;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flowloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("flowloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &GlobalConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run { file, input, json } => handle_run_command(file, input.as_deref(), *json, cli.is_verbose(), config),
        Commands::Check { patterns } => handle_check_command(patterns, config),
        Commands::Eval { expression, bindings } => handle_eval_command(expression, bindings.as_deref()),
    }
}

fn handle_run_command(file: &Path, input: Option<&str>, json: bool, verbose: bool, config: &GlobalConfig) -> Result<()> {
    let run_id = generate_run_id();
    info!("[{}] Running flow file: {}", run_id, file.display());

    let mut definition = FlowDefinition::load_from_file(file)?;
    if let Some(raw) = input {
        definition.input = serde_json::from_str(raw).context("Failed to parse --input as JSON")?;
    }
    let loop_type = definition.loop_config(config)?.loop_type;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let run = runtime.block_on(async {
        let activation = ActivationFlag::new();
        let on_interrupt = activation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, deactivating flow");
                on_interrupt.deactivate();
            }
        });
        run_flow(&definition, config, activation).await
    })?;

    if !json || verbose {
        for event in &run.events {
            print_event(event, loop_type);
        }
    }

    let report = run.result.with_context(|| format!("Flow {} failed", file.display()))?;
    info!("[{}] Finished: {:?} after {} iterations", run_id, report.stop_reason, report.iterations);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} {} iterations ({:?})",
            "Done:".green(),
            report.iterations,
            report.stop_reason
        );
        println!("{}", serde_json::to_string_pretty(&report.output)?);
    }
    Ok(())
}

fn print_event(event: &LogEvent, loop_type: LoopType) {
    let message = format_log_message(loop_type, event.level, &event.message);
    let label = match event.level {
        LogLevel::Info => "info".cyan(),
        LogLevel::Success => "success".green(),
        LogLevel::Warning => "warning".yellow(),
        LogLevel::Error => "error".red(),
    };
    println!("[{}] {}", label, message);
}

fn handle_check_command(patterns: &[String], config: &GlobalConfig) -> Result<()> {
    let mut files = Vec::new();
    for pattern in patterns {
        let matches: Vec<PathBuf> = glob::glob(pattern)
            .with_context(|| format!("Invalid pattern {}", pattern))?
            .filter_map(|entry| entry.ok())
            .collect();
        if matches.is_empty() {
            println!("{} {}: no files matched", "✗".red(), pattern);
        }
        files.extend(matches);
    }

    let mut failures = 0;
    for file in &files {
        match check_flow_file(file, config) {
            Ok(()) => println!("{} {}", "✓".green(), file.display()),
            Err(e) => {
                failures += 1;
                println!("{} {}: {:#}", "✗".red(), file.display(), e);
            }
        }
    }

    if failures > 0 || files.is_empty() {
        eyre::bail!("{} of {} flow files failed validation", failures, files.len());
    }
    Ok(())
}

fn check_flow_file(file: &Path, config: &GlobalConfig) -> Result<()> {
    info!("Checking flow file: {}", file.display());
    let definition = FlowDefinition::load_from_file(file)?;
    definition.validate()?;
    definition.loop_config(config)?.validate()
}

fn handle_eval_command(expression: &str, bindings: Option<&str>) -> Result<()> {
    info!("Evaluating condition: {}", expression);
    let bindings = match bindings {
        None => Bindings::new(),
        Some(raw) => match serde_json::from_str::<Value>(raw).context("Failed to parse --bindings as JSON")? {
            Value::Object(map) => Bindings::from_object(&map),
            _ => eyre::bail!("--bindings must be a JSON object"),
        },
    };

    let result = ExpressionEvaluator::new().evaluate(expression, &bindings)?;
    let shown = if result { "true".green() } else { "false".red() };
    println!("{}", shown);
    Ok(())
}

fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = GlobalConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
