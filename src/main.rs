//! txframe - run execution plans against in-memory transactions
//!
//! Loads a JSON plan of nested frames, drives every frame through its
//! transaction strategy and prints the resulting native journal.

use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};

use txframe::{ExecutionPlan, ModeKind, PlanRunner};

fn print_usage() {
    println!("txframe - hierarchical transaction scopes for nested execution frames");
    println!();
    println!("Usage: txframe --plan FILE [--mode KIND]");
    println!();
    println!("Options:");
    println!("  -p, --plan FILE       Execution plan to run (JSON)");
    println!("  -m, --mode KIND       Override the top frame's mode (none, create_root,");
    println!("                        create_child_if_parent)");
    println!("  -h, --help            Show this help");
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut plan_path: Option<PathBuf> = None;
    let mut mode_override: Option<ModeKind> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--plan" | "-p" => {
                if i + 1 < args.len() {
                    plan_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--mode" | "-m" => {
                if i + 1 < args.len() {
                    match ModeKind::from_name(&args[i + 1]) {
                        Some(kind) => mode_override = Some(kind),
                        None => {
                            error!("Unknown transaction mode: {}", args[i + 1]);
                            return ExitCode::FAILURE;
                        }
                    }
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            other => {
                error!("Unknown argument: {}", other);
                print_usage();
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let Some(plan_path) = plan_path else {
        print_usage();
        return ExitCode::FAILURE;
    };

    let mut plan = match ExecutionPlan::from_file(&plan_path) {
        Ok(plan) => plan,
        Err(e) => {
            error!("Failed to load plan {:?}: {}", plan_path, e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(kind) = mode_override {
        info!("Top frame runs as {} ({})", kind, kind.description());
        plan.root.mode.kind = kind;
    }

    let runner = PlanRunner::new();
    let outcome = runner.run(&plan);

    println!("Frames:");
    for event in runner.trace() {
        println!("  {}", event);
    }
    println!("Journal:");
    for entry in runner.journal() {
        println!("  {}", entry);
    }

    match outcome {
        Ok(()) => {
            info!("Plan completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Plan failed [{}]: {}", e.error_code(), e);
            ExitCode::FAILURE
        }
    }
}
