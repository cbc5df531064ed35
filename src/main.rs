//! Adam - Load a property-model sheet, apply sets and print the solved values

mod args;
mod config;
mod output;

use std::env;
use std::process::ExitCode;

use adam_core::storage::load_sheet;
use adam_core::{Name, Sheet};
use adam_engine::engine::format_value;
use anyhow::Context;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use args::{Command, Options, parse_args, print_usage};
use config::Config;
use output::{Evaluation, describe_violation, list_functions, render_json, render_text};

/// Exit status when the solved sheet violates an invariant.
const EXIT_VIOLATION: u8 = 2;

fn init_logging() {
    let filter = EnvFilter::try_from_env("ADAM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(Command::Help) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Ok(Command::Functions) => {
            print!("{}", list_functions());
            return ExitCode::SUCCESS;
        }
        Ok(Command::Run(options)) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    init_logging();

    match run(&options) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(options: &Options) -> anyhow::Result<ExitCode> {
    let config = Config::load(options.config.as_deref())?;
    let mut sheet = Sheet::with_config(config.solver);
    load_sheet(&mut sheet, &options.file)?;
    let mut report = sheet.build()?;
    debug!(cells = sheet.cells().len(), "sheet built");

    for name in &options.monitors {
        let name = Name::new(name);
        sheet.monitor_value(name, move |value, _| {
            println!("{} -> {}", name, format_value(value));
        })?;
    }

    if !options.sets.is_empty() {
        for assignment in &options.sets {
            let value = sheet
                .inspect(&assignment.expression)
                .with_context(|| format!("Evaluating --set {}", assignment.name))?;
            sheet.set(assignment.name.as_str(), value)?;
        }
        report = sheet.update()?;
    }

    let mut evaluations = Vec::with_capacity(options.evals.len());
    for expression in &options.evals {
        let value = sheet
            .inspect(expression)
            .with_context(|| format!("Evaluating --eval {}", expression))?;
        evaluations.push(Evaluation {
            expression: expression.clone(),
            value,
        });
    }

    if options.json {
        println!("{}", render_json(&sheet, &evaluations, &report.violations)?);
    } else {
        print!("{}", render_text(&sheet, &evaluations));
    }

    for violation in &report.violations {
        eprintln!("Warning: {}", describe_violation(violation));
    }
    if report.violations.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_VIOLATION))
    }
}
