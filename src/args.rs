//! Command-line argument parsing.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ArgsError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("No sheet file given")]
    MissingFile,

    #[error("Expected NAME=EXPR, got '{0}'")]
    InvalidAssignment(String),
}

/// A `-s NAME=EXPR` assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Default, PartialEq)]
pub struct Options {
    pub file: PathBuf,
    pub sets: Vec<Assignment>,
    pub evals: Vec<String>,
    pub monitors: Vec<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Help,
    Functions,
    Run(Options),
}

pub fn print_usage() {
    eprintln!("Usage: adam [OPTIONS] FILE");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  FILE                      Sheet description to load (.adm)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --set <NAME=EXPR>     Set a cell before updating (can be repeated)");
    eprintln!("  -e, --eval <EXPR>         Evaluate an expression after updating (can be repeated)");
    eprintln!("  -m, --monitor <NAME>      Print changes to a cell as they happen (can be repeated)");
    eprintln!("  --config <FILE>           Load solver settings from a TOML file");
    eprintln!("  --json                    Print the result as JSON");
    eprintln!("  --functions               List the built-in functions");
    eprintln!("  -h, --help                Print help");
    eprintln!();
    eprintln!("Set ADAM_LOG (e.g. ADAM_LOG=debug) to see solver logging.");
}

fn assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=(.+)$").expect("valid regex")
    })
}

fn parse_assignment(text: &str) -> Result<Assignment, ArgsError> {
    let caps = assignment_regex()
        .captures(text)
        .ok_or_else(|| ArgsError::InvalidAssignment(text.to_string()))?;
    match (caps.get(1), caps.get(2)) {
        (Some(name), Some(expression)) if !expression.as_str().trim().is_empty() => Ok(Assignment {
            name: name.as_str().to_string(),
            expression: expression.as_str().trim().to_string(),
        }),
        _ => Err(ArgsError::InvalidAssignment(text.to_string())),
    }
}

/// Parse `args` (without the program name).
pub fn parse_args(args: &[String]) -> Result<Command, ArgsError> {
    let mut file: Option<PathBuf> = None;
    let mut options = Options::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--functions" => return Ok(Command::Functions),
            "-s" | "--set" => {
                i += 1;
                let value = args.get(i).ok_or(ArgsError::MissingValue("--set"))?;
                options.sets.push(parse_assignment(value)?);
            }
            "-e" | "--eval" => {
                i += 1;
                let value = args.get(i).ok_or(ArgsError::MissingValue("--eval"))?;
                options.evals.push(value.clone());
            }
            "-m" | "--monitor" => {
                i += 1;
                let value = args.get(i).ok_or(ArgsError::MissingValue("--monitor"))?;
                options.monitors.push(value.clone());
            }
            "--config" => {
                i += 1;
                let value = args.get(i).ok_or(ArgsError::MissingValue("--config"))?;
                options.config = Some(PathBuf::from(value));
            }
            "--json" => options.json = true,
            arg if arg.starts_with('-') && arg.len() > 1 => {
                return Err(ArgsError::UnknownOption(arg.to_string()));
            }
            arg => {
                if file.is_some() {
                    return Err(ArgsError::UnexpectedArgument(arg.to_string()));
                }
                file = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    options.file = file.ok_or(ArgsError::MissingFile)?;
    Ok(Command::Run(options))
}
