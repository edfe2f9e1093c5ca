//! Purpose: `wirecheck` CLI entry point.
//! Role: Binary crate root; parses args, runs one drill, emits JSON on stdout.
//! Invariants: Successful commands print exactly one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `wirecheck::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};

mod command_dispatch;

use wirecheck::block::DEFAULT_BLOCK_TIMEOUT;
use wirecheck::clock::{DEFAULT_CLOCK_TIMEOUT, DEFAULT_TIME_URL};
use wirecheck::listen::DEFAULT_PROBE_ADDR;
use wirecheck::serve::DEFAULT_MAX_BODY_BYTES;
use wirecheck::upload::{DEFAULT_DESCRIPTION, DEFAULT_UPLOAD_TIMEOUT, DEFAULT_UPLOAD_URL};
use wirecheck::{Error, ErrorKind, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "wirecheck",
    version,
    about = "Small networking drills: listeners, JSON endpoints, deadlines, multipart, clock skew",
    after_help = "Logging goes to stderr; set RUST_LOG (e.g. RUST_LOG=debug) to change verbosity."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bind a TCP listener, report the bound address and close it.
    Listen {
        #[arg(long, default_value = DEFAULT_PROBE_ADDR, help = "Address to bind (port 0 picks a free port)")]
        bind: String,
    },
    /// Serve the JSON user endpoint (POST {"First","Last"} -> 202).
    Serve {
        #[arg(long, default_value = "127.0.0.1:0")]
        bind: String,
        #[arg(long, help = "Permit binding to a non-loopback address")]
        allow_non_loopback: bool,
        #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
        max_body_bytes: u64,
    },
    /// Call a handler that never answers using a bounded client.
    Block {
        #[arg(long, default_value_t = DEFAULT_BLOCK_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,
    },
    /// Post a multipart form with attached files to an echo endpoint.
    Upload {
        #[arg(long, default_value = DEFAULT_UPLOAD_URL, value_hint = ValueHint::Url)]
        url: String,
        #[arg(long, default_value_t = DEFAULT_UPLOAD_TIMEOUT.as_secs())]
        timeout_secs: u64,
        #[arg(long, default_value = DEFAULT_DESCRIPTION)]
        description: String,
        #[arg(
            value_hint = ValueHint::FilePath,
            help = "Files to attach (default: ./files/hello.txt ./files/goodbye.txt)"
        )]
        files: Vec<PathBuf>,
    },
    /// Compare the local clock with a server's Date header.
    Clock {
        #[arg(long, default_value = DEFAULT_TIME_URL, value_hint = ValueHint::Url)]
        url: String,
        #[arg(long, default_value_t = DEFAULT_CLOCK_TIMEOUT.as_secs())]
        timeout_secs: u64,
    },
    /// Print a shell completion script.
    Completion { shell: Shell },
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `wirecheck --help` for usage."));
            }
        },
    };

    wirecheck::logging::init_tracing();
    command_dispatch::dispatch_command(cli.command)
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_json(value: Value) {
    let rendered = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    match rendered {
        Ok(text) => println!("{text}"),
        Err(err) => tracing::error!(error = %err, "failed to encode output json"),
    }
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    let mut message = err.message().unwrap_or("error").to_string();
    if let Some(source) = std::error::Error::source(err) {
        message.push_str(&format!(": {source}"));
    }
    message
}

fn error_text(err: &Error) -> String {
    let mut text = format!("error: {}", error_message(err));
    if let Some(url) = err.url() {
        text.push_str(&format!("\n  url: {url}"));
    }
    if let Some(status) = err.status() {
        text.push_str(&format!("\n  status: {status}"));
    }
    if let Some(hint) = err.hint() {
        text.push_str(&format!("\nhint: {hint}"));
    }
    text
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(url) = err.url() {
        inner.insert("url".to_string(), json!(url));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    json!({ "error": Value::Object(inner) })
}
