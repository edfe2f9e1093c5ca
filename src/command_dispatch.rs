//! Purpose: Hold top-level CLI command dispatch for `wirecheck`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each arm prints at most one JSON document and returns the exit outcome.

use super::*;

use std::net::SocketAddr;
use std::time::Duration;

use clap::CommandFactory;
use time::format_description::well_known::Rfc3339;
use wirecheck::block::demonstrate_deadline;
use wirecheck::clock::{check_skew, format_http_date};
use wirecheck::listen::probe;
use wirecheck::serve::{ServeConfig, serve};
use wirecheck::upload::{UploadConfig, upload};

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "wirecheck", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Listen { bind } => {
            let addr = parse_bind(&bind)?;
            let bound = probe(addr)?;
            emit_json(json!({
                "listen": {
                    "addr": bound.to_string(),
                    "port": bound.port(),
                }
            }));
            Ok(RunOutcome::ok())
        }
        Command::Serve {
            bind,
            allow_non_loopback,
            max_body_bytes,
        } => {
            let config = ServeConfig {
                bind: parse_bind(&bind)?,
                allow_non_loopback,
                max_body_bytes,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::Block { timeout_ms } => {
            let outcome = demonstrate_deadline(Duration::from_millis(timeout_ms))?;
            emit_json(json!({
                "block": {
                    "url": outcome.url,
                    "timeout_ms": outcome.timeout.as_millis() as u64,
                    "waited_ms": outcome.waited.as_millis() as u64,
                    "timed_out": true,
                }
            }));
            Ok(RunOutcome::ok())
        }
        Command::Upload {
            url,
            timeout_secs,
            description,
            files,
        } => {
            let mut config = UploadConfig {
                url,
                timeout: Duration::from_secs(timeout_secs),
                description,
                ..UploadConfig::default()
            };
            if !files.is_empty() {
                config.files = files;
            }
            let (form, report) = upload(&config)?;
            let echo = serde_json::from_str::<Value>(&report.body)
                .unwrap_or_else(|_| Value::String(report.body.clone()));
            let reflected = report.echo.as_ref().map(|echo| echo.contains_form(&form));
            let file_names = form
                .files
                .iter()
                .map(|file| json!({ "field": file.field, "filename": file.file_name }))
                .collect::<Vec<_>>();
            emit_json(json!({
                "upload": {
                    "url": config.url,
                    "status": report.status,
                    "files": file_names,
                    "reflected": reflected,
                    "echo": echo,
                }
            }));
            Ok(RunOutcome::ok())
        }
        Command::Clock { url, timeout_secs } => {
            let skew = check_skew(&url, Duration::from_secs(timeout_secs))?;
            let remote = format_http_date(skew.remote)?;
            let local = skew.local.format(&Rfc3339).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to format local time")
                    .with_source(err)
            })?;
            emit_json(json!({
                "clock": {
                    "url": url,
                    "remote": remote,
                    "local": local,
                    "skew_ms": skew.skew_ms() as i64,
                }
            }));
            Ok(RunOutcome::ok())
        }
    }
}

fn parse_bind(bind: &str) -> Result<SocketAddr, Error> {
    bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:0.")
    })
}
