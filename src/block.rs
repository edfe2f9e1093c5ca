//! Purpose: Show what a client deadline buys against a handler that never answers.
//! Exports: `BlockOutcome`, `demonstrate_deadline`, `DEFAULT_BLOCK_TIMEOUT`.
//! Role: Starts a `LocalServer` with `block_router` and calls it with a bounded client.
//! Invariants: The unbounded call is never made; the bounded one must end in `ErrorKind::Timeout`.
use std::time::{Duration, Instant};

use crate::client::HttpClient;
use crate::core::error::{Error, ErrorKind};
use crate::serve::{LocalServer, block_router};

pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct BlockOutcome {
    pub url: String,
    pub timeout: Duration,
    pub waited: Duration,
}

pub fn demonstrate_deadline(timeout: Duration) -> Result<BlockOutcome, Error> {
    if timeout.is_zero() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("timeout must be greater than zero")
            .with_hint("An unbounded call to a blocking handler never returns."));
    }

    let server = LocalServer::start(block_router())?;
    let url = server.url();
    let client = HttpClient::with_timeout(timeout);

    let started = Instant::now();
    let result = client.get(&url);
    let waited = started.elapsed();

    match result {
        Err(err) if err.kind() == ErrorKind::Timeout => {
            tracing::info!(
                url = %url,
                waited_ms = waited.as_millis() as u64,
                "client gave up on blocking handler"
            );
            Ok(BlockOutcome {
                url,
                timeout,
                waited,
            })
        }
        Err(err) => Err(err),
        Ok(response) => Err(Error::new(ErrorKind::Internal)
            .with_message("client not indefinitely blocked")
            .with_url(url)
            .with_status(response.status())),
    }
}
