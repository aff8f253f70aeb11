//! `RetryingFTP`: a single host's FTP control connection with a bounded
//! reconnect/retry budget (§4.4).
//!
//! Unlike the one-shot downloads in a typical ingestion pipeline (connect,
//! fetch, quit), a walk holds one control connection open across many
//! `MLSD` calls for the lifetime of a host's indexation task. That rules
//! out handing each call to a blocking thread pool the way a single
//! download would be: the connection itself needs to survive between
//! `.await` points. `suppaftp`'s async client (feature `async`) gives us a
//! connection that lives directly on the tokio runtime, so reconnects are
//! just dropping and recreating the client rather than juggling ownership
//! across `spawn_blocking` boundaries.

use std::net::Ipv4Addr;
use std::time::Duration;

use suppaftp::{AsyncFtpStream, FtpError};
use tracing::{debug, warn};

use crate::error::WalkError;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub user: String,
    pub passwd: String,
    pub timeout: Duration,
    pub max_errors: u32,
}

/// One entry of an `MLSD` listing.
#[derive(Debug, Clone)]
pub struct FtpEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// A lazily-connecting, self-healing FTP control session scoped to one
/// host. Not `Clone`: a host's walk owns exactly one of these.
pub struct RetryingFtp {
    config: SessionConfig,
    conn: Option<AsyncFtpStream>,
    errors_remaining: u32,
    has_listed: bool,
}

impl RetryingFtp {
    pub fn new(config: SessionConfig) -> Self {
        let errors_remaining = config.max_errors;
        Self { config, conn: None, errors_remaining, has_listed: false }
    }

    /// Lists `path` via `MLSD`, requesting the `type` and `size` facts.
    ///
    /// On a transient error the connection is torn down and the whole
    /// operation is retried against a fresh one, consuming one unit of the
    /// error budget. A permanent (5xx) reply on the very first listing this
    /// session has attempted is reported as [`WalkError::MlsdNotSupported`];
    /// on any later listing it is a directory-scoped
    /// [`WalkError::PermissionDenied`] that does not touch the budget.
    pub async fn mlsd(&mut self, path: &str) -> Result<Vec<FtpEntry>, WalkError> {
        loop {
            let conn = match self.conn.take() {
                Some(conn) => conn,
                None => match self.connect().await {
                    Ok(conn) => conn,
                    Err(err) if is_permanent(&err) => return self.permanent_error(path),
                    Err(err) => {
                        self.consume_budget(&err)?;
                        continue;
                    },
                },
            };

            match run_mlsd(conn, path, self.config.timeout).await {
                Ok((conn, entries)) => {
                    self.conn = Some(conn);
                    self.has_listed = true;
                    return Ok(entries);
                },
                Err(err) if is_permanent(&err) => return self.permanent_error(path),
                Err(err) => {
                    self.consume_budget(&err)?;
                },
            }
        }
    }

    fn permanent_error(&mut self, path: &str) -> Result<Vec<FtpEntry>, WalkError> {
        let already_listed = self.has_listed;
        self.has_listed = true;
        if already_listed {
            Err(WalkError::PermissionDenied { path: path.to_string() })
        } else {
            Err(WalkError::MlsdNotSupported)
        }
    }

    fn consume_budget(&mut self, err: &FtpError) -> Result<(), WalkError> {
        warn!(ip = %self.config.ip, error = %err, "transient FTP error, reconnecting");
        self.conn = None;
        if self.errors_remaining == 0 {
            return Err(WalkError::TooManyErrors { attempts: self.config.max_errors + 1 });
        }
        self.errors_remaining -= 1;
        Ok(())
    }

    async fn connect(&self) -> Result<AsyncFtpStream, FtpError> {
        let addr = format!("{}:{}", self.config.ip, self.config.port);
        debug!(%addr, "opening FTP control connection");
        let mut stream = tokio::time::timeout(self.config.timeout, AsyncFtpStream::connect(&addr))
            .await
            .map_err(|_| FtpError::ConnectionError(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            )))??;
        stream.login(&self.config.user, &self.config.passwd).await?;
        Ok(stream)
    }
}

async fn run_mlsd(
    mut conn: AsyncFtpStream,
    path: &str,
    timeout: Duration,
) -> Result<(AsyncFtpStream, Vec<FtpEntry>), FtpError> {
    let listing = tokio::time::timeout(timeout, conn.mlsd(Some(path)))
        .await
        .map_err(|_| FtpError::ConnectionError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "MLSD timed out",
        )))??;

    let entries = listing
        .into_iter()
        .map(|file| FtpEntry {
            name: file.name().to_string(),
            is_dir: file.is_directory(),
            size: file.size() as u64,
        })
        .collect();

    Ok((conn, entries))
}

fn is_permanent(err: &FtpError) -> bool {
    match err {
        FtpError::UnexpectedResponse(response) => {
            (response.status.code() / 100) == 5
        },
        _ => false,
    }
}
