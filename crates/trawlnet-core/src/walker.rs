//! Recursive per-host directory enumeration (§4.5).

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use tracing::{debug, warn};

use crate::error::WalkError;
use crate::index::{FileIndex, FileRecord};
use crate::session::RetryingFtp;

/// Walks one host's entire FTP tree, streaming file records into a
/// [`FileIndex`] session scoped to that host.
pub struct Walker<'a> {
    ftp: RetryingFtp,
    index: &'a dyn FileIndex,
    ip: Ipv4Addr,
}

impl<'a> Walker<'a> {
    pub fn new(ftp: RetryingFtp, index: &'a dyn FileIndex, ip: Ipv4Addr) -> Self {
        Self { ftp, index, ip }
    }

    /// Runs the walk to completion. Returns `Ok(())` only if every
    /// directory was enumerated and the new snapshot was committed; any
    /// error leaves the host's previous snapshot untouched.
    pub async fn walk(mut self) -> Result<(), WalkError> {
        let mut sink = self.index.open_session_for_host(self.ip).await.map_err(WalkError::Store)?;

        let mut worklist: VecDeque<String> = VecDeque::new();
        worklist.push_back(String::new());

        while let Some(path) = worklist.pop_front() {
            let entries = match self.ftp.mlsd(&path).await {
                Ok(entries) => entries,
                Err(WalkError::PermissionDenied { path }) => {
                    warn!(ip = %self.ip, %path, "permission denied listing directory, skipping");
                    continue;
                },
                Err(err) => return Err(err),
            };

            let mut files = Vec::with_capacity(entries.len());
            for entry in entries {
                if entry.name.starts_with('.') {
                    continue;
                }

                let (decoded_path, decoded_name) = match decode_latin1(&path, &entry.name) {
                    Some(pair) => pair,
                    None => {
                        warn!(
                            ip = %self.ip, raw_path = %path, raw_name = %entry.name,
                            "dropping entry with undecodable name"
                        );
                        continue;
                    },
                };

                if entry.is_dir {
                    let child = if decoded_path.is_empty() {
                        decoded_name.clone()
                    } else {
                        format!("{decoded_path}/{decoded_name}")
                    };
                    worklist.push_back(child);
                } else {
                    files.push(FileRecord {
                        path: decoded_path,
                        name: decoded_name,
                        ip: self.ip,
                        size: entry.size,
                    });
                }
            }

            if !files.is_empty() {
                sink.append(files).await.map_err(WalkError::Store)?;
            }
        }

        sink.commit().await.map_err(WalkError::Store)?;
        debug!(ip = %self.ip, "walk committed");
        Ok(())
    }
}

/// The wire bytes are Latin-1; re-decode them as UTF-8 to recover the
/// original names on servers that advertise UTF-8 filenames over a
/// Latin-1-transparent control channel. Returns `None` if either
/// component isn't valid UTF-8 once re-decoded this way.
fn decode_latin1(path: &str, name: &str) -> Option<(String, String)> {
    let decoded_path = latin1_redecode(path)?;
    let decoded_name = latin1_redecode(name)?;
    Some((decoded_path, decoded_name))
}

fn latin1_redecode(s: &str) -> Option<String> {
    let bytes: Vec<u8> = s.chars().map(|c| {
        if (c as u32) <= 0xFF { Some(c as u8) } else { None }
    }).collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
