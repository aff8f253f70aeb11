//! Single-host FTP-login probe (§4.2).
//!
//! Deliberately does not use a full FTP client: a probe only needs to know
//! whether `USER`/`PASS` yields a `230` reply, and it must be cleanly
//! cancellable when it overruns `scan_timeout` — something a blocking FTP
//! session handed to a thread pool cannot offer. A bare line-oriented
//! read over the wire gives both.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub port: u16,
    pub user: String,
    pub passwd: String,
    pub timeout: Duration,
}

/// Probes a single address for an anonymous/authenticated FTP login.
pub struct Prober<'a> {
    config: &'a ProberConfig,
}

impl<'a> Prober<'a> {
    pub fn new(config: &'a ProberConfig) -> Self {
        Self { config }
    }

    /// Returns `true` iff the server replied `230` to `PASS`. Any timeout,
    /// refusal, or permanent negative reply (first digit `5`) yields
    /// `false`. Always attempts `QUIT` before returning, success or not.
    pub async fn probe(&self, ip: std::net::Ipv4Addr) -> bool {
        match timeout(self.config.timeout, self.probe_inner(ip)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                debug!(%ip, "probe timed out");
                false
            },
        }
    }

    async fn probe_inner(&self, ip: std::net::Ipv4Addr) -> bool {
        let addr = (ip, self.config.port);
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(err) => {
                debug!(%ip, error = %err, "connection failed");
                return false;
            },
        };

        let mut reader = BufReader::new(stream);

        // Greeting
        if read_reply(&mut reader).await.is_none() {
            return false;
        }

        if send_line(&mut reader, &format!("USER {}", self.config.user)).await.is_err() {
            return false;
        }
        let user_reply = match read_reply(&mut reader).await {
            Some(code) => code,
            None => return false,
        };
        if is_permanent_negative(user_reply) {
            let _ = quit(&mut reader).await;
            return false;
        }

        if send_line(&mut reader, &format!("PASS {}", self.config.passwd)).await.is_err() {
            return false;
        }
        let pass_reply = match read_reply(&mut reader).await {
            Some(code) => code,
            None => return false,
        };

        let ok = pass_reply == 230;
        let _ = quit(&mut reader).await;
        ok
    }
}

fn is_permanent_negative(code: u32) -> bool {
    code / 100 == 5
}

async fn send_line(stream: &mut BufReader<TcpStream>, line: &str) -> std::io::Result<()> {
    let inner = stream.get_mut();
    inner.write_all(format!("{line}\r\n").as_bytes()).await
}

async fn quit(stream: &mut BufReader<TcpStream>) -> std::io::Result<()> {
    send_line(stream, "QUIT").await?;
    let _ = read_reply(stream).await;
    stream.get_mut().shutdown().await
}

/// Reads reply lines until one whose 4th character is not `-` (i.e. not a
/// continuation line), returning its 3-digit code. Returns `None` on EOF,
/// I/O error, or a malformed line.
async fn read_reply(stream: &mut BufReader<TcpStream>) -> Option<u32> {
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await.ok()?;
        if n == 0 {
            return None;
        }
        let bytes = line.as_bytes();
        if bytes.len() < 4 || !bytes[..3].iter().all(u8::is_ascii_digit) {
            return None;
        }
        let code: u32 = line[..3].parse().ok()?;
        if bytes[3] == b'-' {
            continue; // multi-line reply, keep reading until the final line
        }
        return Some(code);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn spawn_scripted_server(replies: Vec<&'static str>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            for reply in replies {
                socket.write_all(reply.as_bytes()).await.unwrap();
                // drain whatever the client sends before the next reply
                let mut buf = [0u8; 256];
                let _ = tokio::time::timeout(Duration::from_millis(50), socket.read(&mut buf))
                    .await;
            }
        });
        addr
    }

    fn config(port: u16) -> ProberConfig {
        ProberConfig {
            port,
            user: "anonymous".into(),
            passwd: "a@b.com".into(),
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn successful_login_returns_true() {
        let addr = spawn_scripted_server(vec![
            "220 welcome\r\n",
            "331 need password\r\n",
            "230 logged in\r\n",
            "221 bye\r\n",
        ])
        .await;
        let cfg = config(addr.port());
        let prober = Prober::new(&cfg);
        assert!(prober.probe(std::net::Ipv4Addr::new(127, 0, 0, 1)).await);
    }

    #[tokio::test]
    async fn permanent_negative_on_user_returns_false() {
        let addr = spawn_scripted_server(vec!["220 welcome\r\n", "530 not anonymous\r\n"]).await;
        let cfg = config(addr.port());
        let prober = Prober::new(&cfg);
        assert!(!prober.probe(std::net::Ipv4Addr::new(127, 0, 0, 1)).await);
    }

    #[tokio::test]
    async fn multiline_greeting_is_skipped() {
        let addr = spawn_scripted_server(vec![
            "220-part one\r\n",
            "220 part two\r\n",
            "331 need password\r\n",
            "230 logged in\r\n",
            "221 bye\r\n",
        ])
        .await;
        let cfg = config(addr.port());
        let prober = Prober::new(&cfg);
        assert!(prober.probe(std::net::Ipv4Addr::new(127, 0, 0, 1)).await);
    }

    #[tokio::test]
    async fn connection_refused_returns_false() {
        // Nothing listening on this port.
        let cfg = config(1);
        let prober = Prober::new(&cfg);
        assert!(!prober.probe(std::net::Ipv4Addr::new(127, 0, 0, 1)).await);
    }

    #[tokio::test]
    async fn unresponsive_server_times_out_and_returns_false() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            // never writes a greeting
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let mut cfg = config(addr.port());
        cfg.timeout = Duration::from_millis(100);
        let prober = Prober::new(&cfg);
        let start = tokio::time::Instant::now();
        assert!(!prober.probe(std::net::Ipv4Addr::new(127, 0, 0, 1)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
