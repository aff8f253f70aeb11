//! Soft-signal handling: first delivery requests graceful shutdown, a
//! second delivery of any configured signal aborts the process
//! immediately (§6.4).

use tracing::{info, warn};

use crate::daemon::ShutdownHandle;

/// Installs handlers for every name in `soft_signals` and drives
/// `shutdown` on first delivery. Runs until the process exits (either via
/// a second signal delivery, which calls [`std::process::exit`] directly,
/// or when `shutdown_handle` is dropped after the daemon stops on its
/// own).
pub async fn watch_for_shutdown(soft_signals: &[String], shutdown: ShutdownHandle) {
    #[cfg(unix)]
    {
        let mut listeners = Vec::new();
        for name in soft_signals {
            match unix_signal_kind(name) {
                Some(kind) => match tokio::signal::unix::signal(kind) {
                    Ok(listener) => listeners.push((name.clone(), listener)),
                    Err(err) => warn!(signal = %name, error = %err, "failed to install signal handler"),
                },
                None => warn!(signal = %name, "unrecognized signal name, ignoring"),
            }
        }

        if listeners.is_empty() {
            return;
        }

        wait_for_first(&mut listeners).await;
        info!("received shutdown signal, stopping gracefully (a second delivery will force-exit)");
        shutdown.request_stop();

        wait_for_first(&mut listeners).await;
        warn!("received a second shutdown signal, aborting immediately");
        std::process::exit(1);
    }

    #[cfg(not(unix))]
    {
        let _ = (soft_signals, shutdown);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_first(listeners: &mut [(String, tokio::signal::unix::Signal)]) {
    use futures::future::select_all;

    let futures = listeners.iter_mut().map(|(_, listener)| Box::pin(listener.recv()));
    select_all(futures).await;
}

#[cfg(unix)]
fn unix_signal_kind(name: &str) -> Option<tokio::signal::unix::SignalKind> {
    use tokio::signal::unix::SignalKind;
    match name.trim().to_uppercase().as_str() {
        "SIGINT" => Some(SignalKind::interrupt()),
        "SIGTERM" => Some(SignalKind::terminate()),
        "SIGHUP" => Some(SignalKind::hangup()),
        "SIGQUIT" => Some(SignalKind::quit()),
        _ => None,
    }
}
