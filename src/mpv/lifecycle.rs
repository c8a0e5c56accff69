//! Detection of MPV exiting on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::connector::Connector;
use super::process::remove_socket;
use super::transport::Transport;

/// Process-wide shutdown signal. Fires at most once.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
  token: CancellationToken,
  fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fire the signal. Returns `false` if it had already been fired.
  pub fn fire(&self) -> bool {
    if self.fired.swap(true, Ordering::SeqCst) {
      return false;
    }
    self.token.cancel();
    true
  }

  pub fn is_fired(&self) -> bool {
    self.fired.load(Ordering::SeqCst)
  }

  /// Wait until the signal fires.
  pub async fn wait(&self) {
    self.token.cancelled().await
  }
}

/// How the MPV connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
  /// The application asked MPV to quit.
  Requested,
  /// MPV exited or dropped the socket by itself.
  Unexpected,
}

/// Wait for the connection to close and tear the application down if
/// nobody asked for it.
pub async fn watch_exit<T: Transport>(connector: Arc<Connector<T>>, shutdown: ShutdownSignal) -> ExitKind {
  connector.wait_until_closed().await;

  if !shutdown.fire() {
    log::debug!("MPV connection closed after shutdown request");
    return ExitKind::Requested;
  }

  connector.reap();
  remove_socket(connector.socket_path());
  log::warn!("MPV has exited");

  ExitKind::Unexpected
}
