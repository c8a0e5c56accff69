//! Player session - owns the MPV connector and its background tasks.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::mpv::{
  launch, run_event_listener, watch_exit, Connector, ExitKind, LaunchOptions, MpvError, MpvIpc,
  ShutdownSignal, Transport,
};

/// MPV's own quit bindings, removed so the player window cannot close it
/// behind the application's back.
const QUIT_KEYS: [&str; 3] = ["q", "Ctrl+q", "Shift+q"];

/// A running MPV instance and the tasks that follow it.
pub struct PlayerSession<T: Transport = MpvIpc> {
  connector: Arc<Connector<T>>,
  shutdown: ShutdownSignal,
  listener: JoinHandle<()>,
  monitor: JoinHandle<()>,
  watcher: JoinHandle<ExitKind>,
}

impl PlayerSession<MpvIpc> {
  /// Start MPV, connect to it and begin following its events.
  pub async fn start(options: &LaunchOptions) -> Result<Self, MpvError> {
    let connector = launch(options).await?;
    let session = Self::attach(connector);

    for key in QUIT_KEYS {
      if let Err(e) = session.connector.unbind_key(key).await {
        log::warn!("Failed to unbind {}: {}", key, e);
      }
    }

    Ok(session)
  }
}

impl<T: Transport> PlayerSession<T> {
  /// Spawn the event listener, playback monitor and exit watcher for a
  /// connected player.
  pub fn attach(connector: Connector<T>) -> Self {
    let connector = Arc::new(connector);
    let shutdown = ShutdownSignal::new();

    let listener = tokio::spawn(run_event_listener(
      connector.transport().clone(),
      connector.monitor().clone(),
    ));

    let monitor = tokio::spawn({
      let monitor = connector.monitor().clone();
      async move { monitor.run().await }
    });

    let watcher = tokio::spawn(watch_exit(connector.clone(), shutdown.clone()));

    Self {
      connector,
      shutdown,
      listener,
      monitor,
      watcher,
    }
  }

  pub fn connector(&self) -> &Arc<Connector<T>> {
    &self.connector
  }

  /// Titles of entries that failed to play.
  pub fn errors(&self) -> flume::Receiver<String> {
    self.connector.errors()
  }

  /// Signal fired exactly once when the application must tear down.
  pub fn shutdown_signal(&self) -> ShutdownSignal {
    self.shutdown.clone()
  }

  /// Application-initiated stop. Does nothing if shutdown already started.
  pub async fn stop(&self, remove_socket: bool) {
    if !self.shutdown.fire() {
      log::debug!("Shutdown already in progress");
      return;
    }

    self.connector.mpv_stop(remove_socket).await;
    self.connector.close();
  }

  /// Wait for every background task and report how MPV went away.
  pub async fn join(self) -> ExitKind {
    let exit = self.watcher.await.unwrap_or_else(|e| {
      log::error!("Exit watcher failed: {}", e);
      ExitKind::Requested
    });

    if let Err(e) = self.listener.await {
      log::error!("Event listener failed: {}", e);
    }
    if let Err(e) = self.monitor.await {
      log::error!("Playback monitor failed: {}", e);
    }

    exit
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mpv::{MpvEvent, MpvError};
  use crate::mpv::transport::fake::FakeTransport;
  use std::path::PathBuf;

  fn session_with_socket(socket: PathBuf) -> PlayerSession<FakeTransport> {
    PlayerSession::attach(Connector::new(FakeTransport::new(), socket))
  }

  #[tokio::test]
  async fn test_failed_load_is_reported() {
    let session = session_with_socket(PathBuf::from("/tmp/invplay-session.sock"));
    let errors = session.errors();
    let connector = session.connector().clone();

    connector.load_file("Song A", 180, &["a.m4a"]).await.unwrap();
    connector
      .transport()
      .push_event(MpvEvent {
        event: "start-file".into(),
        playlist_entry_id: Some(7),
        ..Default::default()
      })
      .await;

    // Wait for the listener to bind the entry.
    while connector.monitor().title(7).is_none() {
      tokio::task::yield_now().await;
    }
    assert_eq!(connector.monitor().entries().len(), 1);

    let reader = tokio::spawn(async move { errors.recv_async().await });
    tokio::task::yield_now().await;
    connector
      .transport()
      .push_event(MpvEvent {
        event: "end-file".into(),
        playlist_entry_id: Some(7),
        reason: Some("error".into()),
        file_error: Some("unrecognized file format".into()),
        ..Default::default()
      })
      .await;

    assert_eq!(reader.await.unwrap().unwrap(), "Song A");
    assert!(connector.monitor().entries().is_empty());

    session.stop(false).await;
    assert_eq!(session.join().await, ExitKind::Requested);
  }

  #[tokio::test]
  async fn test_stop_is_requested_exit() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("mpv.sock");
    std::fs::write(&socket, b"").unwrap();

    let session = session_with_socket(socket.clone());
    let connector = session.connector().clone();
    session.stop(true).await;
    session.stop(true).await;

    assert_eq!(connector.transport().sent_names(), vec!["quit"]);
    assert!(!socket.exists());
    assert!(matches!(connector.play().await, Err(MpvError::ConnectionClosed)));
    assert_eq!(session.join().await, ExitKind::Requested);
  }

  #[tokio::test]
  async fn test_player_exit_fires_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("mpv.sock");
    std::fs::write(&socket, b"").unwrap();

    let session = session_with_socket(socket.clone());
    let shutdown = session.shutdown_signal();
    session
      .connector()
      .transport()
      .push_event(MpvEvent {
        event: "shutdown".into(),
        ..Default::default()
      })
      .await;

    shutdown.wait().await;
    // The UI reacting to the signal must not trigger a second teardown.
    session.stop(true).await;

    assert!(session.connector().transport().sent().is_empty());
    assert_eq!(session.join().await, ExitKind::Unexpected);
    assert!(!socket.exists());
  }
}
