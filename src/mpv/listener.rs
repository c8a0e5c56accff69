//! MPV event listener feeding the playback monitor.

use std::sync::Arc;

use super::monitor::PlaybackMonitor;
use super::protocol::PlayerEvent;
use super::transport::Transport;

/// Dispatch MPV events to the monitor until MPV shuts down or the
/// connection drops, then close both.
pub async fn run_event_listener<T: Transport>(transport: Arc<T>, monitor: Arc<PlaybackMonitor>) {
  let events = transport.events();
  log::info!("MPV event listener started");

  while let Ok(event) = events.recv().await {
    match PlayerEvent::from(event) {
      PlayerEvent::StartFile {
        entry_id: Some(id),
      } => monitor.file_started(id),
      event @ PlayerEvent::EndFile { .. } => {
        log::debug!("MPV {:?}", event);
        if let Some(id) = event.failed_entry() {
          monitor.file_failed(id);
        }
      }
      PlayerEvent::Shutdown => {
        log::info!("MPV is shutting down");
        break;
      }
      PlayerEvent::StartFile { entry_id: None } | PlayerEvent::Other(_) => {}
    }
  }

  log::info!("MPV event listener stopped");
  transport.close();
  monitor.close();
}
