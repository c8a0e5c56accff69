//! Correlates loaded titles with MPV playlist entry ids and reports failed loads.
//!
//! Loads announce their title on a pending queue before the load command is
//! sent, since MPV may emit `start-file` before its reply is read. When MPV
//! reports that an entry started, the oldest pending title is bound to that
//! entry's id. When an entry ends with an error, its title is handed to a
//! reader currently waiting on the notice channel.
//!
//! Matching is FIFO: if several loads are in flight before their entries
//! start, titles are assigned in announcement order, which can pair a title
//! with the wrong entry when MPV starts them out of order.

use std::collections::{HashMap, VecDeque};

use async_channel::TrySendError;
use parking_lot::Mutex;

/// Capacity of the pending-title and failed-entry queues.
pub const MONITOR_QUEUE_CAPACITY: usize = 100;

/// Title announced for entries queued through a playlist file.
pub const PLAYLIST_ENTRY_TITLE: &str = "playlist entry";

/// Handle on an announced title, used to withdraw it if the load fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Default)]
struct MonitorState {
  entries: HashMap<i64, String>,
  pending: VecDeque<(Ticket, String)>,
  next_ticket: u64,
}

pub struct PlaybackMonitor {
  state: Mutex<MonitorState>,
  failed_tx: async_channel::Sender<i64>,
  failed_rx: async_channel::Receiver<i64>,
  notice_tx: Mutex<Option<flume::Sender<String>>>,
  notice_rx: flume::Receiver<String>,
}

impl Default for PlaybackMonitor {
  fn default() -> Self {
    Self::new()
  }
}

impl PlaybackMonitor {
  pub fn new() -> Self {
    let (failed_tx, failed_rx) = async_channel::bounded(MONITOR_QUEUE_CAPACITY);
    // Rendezvous: a notice only goes through to a reader already waiting.
    let (notice_tx, notice_rx) = flume::bounded(0);

    Self {
      state: Mutex::new(MonitorState::default()),
      failed_tx,
      failed_rx,
      notice_tx: Mutex::new(Some(notice_tx)),
      notice_rx,
    }
  }

  /// Receiver for titles of entries that failed to play.
  pub fn notices(&self) -> flume::Receiver<String> {
    self.notice_rx.clone()
  }

  /// Queue a title for the next entry MPV starts.
  ///
  /// Returns `None` when the queue is full and the title was dropped.
  pub fn announce(&self, title: &str) -> Option<Ticket> {
    let mut state = self.state.lock();
    if state.pending.len() >= MONITOR_QUEUE_CAPACITY {
      log::debug!("Monitor: pending queue full, dropping title {:?}", title);
      return None;
    }

    let ticket = Ticket(state.next_ticket);
    state.next_ticket += 1;
    state.pending.push_back((ticket, title.to_string()));
    Some(ticket)
  }

  /// Take back a title whose load never reached MPV.
  pub fn withdraw(&self, ticket: Ticket) {
    self.state.lock().pending.retain(|(t, _)| *t != ticket);
  }

  /// Bind the oldest pending title to `entry_id`.
  pub fn file_started(&self, entry_id: i64) {
    let mut state = self.state.lock();
    if let Some((_, title)) = state.pending.pop_front() {
      log::debug!("Monitor: entry {} is {:?}", entry_id, title);
      state.entries.insert(entry_id, title);
    }
  }

  /// Report that `entry_id` failed to play.
  pub fn file_failed(&self, entry_id: i64) {
    if let Err(TrySendError::Full(_)) = self.failed_tx.try_send(entry_id) {
      log::debug!("Monitor: failure queue full, dropping entry {}", entry_id);
    }
  }

  /// Forget every tracked entry and every pending title.
  pub fn clear(&self) {
    let mut state = self.state.lock();
    state.pending.clear();
    state.entries.clear();
  }

  /// Title tracked for `entry_id`, if any.
  pub fn title(&self, entry_id: i64) -> Option<String> {
    self.state.lock().entries.get(&entry_id).cloned()
  }

  /// Snapshot of every tracked entry.
  pub fn entries(&self) -> HashMap<i64, String> {
    self.state.lock().entries.clone()
  }

  /// Number of titles waiting for an entry id.
  pub fn pending(&self) -> usize {
    self.state.lock().pending.len()
  }

  /// Drain the failure queue until [`PlaybackMonitor::close`] is called.
  pub async fn run(&self) {
    log::debug!("Playback monitor started");

    while let Ok(entry_id) = self.failed_rx.recv().await {
      let title = self.state.lock().entries.remove(&entry_id);
      let Some(title) = title else {
        log::debug!("Monitor: untracked entry {} failed", entry_id);
        continue;
      };

      log::warn!("Unable to play {:?}", title);
      let delivered = match self.notice_tx.lock().as_ref() {
        Some(tx) => tx.try_send(title).is_ok(),
        None => false,
      };
      if !delivered {
        log::debug!("Monitor: no reader for failure notice, dropped");
      }
    }

    log::debug!("Playback monitor stopped");
  }

  /// Stop the monitor and disconnect the notice channel.
  pub fn close(&self) {
    self.failed_tx.close();
    self.notice_tx.lock().take();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  fn spawn_run(monitor: &Arc<PlaybackMonitor>) -> tokio::task::JoinHandle<()> {
    let monitor = monitor.clone();
    tokio::spawn(async move { monitor.run().await })
  }

  #[test]
  fn test_titles_bind_in_announcement_order() {
    let monitor = PlaybackMonitor::new();
    monitor.announce("Song A");
    monitor.announce("Song B");

    monitor.file_started(7);
    monitor.file_started(8);

    assert_eq!(monitor.title(7).as_deref(), Some("Song A"));
    assert_eq!(monitor.title(8).as_deref(), Some("Song B"));
    assert_eq!(monitor.pending(), 0);
  }

  #[test]
  fn test_start_without_pending_title_is_untracked() {
    let monitor = PlaybackMonitor::new();
    monitor.file_started(3);
    assert!(monitor.entries().is_empty());
  }

  #[test]
  fn test_rapid_loads_can_mismatch() {
    // Known limitation: MPV starting "B" first still receives "A".
    let monitor = PlaybackMonitor::new();
    monitor.announce("A");
    monitor.announce("B");
    monitor.file_started(2);
    assert_eq!(monitor.title(2).as_deref(), Some("A"));
  }

  #[test]
  fn test_pending_queue_drops_when_full() {
    let monitor = PlaybackMonitor::new();
    for i in 0..MONITOR_QUEUE_CAPACITY {
      assert!(monitor.announce(&format!("title {}", i)).is_some());
    }
    assert!(monitor.announce("one too many").is_none());
    assert_eq!(monitor.pending(), MONITOR_QUEUE_CAPACITY);
  }

  #[test]
  fn test_withdrawn_title_is_not_bound() {
    let monitor = PlaybackMonitor::new();
    let failed = monitor.announce("never loaded").unwrap();
    monitor.announce("Song B");

    monitor.withdraw(failed);
    monitor.file_started(4);

    assert_eq!(monitor.title(4).as_deref(), Some("Song B"));
    assert_eq!(monitor.pending(), 0);
  }

  #[test]
  fn test_clear_drops_entries_and_pending_titles() {
    let monitor = PlaybackMonitor::new();
    monitor.announce("old 1");
    monitor.file_started(1);
    monitor.announce("old 2");

    monitor.clear();
    monitor.file_started(2);

    assert!(monitor.entries().is_empty());
    assert_eq!(monitor.pending(), 0);
  }

  #[tokio::test]
  async fn test_failed_entry_reaches_waiting_reader() {
    let monitor = Arc::new(PlaybackMonitor::new());
    let task = spawn_run(&monitor);
    let notices = monitor.notices();
    let reader = tokio::spawn(async move { notices.recv_async().await });
    tokio::task::yield_now().await;

    monitor.announce("Song A");
    monitor.file_started(7);
    monitor.file_failed(7);

    assert_eq!(reader.await.unwrap().unwrap(), "Song A");
    assert_eq!(monitor.title(7), None);

    monitor.close();
    task.await.unwrap();
    assert!(monitor.notices().recv_async().await.is_err());
  }

  #[tokio::test]
  async fn test_notice_without_reader_is_dropped() {
    let monitor = Arc::new(PlaybackMonitor::new());
    let notices = monitor.notices();
    let task = spawn_run(&monitor);

    monitor.announce("Old Song");
    monitor.file_started(1);
    monitor.file_failed(1);
    while !monitor.entries().is_empty() {
      tokio::task::yield_now().await;
    }
    tokio::task::yield_now().await;

    // Nobody was waiting when the failure was processed.
    assert!(matches!(notices.try_recv(), Err(flume::TryRecvError::Empty)));

    monitor.close();
    task.await.unwrap();
    assert!(notices.recv_async().await.is_err());
  }
}
