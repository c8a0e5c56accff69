//! Command/query facade over an MPV connection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use super::ipc::IpcError;
use super::monitor::{PlaybackMonitor, PLAYLIST_ENTRY_TITLE};
use super::process::{reap_process, remove_socket, ProcessError};
use super::protocol::{MpvCommand, MpvResponse};
use super::transport::Transport;

#[derive(Error, Debug)]
pub enum MpvError {
  #[error("Could not start MPV: {0}")]
  Launch(#[from] ProcessError),
  #[error("Could not connect to socket {} after {attempts} attempts", .socket.display())]
  ConnectTimeout { socket: PathBuf, attempts: u32 },
  #[error("Connection closed")]
  ConnectionClosed,
  #[error("Unable to load {0}")]
  Load(String),
  #[error("IPC error: {0}")]
  Ipc(IpcError),
  #[error("MPV command failed: {0}")]
  CommandFailed(String),
}

impl From<IpcError> for MpvError {
  fn from(e: IpcError) -> Self {
    match e {
      IpcError::Disconnected => MpvError::ConnectionClosed,
      e => MpvError::Ipc(e),
    }
  }
}

/// Repeat setting, mirrored from `loop-file` and `loop-playlist`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopMode {
  #[default]
  None,
  File,
  Playlist,
}

impl LoopMode {
  /// Mode selected by the next `cycle_loop` call.
  pub fn next(self) -> Self {
    match self {
      LoopMode::None => LoopMode::File,
      LoopMode::File => LoopMode::Playlist,
      LoopMode::Playlist => LoopMode::None,
    }
  }

  /// Values for (`loop-file`, `loop-playlist`).
  pub fn flags(self) -> (&'static str, &'static str) {
    match self {
      LoopMode::None => ("no", "no"),
      LoopMode::File => ("yes", "no"),
      LoopMode::Playlist => ("no", "yes"),
    }
  }

  /// Short status-bar label.
  pub fn label(self) -> &'static str {
    match self {
      LoopMode::None => "",
      LoopMode::File => "R-F",
      LoopMode::Playlist => "R-P",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Audio,
  Video,
}

impl fmt::Display for MediaKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MediaKind::Audio => f.write_str("Audio"),
      MediaKind::Video => f.write_str("Video"),
    }
  }
}

/// Quote a value for an MPV key=value option list.
fn quote_option(value: &str) -> String {
  format!("%{}%{}", value.len(), value)
}

fn is_enabled(value: &str) -> bool {
  matches!(value, "yes" | "inf")
}

/// Typed command surface over one MPV connection.
///
/// Queries never fail: they fall back to a neutral value when MPV cannot
/// answer. Mutators only report a closed connection. Loads report every
/// failure since the user has to know a file was not queued.
pub struct Connector<T: Transport> {
  transport: Arc<T>,
  monitor: Arc<PlaybackMonitor>,
  loop_mode: tokio::sync::Mutex<LoopMode>,
  socket_path: PathBuf,
  process: Mutex<Option<Child>>,
}

impl<T: Transport> Connector<T> {
  pub fn new(transport: T, socket_path: PathBuf) -> Self {
    Self {
      transport: Arc::new(transport),
      monitor: Arc::new(PlaybackMonitor::new()),
      loop_mode: tokio::sync::Mutex::new(LoopMode::None),
      socket_path,
      process: Mutex::new(None),
    }
  }

  /// Attach the MPV child process so it is reaped on stop.
  pub fn with_process(self, child: Child) -> Self {
    *self.process.lock() = Some(child);
    self
  }

  pub fn transport(&self) -> &Arc<T> {
    &self.transport
  }

  pub fn monitor(&self) -> &Arc<PlaybackMonitor> {
    &self.monitor
  }

  pub fn socket_path(&self) -> &Path {
    &self.socket_path
  }

  /// Titles of entries that failed to play.
  pub fn errors(&self) -> flume::Receiver<String> {
    self.monitor.notices()
  }

  /// Check if MPV has exited.
  pub fn is_closed(&self) -> bool {
    self.transport.is_closed()
  }

  /// Wait until the connection is closed.
  pub async fn wait_until_closed(&self) {
    self.transport.closed().await
  }

  /// Close the connection without asking MPV to quit.
  pub fn close(&self) {
    self.transport.close();
  }

  async fn send(&self, cmd: MpvCommand) -> Result<MpvResponse, MpvError> {
    if self.is_closed() {
      return Err(MpvError::ConnectionClosed);
    }

    let response = self.transport.send(cmd).await?;
    if !response.is_success() {
      return Err(MpvError::CommandFailed(response.error));
    }

    Ok(response)
  }

  /// Send a command, logging and discarding anything but a closed connection.
  async fn fire(&self, cmd: MpvCommand) -> Result<(), MpvError> {
    let name = cmd.name().to_string();
    match self.send(cmd).await {
      Ok(_) => Ok(()),
      Err(MpvError::ConnectionClosed) => Err(MpvError::ConnectionClosed),
      Err(e) => {
        log::debug!("MPV {} failed: {}", name, e);
        Ok(())
      }
    }
  }

  /// Send an arbitrary command to MPV.
  pub async fn call(&self, args: Vec<Value>) -> Result<Option<Value>, MpvError> {
    Ok(self.send(MpvCommand::new(args)).await?.data)
  }

  /// Get a property value.
  pub async fn get(&self, property: &str) -> Result<Value, MpvError> {
    let response = self.send(MpvCommand::get_property(property)).await?;
    Ok(response.data.unwrap_or(Value::Null))
  }

  /// Get a property formatted as a string.
  pub async fn get_string(&self, property: &str) -> Result<String, MpvError> {
    let response = self.send(MpvCommand::get_property_string(property)).await?;
    match response.data {
      Some(Value::String(s)) => Ok(s),
      _ => Err(MpvError::CommandFailed(format!("{} is not set", property))),
    }
  }

  /// Set a property value.
  pub async fn set(&self, property: &str, value: impl Into<Value>) -> Result<(), MpvError> {
    self
      .send(MpvCommand::set_property(property, value.into()))
      .await?;
    Ok(())
  }

  async fn get_bool(&self, property: &str) -> bool {
    match self.get(property).await {
      Ok(value) => value.as_bool().unwrap_or(false),
      Err(_) => false,
    }
  }

  async fn get_int(&self, property: &str) -> i64 {
    match self.get(property).await {
      Ok(value) => value.as_f64().map(|n| n as i64).unwrap_or(0),
      Err(_) => 0,
    }
  }

  // --- queries ---

  /// Check if MPV is paused.
  pub async fn is_paused(&self) -> bool {
    self.get_bool("pause").await
  }

  /// Check if the playlist is shuffled.
  pub async fn is_shuffle(&self) -> bool {
    self.get_bool("shuffle").await
  }

  /// Check if an already loaded file has finished playback.
  pub async fn is_eof(&self) -> bool {
    self.get_bool("eof-reached").await
  }

  /// Check if MPV is currently idle.
  pub async fn is_idle(&self) -> bool {
    self.get_bool("core-idle").await
  }

  /// Whether the current file has a video track.
  pub async fn media_type(&self) -> MediaKind {
    match self.get("height").await {
      Ok(_) => MediaKind::Video,
      Err(_) => MediaKind::Audio,
    }
  }

  /// Loop setting as reported by MPV.
  pub async fn loop_type(&self) -> LoopMode {
    let Ok(file) = self.get_string("loop-file").await else {
      return LoopMode::None;
    };
    let Ok(playlist) = self.get_string("loop-playlist").await else {
      return LoopMode::None;
    };

    if is_enabled(&file) {
      LoopMode::File
    } else if is_enabled(&playlist) {
      LoopMode::Playlist
    } else {
      LoopMode::None
    }
  }

  /// Current position in the file, in seconds.
  pub async fn time_position(&self) -> i64 {
    self.get_int("playback-time").await
  }

  /// Total duration of the file, in seconds.
  ///
  /// Streams often report no duration until fully probed; the `length`
  /// option given at load time is used instead.
  pub async fn duration(&self) -> i64 {
    if let Ok(value) = self.get("duration").await {
      if let Some(duration) = value.as_f64() {
        return duration as i64;
      }
    }

    match self.get("options/length").await {
      Ok(Value::String(s)) => s.trim().parse().unwrap_or(0),
      Ok(value) => value.as_f64().map(|n| n as i64).unwrap_or(0),
      Err(_) => 0,
    }
  }

  /// Current playlist as a JSON string.
  pub async fn playlist_data(&self) -> String {
    self.get_string("playlist").await.unwrap_or_default()
  }

  /// Total amount of entries in the playlist.
  pub async fn playlist_count(&self) -> i64 {
    self.get_int("playlist-count").await
  }

  /// Index of the entry being played.
  pub async fn playlist_pos(&self) -> i64 {
    self.get_int("playlist-playing-pos").await
  }

  /// Title of the playlist entry, or its filename when it has none.
  pub async fn playlist_title(&self, pos: i64) -> String {
    if let Ok(title) = self.get_string(&format!("playlist/{}/title", pos)).await {
      return title;
    }
    if let Ok(file) = self.get_string(&format!("playlist/{}/filename", pos)).await {
      return file;
    }
    "-".to_string()
  }

  // --- loads ---

  /// Append a file to the playlist with its title and duration.
  ///
  /// With two files, the first is the video and the second is attached as
  /// its external audio track. A `duration` of zero or less means unknown
  /// and sets no `length` option.
  pub async fn load_file(&self, title: &str, duration: i64, files: &[&str]) -> Result<(), MpvError> {
    if self.is_closed() {
      return Err(MpvError::ConnectionClosed);
    }
    let Some(file) = files.first() else {
      return Err(MpvError::Load(title.to_string()));
    };

    let mut options = format!("title={}", quote_option(title));
    if duration > 0 {
      options.push_str(&format!(",length={}", duration));
    }
    if let [_, audio] = files {
      options.push_str(&format!(",audio-file={}", quote_option(audio)));
    }

    log::info!("Loading {:?}", title);
    // MPV can emit start-file before the reply is read, so queue first.
    let ticket = self.monitor.announce(title);
    if let Err(e) = self
      .send(MpvCommand::loadfile(file, "append-play", &options))
      .await
    {
      log::error!("Failed to load {:?}: {}", title, e);
      if let Some(ticket) = ticket {
        self.monitor.withdraw(ticket);
      }
      return Err(MpvError::Load(title.to_string()));
    }

    Ok(())
  }

  /// Load a playlist file, appending to or replacing the current playlist.
  pub async fn load_playlist(&self, path: &str, replace: bool) -> Result<(), MpvError> {
    if self.is_closed() {
      return Err(MpvError::ConnectionClosed);
    }

    let flags = if replace {
      self.monitor.clear();
      "replace"
    } else {
      "append-play"
    };

    log::info!("Loading playlist {} ({})", path, flags);
    let ticket = self.monitor.announce(PLAYLIST_ENTRY_TITLE);
    if let Err(e) = self.send(MpvCommand::loadlist(path, flags)).await {
      log::error!("Failed to load playlist {}: {}", path, e);
      if let Some(ticket) = ticket {
        self.monitor.withdraw(ticket);
      }
      return Err(MpvError::Load(path.to_string()));
    }

    Ok(())
  }

  // --- mutators ---

  /// Start the playback.
  pub async fn play(&self) -> Result<(), MpvError> {
    self.fire(MpvCommand::set_property("pause", "no".into())).await
  }

  /// Stop the playback.
  pub async fn stop(&self) -> Result<(), MpvError> {
    self.fire(MpvCommand::new(vec!["stop".into()])).await
  }

  /// Seek one second forward.
  pub async fn seek_forward(&self) -> Result<(), MpvError> {
    self.fire(MpvCommand::seek_relative(1)).await
  }

  /// Seek one second backward.
  pub async fn seek_backward(&self) -> Result<(), MpvError> {
    self.fire(MpvCommand::seek_relative(-1)).await
  }

  /// Play the next item in the playlist.
  pub async fn next(&self) -> Result<(), MpvError> {
    self.fire(MpvCommand::new(vec!["playlist-next".into()])).await
  }

  /// Play the previous item in the playlist.
  pub async fn prev(&self) -> Result<(), MpvError> {
    self.fire(MpvCommand::new(vec!["playlist-prev".into()])).await
  }

  /// Toggle between pause and play.
  ///
  /// A file paused at its end restarts from the beginning.
  pub async fn cycle_paused(&self) -> Result<(), MpvError> {
    if self.is_eof().await && self.is_paused().await {
      self.fire(MpvCommand::seek_percent(0)).await?;
    }

    self.fire(MpvCommand::cycle("pause")).await
  }

  /// Toggle the playlist's shuffle state.
  pub async fn cycle_shuffle(&self) -> Result<(), MpvError> {
    self.fire(MpvCommand::cycle("shuffle")).await
  }

  /// Rotate none -> file -> playlist -> none and return the new mode.
  ///
  /// Concurrent calls are serialized so MPV and the local mode never diverge.
  pub async fn cycle_loop(&self) -> Result<LoopMode, MpvError> {
    if self.is_closed() {
      return Err(MpvError::ConnectionClosed);
    }

    let mut current = self.loop_mode.lock().await;
    let mode = current.next();
    let (file, playlist) = mode.flags();
    self
      .fire(MpvCommand::set_property("loop-file", file.into()))
      .await?;
    self
      .fire(MpvCommand::set_property("loop-playlist", playlist.into()))
      .await?;

    *current = mode;
    Ok(mode)
  }

  /// Set the playlist position.
  pub async fn set_playlist_pos(&self, pos: i64) -> Result<(), MpvError> {
    self
      .fire(MpvCommand::set_property("playlist-pos", pos.into()))
      .await
  }

  /// Delete an entry from the playlist.
  pub async fn playlist_delete(&self, entry: i64) -> Result<(), MpvError> {
    self
      .fire(MpvCommand::new(vec!["playlist-remove".into(), entry.into()]))
      .await
  }

  /// Move an entry to a different index in the playlist.
  pub async fn playlist_move(&self, from: i64, to: i64) -> Result<(), MpvError> {
    self
      .fire(MpvCommand::new(vec![
        "playlist-move".into(),
        from.into(),
        to.into(),
      ]))
      .await
  }

  /// Clear the playlist and forget every tracked entry.
  pub async fn playlist_clear(&self) -> Result<(), MpvError> {
    let result = self.fire(MpvCommand::new(vec!["playlist-clear".into()])).await;
    self.monitor.clear();
    result
  }

  /// Jump to the last playlist entry and play it.
  pub async fn playlist_play_latest(&self) -> Result<(), MpvError> {
    let count = self.playlist_count().await;
    self.set_playlist_pos(count - 1).await?;
    self.play().await
  }

  /// Remove an MPV key binding.
  pub async fn unbind_key(&self, key: &str) -> Result<(), MpvError> {
    self.fire(MpvCommand::keybind(key, "")).await
  }

  // --- shutdown ---

  /// Ask MPV to quit, optionally removing the socket file.
  pub async fn mpv_stop(&self, remove_socket_file: bool) {
    if self.is_closed() {
      return;
    }

    log::info!("Stopping MPV");
    if let Err(e) = self.send(MpvCommand::quit()).await {
      log::debug!("MPV quit: {}", e);
    }
    self.reap();

    if remove_socket_file {
      remove_socket(&self.socket_path);
    }
  }

  /// Collect the exit status of the spawned process, if we own one.
  pub fn reap(&self) {
    if let Some(child) = self.process.lock().take() {
      reap_process(child);
    }
  }
}
