//! MPV JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// Global request ID counter for unique command identification.
static REQUEST_ID: AtomicI64 = AtomicI64::new(1);

/// Generate a unique request ID for MPV commands.
pub fn next_request_id() -> i64 {
  REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Command sent to MPV via IPC.
#[derive(Debug, Clone, Serialize)]
pub struct MpvCommand {
  pub command: Vec<Value>,
  pub request_id: i64,
}

impl MpvCommand {
  /// Create a new command with auto-generated request ID.
  pub fn new(args: Vec<Value>) -> Self {
    Self {
      command: args,
      request_id: next_request_id(),
    }
  }

  /// Command name (first positional argument).
  pub fn name(&self) -> &str {
    self.command.first().and_then(Value::as_str).unwrap_or("")
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::new(vec!["get_property".into(), name.into()])
  }

  /// Get a property value formatted as a string.
  pub fn get_property_string(name: &str) -> Self {
    Self::new(vec!["get_property_string".into(), name.into()])
  }

  /// Set a property value.
  pub fn set_property(name: &str, value: Value) -> Self {
    Self::new(vec!["set_property".into(), name.into(), value])
  }

  /// Append a file to the playlist with per-entry options.
  pub fn loadfile(url: &str, flags: &str, options: &str) -> Self {
    Self::new(vec![
      "loadfile".into(),
      url.into(),
      flags.into(),
      options.into(),
    ])
  }

  /// Load a playlist file.
  pub fn loadlist(path: &str, flags: &str) -> Self {
    Self::new(vec!["loadlist".into(), path.into(), flags.into()])
  }

  /// Seek relative to the current position, in seconds.
  pub fn seek_relative(offset: i64) -> Self {
    Self::new(vec!["seek".into(), offset.into()])
  }

  /// Seek to a percentage of the file.
  pub fn seek_percent(percent: i64) -> Self {
    Self::new(vec!["seek".into(), percent.into(), "absolute-percent".into()])
  }

  /// Cycle (toggle) a property.
  pub fn cycle(property: &str) -> Self {
    Self::new(vec!["cycle".into(), property.into()])
  }

  /// Bind a key to a command ("" unbinds it).
  pub fn keybind(key: &str, command: &str) -> Self {
    Self::new(vec!["keybind".into(), key.into(), command.into()])
  }

  /// Quit MPV.
  pub fn quit() -> Self {
    Self::new(vec!["quit".into()])
  }
}

/// Response from MPV for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
  /// "success" or error message.
  pub error: String,
  /// Response data (command-specific).
  #[serde(default)]
  pub data: Option<Value>,
  /// Matching request ID.
  #[serde(default)]
  pub request_id: i64,
}

impl MpvResponse {
  /// Check if the command succeeded.
  pub fn is_success(&self) -> bool {
    self.error == "success"
  }
}

/// Raw event sent by MPV.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MpvEvent {
  /// Event type (e.g., "start-file", "end-file", "shutdown").
  pub event: String,
  /// Playlist entry the event refers to (start-file/end-file).
  #[serde(default)]
  pub playlist_entry_id: Option<i64>,
  /// Reason for end-file events (e.g., "eof", "stop", "quit", "error").
  #[serde(default)]
  pub reason: Option<String>,
  /// Error description for end-file events that failed to play.
  #[serde(default)]
  pub file_error: Option<String>,
}

/// Events the player session reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
  /// A playlist entry started loading.
  StartFile { entry_id: Option<i64> },
  /// A playlist entry stopped; `error` is set when it failed to play.
  EndFile {
    entry_id: Option<i64>,
    reason: Option<String>,
    error: Option<String>,
  },
  /// The player is about to exit.
  Shutdown,
  /// Anything else (property changes, idle, seek...).
  Other(String),
}

impl PlayerEvent {
  /// Entry id of an end-file event that reported a playback error.
  pub fn failed_entry(&self) -> Option<i64> {
    match self {
      PlayerEvent::EndFile {
        entry_id: Some(id),
        error: Some(error),
        ..
      } if !error.is_empty() => Some(*id),
      _ => None,
    }
  }
}

impl From<MpvEvent> for PlayerEvent {
  fn from(event: MpvEvent) -> Self {
    match event.event.as_str() {
      "start-file" => PlayerEvent::StartFile {
        entry_id: event.playlist_entry_id,
      },
      "end-file" => PlayerEvent::EndFile {
        entry_id: event.playlist_entry_id,
        reason: event.reason,
        error: event.file_error,
      },
      "shutdown" => PlayerEvent::Shutdown,
      _ => PlayerEvent::Other(event.event),
    }
  }
}

/// Message received from MPV IPC (either response or event).
#[derive(Debug, Clone)]
pub enum MpvMessage {
  Response(MpvResponse),
  Event(MpvEvent),
}

impl MpvMessage {
  /// Parse a JSON line from MPV.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("event").is_some() {
      Ok(MpvMessage::Event(serde_json::from_value(value)?))
    } else {
      Ok(MpvMessage::Response(serde_json::from_value(value)?))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_loadfile_serialization() {
    let cmd = MpvCommand::loadfile("a.m4a", "append-play", "length=180");
    let json = serde_json::to_string(&cmd).unwrap();
    assert!(json.contains(r#"["loadfile","a.m4a","append-play","length=180"]"#));
    assert!(json.contains("request_id"));
    assert_eq!(cmd.name(), "loadfile");
  }

  #[test]
  fn test_request_ids_are_unique() {
    let a = MpvCommand::quit();
    let b = MpvCommand::quit();
    assert_ne!(a.request_id, b.request_id);
  }

  #[test]
  fn test_error_response_parsing() {
    let json = r#"{"request_id":4,"error":"property unavailable"}"#;
    match MpvMessage::parse(json).unwrap() {
      MpvMessage::Response(r) => {
        assert!(!r.is_success());
        assert_eq!(r.request_id, 4);
        assert!(r.data.is_none());
      }
      _ => panic!("Expected response"),
    }
  }

  #[test]
  fn test_end_file_event_parsing() {
    let json = r#"{"event":"end-file","reason":"error","playlist_entry_id":7,"file_error":"loading failed"}"#;
    let MpvMessage::Event(event) = MpvMessage::parse(json).unwrap() else {
      panic!("Expected event");
    };
    let event = PlayerEvent::from(event);
    assert_eq!(
      event,
      PlayerEvent::EndFile {
        entry_id: Some(7),
        reason: Some("error".into()),
        error: Some("loading failed".into()),
      }
    );
    assert_eq!(event.failed_entry(), Some(7));
  }

  #[test]
  fn test_end_file_without_error_is_not_a_failure() {
    let json = r#"{"event":"end-file","reason":"eof","playlist_entry_id":3,"file_error":""}"#;
    let MpvMessage::Event(event) = MpvMessage::parse(json).unwrap() else {
      panic!("Expected event");
    };
    assert_eq!(PlayerEvent::from(event).failed_entry(), None);
  }

  #[test]
  fn test_event_kinds() {
    let start = MpvEvent {
      event: "start-file".into(),
      playlist_entry_id: Some(2),
      ..Default::default()
    };
    assert_eq!(
      PlayerEvent::from(start),
      PlayerEvent::StartFile { entry_id: Some(2) }
    );

    let shutdown = MpvEvent {
      event: "shutdown".into(),
      ..Default::default()
    };
    assert_eq!(PlayerEvent::from(shutdown), PlayerEvent::Shutdown);

    // Property-change payloads are not kept.
    let json = r#"{"event":"property-change","name":"pause","data":true}"#;
    let MpvMessage::Event(event) = MpvMessage::parse(json).unwrap() else {
      panic!("Expected event");
    };
    assert_eq!(PlayerEvent::from(event), PlayerEvent::Other("property-change".into()));

    let idle = MpvEvent {
      event: "idle".into(),
      ..Default::default()
    };
    assert_eq!(PlayerEvent::from(idle), PlayerEvent::Other("idle".into()));
  }
}
