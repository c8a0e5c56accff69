//! Transport abstraction over the MPV IPC connection.

use std::future::Future;

use async_channel::Receiver;

use super::ipc::IpcError;
use super::protocol::{MpvCommand, MpvEvent, MpvResponse};

/// A live request/response + event channel to one MPV process.
pub trait Transport: Send + Sync + 'static {
  /// Send a command and wait for its response.
  fn send(&self, cmd: MpvCommand) -> impl Future<Output = Result<MpvResponse, IpcError>> + Send;

  /// Receiver for unsolicited events, in delivery order.
  fn events(&self) -> Receiver<MpvEvent>;

  /// Whether the connection is known to be closed.
  fn is_closed(&self) -> bool;

  /// Resolves once the connection is closed, locally or by the peer.
  fn closed(&self) -> impl Future<Output = ()> + Send;

  /// Close the connection.
  fn close(&self);
}

#[cfg(test)]
pub(crate) mod fake {
  use std::collections::{HashMap, HashSet};

  use async_channel::{Receiver, Sender};
  use parking_lot::Mutex;
  use serde_json::Value;
  use tokio_util::sync::CancellationToken;

  use super::*;

  /// In-memory transport that records commands and answers from a property table.
  pub(crate) struct FakeTransport {
    sent: Mutex<Vec<Vec<Value>>>,
    properties: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    event_tx: Sender<MpvEvent>,
    event_rx: Receiver<MpvEvent>,
    closed: CancellationToken,
  }

  impl FakeTransport {
    pub(crate) fn new() -> Self {
      let (event_tx, event_rx) = async_channel::unbounded();
      Self {
        sent: Mutex::new(Vec::new()),
        properties: Mutex::new(HashMap::new()),
        failing: Mutex::new(HashSet::new()),
        event_tx,
        event_rx,
        closed: CancellationToken::new(),
      }
    }

    pub(crate) fn set_property(&self, name: &str, value: Value) {
      self.properties.lock().insert(name.to_string(), value);
    }

    /// Make every command with this name fail.
    pub(crate) fn fail_command(&self, name: &str) {
      self.failing.lock().insert(name.to_string());
    }

    pub(crate) fn sent(&self) -> Vec<Vec<Value>> {
      self.sent.lock().clone()
    }

    pub(crate) fn sent_names(&self) -> Vec<String> {
      self
        .sent
        .lock()
        .iter()
        .filter_map(|c| c.first().and_then(Value::as_str).map(str::to_string))
        .collect()
    }

    pub(crate) fn clear_sent(&self) {
      self.sent.lock().clear();
    }

    pub(crate) async fn push_event(&self, event: MpvEvent) {
      let _ = self.event_tx.send(event).await;
    }

    fn respond(&self, cmd: &MpvCommand) -> MpvResponse {
      let ok = |data: Option<Value>| MpvResponse {
        error: "success".into(),
        data,
        request_id: cmd.request_id,
      };
      let err = |msg: &str| MpvResponse {
        error: msg.into(),
        data: None,
        request_id: cmd.request_id,
      };

      if self.failing.lock().contains(cmd.name()) {
        return err("error running command");
      }

      let property = cmd.command.get(1).and_then(Value::as_str).unwrap_or("");
      match cmd.name() {
        "get_property" => match self.properties.lock().get(property) {
          Some(value) => ok(Some(value.clone())),
          None => err("property unavailable"),
        },
        "get_property_string" => match self.properties.lock().get(property) {
          Some(Value::String(s)) => ok(Some(Value::String(s.clone()))),
          Some(value) => ok(Some(Value::String(value.to_string()))),
          None => err("property unavailable"),
        },
        "set_property" => {
          let value = cmd.command.get(2).cloned().unwrap_or(Value::Null);
          self.properties.lock().insert(property.to_string(), value);
          ok(None)
        }
        _ => ok(None),
      }
    }
  }

  impl Transport for FakeTransport {
    async fn send(&self, cmd: MpvCommand) -> Result<MpvResponse, IpcError> {
      if self.closed.is_cancelled() {
        return Err(IpcError::Disconnected);
      }
      self.sent.lock().push(cmd.command.clone());
      // A socket round trip always suspends the caller.
      tokio::task::yield_now().await;
      Ok(self.respond(&cmd))
    }

    fn events(&self) -> Receiver<MpvEvent> {
      self.event_rx.clone()
    }

    fn is_closed(&self) -> bool {
      self.closed.is_cancelled()
    }

    async fn closed(&self) {
      self.closed.cancelled().await
    }

    fn close(&self) {
      self.closed.cancel();
      self.event_tx.close();
    }
  }
}
