//! Async IPC connection to MPV over its Unix socket.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::{MpvCommand, MpvEvent, MpvMessage, MpvResponse};
use super::transport::Transport;

#[derive(Error, Debug)]
pub enum IpcError {
  #[error("Connection failed: {0}")]
  ConnectionFailed(String),
  #[error("Write failed: {0}")]
  WriteFailed(#[from] std::io::Error),
  #[error("Serialization failed: {0}")]
  Serialize(#[from] serde_json::Error),
  #[error("Disconnected")]
  Disconnected,
}

/// Pending request waiting for response.
type PendingRequest = oneshot::Sender<MpvResponse>;

/// Writer channel message.
enum WriteMessage {
  Command(Vec<u8>),
  Close,
}

/// MPV IPC connection.
pub struct MpvIpc {
  pending: Arc<Mutex<HashMap<i64, PendingRequest>>>,
  write_tx: Sender<WriteMessage>,
  event_rx: Receiver<MpvEvent>,
  closed: CancellationToken,
  _reader_handle: JoinHandle<()>,
  _writer_handle: JoinHandle<()>,
}

impl MpvIpc {
  /// Open a connection to the socket (single attempt).
  #[cfg(unix)]
  pub async fn connect(path: &Path) -> Result<Self, IpcError> {
    let stream = tokio::net::UnixStream::connect(path)
      .await
      .map_err(|e| IpcError::ConnectionFailed(format!("{}: {}", path.display(), e)))?;

    let (reader, writer) = tokio::io::split(stream);
    Ok(Self::setup(reader, writer))
  }

  #[cfg(not(unix))]
  pub async fn connect(path: &Path) -> Result<Self, IpcError> {
    Err(IpcError::ConnectionFailed(format!(
      "{}: unix sockets are not supported on this platform",
      path.display()
    )))
  }

  fn setup<R, W>(reader: R, writer: W) -> Self
  where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
  {
    let pending = Arc::new(Mutex::new(HashMap::new()));
    let closed = CancellationToken::new();

    let (event_tx, event_rx) = async_channel::unbounded();
    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();

    let reader_pending = pending.clone();
    let reader_closed = closed.clone();
    let reader_handle = tokio::spawn(async move {
      Self::reader_loop(reader, reader_pending.clone(), event_tx).await;
      // Wake every caller still waiting for a response.
      reader_closed.cancel();
      reader_pending.lock().clear();
    });

    let writer_closed = closed.clone();
    let writer_handle = tokio::spawn(async move {
      Self::writer_loop(writer, write_rx).await;
      writer_closed.cancel();
    });

    Self {
      pending,
      write_tx,
      event_rx,
      closed,
      _reader_handle: reader_handle,
      _writer_handle: writer_handle,
    }
  }

  async fn reader_loop<R: tokio::io::AsyncRead + Unpin>(
    reader: R,
    pending: Arc<Mutex<HashMap<i64, PendingRequest>>>,
    event_tx: Sender<MpvEvent>,
  ) {
    log::debug!("MPV IPC reader loop started");
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
      line.clear();
      match buf_reader.read_line(&mut line).await {
        Ok(0) => {
          log::info!("MPV IPC connection closed");
          break;
        }
        Ok(_) => {
          let trimmed = line.trim();
          if trimmed.is_empty() {
            continue;
          }

          match MpvMessage::parse(trimmed) {
            Ok(MpvMessage::Response(response)) => {
              log::trace!("MPV reader: response for request_id={}", response.request_id);
              if let Some(tx) = pending.lock().remove(&response.request_id) {
                let _ = tx.send(response);
              }
            }
            Ok(MpvMessage::Event(event)) => {
              log::debug!("MPV reader: event {}", event.event);
              let _ = event_tx.send(event).await;
            }
            Err(e) => {
              log::warn!("Failed to parse MPV message: {} - {}", e, trimmed);
            }
          }
        }
        Err(e) => {
          log::error!("MPV IPC read error: {}", e);
          break;
        }
      }
    }
  }

  async fn writer_loop<W: tokio::io::AsyncWrite + Unpin>(
    mut writer: W,
    write_rx: Receiver<WriteMessage>,
  ) {
    log::debug!("MPV IPC writer loop started");

    while let Ok(msg) = write_rx.recv().await {
      match msg {
        WriteMessage::Command(mut data) => {
          data.push(b'\n');
          if let Err(e) = writer.write_all(&data).await {
            log::error!("MPV IPC write error: {}", e);
            break;
          }
          if let Err(e) = writer.flush().await {
            log::error!("MPV IPC flush error: {}", e);
            break;
          }
        }
        WriteMessage::Close => {
          log::debug!("MPV IPC writer closing");
          let _ = writer.shutdown().await;
          break;
        }
      }
    }
  }

  /// Send a command to MPV and wait for its response.
  ///
  /// There is no timeout: the call resolves when MPV answers or the
  /// connection goes away.
  pub async fn send_command(&self, cmd: MpvCommand) -> Result<MpvResponse, IpcError> {
    if self.closed.is_cancelled() {
      return Err(IpcError::Disconnected);
    }

    let request_id = cmd.request_id;
    let json = serde_json::to_string(&cmd)?;

    let (tx, rx) = oneshot::channel();
    self.pending.lock().insert(request_id, tx);

    log::debug!("Sending MPV command: {}", json);
    if self
      .write_tx
      .send(WriteMessage::Command(json.into_bytes()))
      .await
      .is_err()
    {
      self.pending.lock().remove(&request_id);
      return Err(IpcError::Disconnected);
    }

    tokio::select! {
      biased;
      result = rx => result.map_err(|_| IpcError::Disconnected),
      _ = self.closed.cancelled() => {
        self.pending.lock().remove(&request_id);
        Err(IpcError::Disconnected)
      }
    }
  }
}

impl Transport for MpvIpc {
  async fn send(&self, cmd: MpvCommand) -> Result<MpvResponse, IpcError> {
    self.send_command(cmd).await
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
    let _ = self.write_tx.try_send(WriteMessage::Close);
    self.closed.cancel();
  }
}
