//! MPV IPC module - spawns and controls an external MPV player via JSON IPC.
//!
//! Architecture:
//! - `process.rs` - MPV binary detection, spawning and connect-with-retry
//! - `ipc.rs` - Async Unix socket connection with request/response matching
//! - `transport.rs` - Trait the connector is written against
//! - `protocol.rs` - JSON command/response/event types
//! - `connector.rs` - Typed command/query facade
//! - `monitor.rs` - Maps playlist entries to titles and reports failed loads
//! - `listener.rs` - Event loop feeding the monitor
//! - `lifecycle.rs` - Shutdown signal and unexpected-exit detection

mod connector;
mod ipc;
mod lifecycle;
mod listener;
mod monitor;
mod process;
mod protocol;
pub(crate) mod transport;

pub use connector::{Connector, LoopMode, MediaKind, MpvError};
pub use ipc::{IpcError, MpvIpc};
pub use lifecycle::{watch_exit, ExitKind, ShutdownSignal};
pub use listener::run_event_listener;
pub use monitor::{PlaybackMonitor, Ticket, MONITOR_QUEUE_CAPACITY, PLAYLIST_ENTRY_TITLE};
pub use process::{
  close_instances, connect, find_mpv, find_ytdl, launch, remove_socket, LaunchOptions,
  ProcessError, CONNECT_RETRY_DELAY,
};
pub use protocol::{MpvCommand, MpvEvent, MpvResponse, PlayerEvent};
pub use transport::Transport;
