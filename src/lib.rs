//! Control of an external MPV player over its JSON IPC socket.
//!
//! A [`PlayerSession`] launches MPV, exposes the [`mpv::Connector`] command
//! surface, reports entries that failed to play and signals when MPV exits
//! on its own.

pub mod config;
pub mod mpv;
mod session;

pub use config::{ConfigError, PlayerConfig};
pub use session::PlayerSession;

/// Install the `env_logger` backend. `RUST_LOG` overrides `default_level`.
pub fn init_logging(default_level: &str) {
  let env = env_logger::Env::default().default_filter_or(default_level);
  if let Err(e) = env_logger::Builder::from_env(env)
    .format_timestamp_millis()
    .try_init()
  {
    log::debug!("Logger already installed: {}", e);
  }
}
