//! MPV process detection, spawning and socket connection.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use super::connector::{Connector, MpvError};
use super::ipc::MpvIpc;

/// Delay between two connection attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Time given to an old instance to release its socket after `quit`.
const CLOSE_INSTANCE_GRACE: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("Failed to spawn MPV: {0}")]
  SpawnFailed(#[from] std::io::Error),
}

/// Find MPV executable in common locations.
pub fn find_mpv() -> Option<PathBuf> {
  if let Ok(path) = which::which("mpv") {
    return Some(path);
  }

  #[cfg(target_os = "macos")]
  let common_paths = [
    "/usr/local/bin/mpv",
    "/opt/homebrew/bin/mpv",
    "/Applications/mpv.app/Contents/MacOS/mpv",
  ];
  #[cfg(not(target_os = "macos"))]
  let common_paths = ["/usr/bin/mpv", "/usr/local/bin/mpv"];

  common_paths
    .into_iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

/// Find a youtube-dl compatible helper for MPV's ytdl hook.
pub fn find_ytdl() -> Option<PathBuf> {
  ["yt-dlp", "youtube-dl"]
    .into_iter()
    .find_map(|name| which::which(name).ok())
}

/// Everything needed to start MPV and reach its IPC socket.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
  pub mpv_path: PathBuf,
  pub ytdl_path: Option<PathBuf>,
  pub socket_path: PathBuf,
  pub retries: u32,
  pub user_agent: String,
  pub extra_args: Vec<String>,
}

impl LaunchOptions {
  /// Command-line arguments passed to MPV.
  pub fn args(&self) -> Vec<String> {
    let mut args = vec![
      "--idle".to_string(),
      "--keep-open".to_string(),
      "--no-terminal".to_string(),
      "--really-quiet".to_string(),
      "--no-input-terminal".to_string(),
      format!("--user-agent={}", self.user_agent),
      format!("--input-ipc-server={}", self.socket_path.display()),
    ];

    if let Some(ytdl) = &self.ytdl_path {
      args.push(format!("--script-opts=ytdl_hook-ytdl_path={}", ytdl.display()));
    }

    args.extend(self.extra_args.iter().cloned());
    args
  }
}

/// Spawn MPV detached, with its IPC server bound to the configured socket.
pub fn spawn_mpv(options: &LaunchOptions) -> Result<Child, ProcessError> {
  log::info!(
    "Spawning MPV: {:?} with IPC: {}",
    options.mpv_path,
    options.socket_path.display()
  );
  if !options.extra_args.is_empty() {
    log::info!("Extra MPV args: {:?}", options.extra_args);
  }

  let child = Command::new(&options.mpv_path)
    .args(options.args())
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()?;

  Ok(child)
}

/// Run `connect` up to `attempts` times, sleeping `delay` between failures.
///
/// Returns the number of the attempt that succeeded along with its value.
pub async fn connect_with_retry<T, E, F, Fut>(
  attempts: u32,
  delay: Duration,
  mut connect: F,
) -> Option<(u32, T)>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  for attempt in 1..=attempts {
    match connect().await {
      Ok(value) => return Some((attempt, value)),
      Err(e) => {
        log::debug!("IPC connect attempt {}/{} failed: {}", attempt, attempts, e);
        if attempt < attempts {
          tokio::time::sleep(delay).await;
        }
      }
    }
  }

  None
}

/// Connect to an MPV socket, retrying with a fixed backoff.
pub async fn connect(socket: &Path, retries: u32) -> Result<MpvIpc, MpvError> {
  match connect_with_retry(retries, CONNECT_RETRY_DELAY, || MpvIpc::connect(socket)).await {
    Some((attempt, ipc)) => {
      log::info!("Connected to MPV socket on attempt {}", attempt);
      Ok(ipc)
    }
    None => Err(MpvError::ConnectTimeout {
      socket: socket.to_path_buf(),
      attempts: retries,
    }),
  }
}

/// Start MPV and return a connector once its socket accepts connections.
pub async fn launch(options: &LaunchOptions) -> Result<Connector<MpvIpc>, MpvError> {
  let mut child = spawn_mpv(options)?;
  let ipc = match connect(&options.socket_path, options.retries).await {
    Ok(ipc) => ipc,
    Err(e) => {
      log::error!("MPV socket never became available, killing the process");
      if let Err(e) = child.kill() {
        log::debug!("kill() failed: {}", e);
      }
      reap_process(child);
      return Err(e);
    }
  };

  log::info!("MPV client connected");
  Ok(Connector::new(ipc, options.socket_path.clone()).with_process(child))
}

/// Wait for a child process on a blocking task and log its exit status.
pub(crate) fn reap_process(mut child: Child) -> JoinHandle<()> {
  tokio::task::spawn_blocking(move || match child.wait() {
    Ok(status) => log::info!("MPV process exited with: {}", status),
    Err(e) => log::error!("wait() failed: {}", e),
  })
}

/// Ask an MPV instance already listening on `socket` to quit.
pub async fn close_instances(socket: &Path, retries: u32) {
  let Ok(ipc) = connect(socket, retries).await else {
    return;
  };

  log::info!("Closing MPV instance on {}", socket.display());
  Connector::new(ipc, socket.to_path_buf()).mpv_stop(false).await;

  tokio::time::sleep(CLOSE_INSTANCE_GRACE).await;
}

/// Remove the IPC socket file, ignoring errors.
pub fn remove_socket(socket: &Path) -> bool {
  match std::fs::remove_file(socket) {
    Ok(()) => true,
    Err(e) => {
      log::debug!("Could not remove socket {}: {}", socket.display(), e);
      false
    }
  }
}
