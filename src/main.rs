use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use invplay::mpv::{close_instances, ExitKind};
use invplay::{init_logging, PlayerConfig, PlayerSession};

/// Play media through MPV and report files that fail to load.
#[derive(Debug, Parser)]
#[command(name = "invplay", version)]
struct Cli {
  /// Config file (defaults to <config dir>/invplay/config.json).
  #[arg(long, env = "INVPLAY_CONFIG")]
  config: Option<PathBuf>,

  /// MPV IPC socket path.
  #[arg(long)]
  socket: Option<PathBuf>,

  /// Ask an MPV instance already bound to the socket to quit first.
  #[arg(long)]
  close_instances: bool,

  /// Files or URLs to queue.
  files: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  let config_path = match cli.config.clone().map(Ok).unwrap_or_else(PlayerConfig::default_path) {
    Ok(path) => path,
    Err(e) => {
      eprintln!("{}", e);
      return ExitCode::FAILURE;
    }
  };
  let mut config = match PlayerConfig::load(&config_path) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{}", e);
      return ExitCode::FAILURE;
    }
  };
  if let Some(socket) = &cli.socket {
    config.socket_path = Some(socket.display().to_string());
  }

  init_logging(&config.log_level);

  let options = match config.launch_options() {
    Ok(options) => options,
    Err(e) => {
      log::error!("{}", e);
      return ExitCode::FAILURE;
    }
  };

  if cli.close_instances {
    close_instances(&options.socket_path, 1).await;
  }

  let session = match PlayerSession::start(&options).await {
    Ok(session) => session,
    Err(e) => {
      log::error!("{}", e);
      return ExitCode::FAILURE;
    }
  };

  let connector = session.connector().clone();
  for file in &cli.files {
    if let Err(e) = connector.load_file(file, 0, &[file.as_str()]).await {
      log::error!("{}", e);
    }
  }

  let errors = session.errors();
  let shutdown = session.shutdown_signal();
  loop {
    tokio::select! {
      title = errors.recv_async() => match title {
        Ok(title) => log::error!("Unable to play {}", title),
        Err(_) => break,
      },
      _ = shutdown.wait() => break,
      _ = tokio::signal::ctrl_c() => {
        session.stop(true).await;
        break;
      }
    }
  }

  match session.join().await {
    ExitKind::Requested => ExitCode::SUCCESS,
    ExitKind::Unexpected => ExitCode::FAILURE,
  }
}
