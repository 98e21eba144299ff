//! Unix socket control commands

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::meter::Meter;
use crate::socket;

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Invalid gain '{0}', expected dB such as +5 or -1")]
    InvalidGain(String),
}

/// IPC command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IpcCommand {
    Toggle,
    Start,
    Stop,
    /// Raise or lower the reading by this many dB
    Gain(f64),
    Status,
    Quit,
}

impl FromStr for IpcCommand {
    type Err = CommandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(CommandError::Empty);
        };

        let command = match verb.to_lowercase().as_str() {
            "toggle" => Self::Toggle,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "status" => Self::Status,
            "quit" | "exit" | "shutdown" => Self::Quit,
            "gain" => {
                let arg = words.next().unwrap_or_default();
                let arg = arg.strip_suffix("dB").or_else(|| arg.strip_suffix("db")).unwrap_or(arg);
                match arg.parse::<f64>() {
                    Ok(delta) if delta.is_finite() => Self::Gain(delta),
                    _ => return Err(CommandError::InvalidGain(arg.to_string())),
                }
            }
            _ => return Err(CommandError::Unknown(s.trim().to_string())),
        };

        if words.next().is_some() {
            return Err(CommandError::Unknown(s.trim().to_string()));
        }
        Ok(command)
    }
}

/// Run one command against the meter and produce the reply
pub async fn execute(meter: &Meter, command: IpcCommand) -> String {
    let result = match command {
        IpcCommand::Toggle => meter.toggle().await,
        IpcCommand::Start => meter.start().await.map(|_| "Capture started".to_string()),
        IpcCommand::Stop => meter.stop().await.map(|_| "Capture stopped".to_string()),
        IpcCommand::Gain(delta) => {
            let offset = meter.adjust_gain(delta);
            Ok(format!("Calibration offset {:+.1} dB", offset))
        }
        IpcCommand::Status => serde_json::to_string(&meter.status()).context("Failed to encode status"),
        IpcCommand::Quit => {
            info!("Received quit command");
            meter.request_shutdown();
            Ok("Shutting down".to_string())
        }
    };

    result.unwrap_or_else(|e| format!("Error: {:#}", e))
}

/// Unix socket IPC server
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    meter: Arc<Meter>,
}

impl IpcServer {
    /// Bind the control socket, replacing a stale one
    pub fn new<P: AsRef<Path>>(socket_path: P, meter: Arc<Meter>) -> Result<Self> {
        let path = socket_path.as_ref().to_path_buf();
        socket::prepare_socket_dir(&path)?;
        let _ = std::fs::remove_file(&path);

        let listener = UnixListener::bind(&path)
            .with_context(|| format!("Failed to bind Unix socket {}", path.display()))?;
        socket::secure_socket_permissions(&path)?;

        info!("IPC server listening on {}", path.display());

        Ok(Self {
            listener,
            path,
            meter,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until the listener fails
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .context("Failed to accept connection")?;

            let meter = Arc::clone(&self.meter);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, meter).await {
                    warn!("IPC connection error: {:#}", e);
                }
            });
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Handle a single IPC connection
pub async fn handle_connection(mut stream: UnixStream, meter: Arc<Meter>) -> Result<()> {
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await?;

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    debug!("Received IPC command: {}", request.trim());

    let response = match request.parse::<IpcCommand>() {
        Ok(command) => execute(&meter, command).await,
        Err(e) => format!("Error: {}", e),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("toggle".parse::<IpcCommand>(), Ok(IpcCommand::Toggle));
        assert_eq!(" START\n".parse::<IpcCommand>(), Ok(IpcCommand::Start));
        assert_eq!("stop".parse::<IpcCommand>(), Ok(IpcCommand::Stop));
        assert_eq!("status".parse::<IpcCommand>(), Ok(IpcCommand::Status));
        assert_eq!("exit".parse::<IpcCommand>(), Ok(IpcCommand::Quit));
    }

    #[test]
    fn test_parse_gain() {
        assert_eq!("gain +5".parse::<IpcCommand>(), Ok(IpcCommand::Gain(5.0)));
        assert_eq!("gain -1".parse::<IpcCommand>(), Ok(IpcCommand::Gain(-1.0)));
        assert_eq!("gain 0.5dB".parse::<IpcCommand>(), Ok(IpcCommand::Gain(0.5)));
        assert_eq!(
            "gain".parse::<IpcCommand>(),
            Err(CommandError::InvalidGain(String::new()))
        );
        assert_eq!(
            "gain loud".parse::<IpcCommand>(),
            Err(CommandError::InvalidGain("loud".to_string()))
        );
        assert!("gain inf".parse::<IpcCommand>().is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_and_extra_words() {
        assert_eq!("".parse::<IpcCommand>(), Err(CommandError::Empty));
        assert!(matches!(
            "record".parse::<IpcCommand>(),
            Err(CommandError::Unknown(_))
        ));
        assert!("stop now".parse::<IpcCommand>().is_err());
    }
}
