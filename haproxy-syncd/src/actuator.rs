use std::future::Future;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use crate::config::Mode;

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to print document: {0}")]
    Print(#[source] std::io::Error),
}

/// Hands a rendered document to the proxy.
pub trait Actuator {
    fn apply(&self, document: &str) -> impl Future<Output = Result<(), ApplyError>> + Send;
}

/// Overwrites the proxy config file and asks the proxy to reload.
#[derive(Debug, Clone)]
pub struct FileActuator {
    path: PathBuf,
    reload_command: Vec<String>,
}

impl FileActuator {
    pub fn new(path: impl Into<PathBuf>, reload_command: Vec<String>) -> Self {
        Self {
            path: path.into(),
            reload_command,
        }
    }

    /// Fire-and-forget: the reload outcome is never awaited or inspected.
    fn signal_reload(&self) {
        let Some((program, args)) = self.reload_command.split_first() else {
            tracing::warn!("No reload command configured, proxy not signalled");
            return;
        };

        match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_child) => {
                tracing::info!(command = ?self.reload_command, "Sent reload signal to proxy");
            }
            Err(e) => {
                tracing::warn!(command = ?self.reload_command, "Failed to send reload signal: {}", e);
            }
        }
    }
}

impl Actuator for FileActuator {
    async fn apply(&self, document: &str) -> Result<(), ApplyError> {
        // plain overwrite; the reload is only sent once the write returned
        tokio::fs::write(&self.path, document)
            .await
            .map_err(|source| ApplyError::Write {
                path: self.path.clone(),
                source,
            })?;
        tracing::info!(path = %self.path.display(), "Wrote updated config to file");

        self.signal_reload();
        Ok(())
    }
}

/// Print-only mode: the document goes to stdout, nothing else happens.
#[derive(Debug, Clone, Default)]
pub struct ConsoleActuator;

impl Actuator for ConsoleActuator {
    async fn apply(&self, document: &str) -> Result<(), ApplyError> {
        tracing::info!("Not in apply mode, printing config to console");
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(document.as_bytes())
            .and_then(|_| stdout.write_all(b"\n"))
            .and_then(|_| stdout.flush())
            .map_err(ApplyError::Print)
    }
}

/// Actuator picked from the configured mode.
#[derive(Debug, Clone)]
pub enum ProxyActuator {
    File(FileActuator),
    Console(ConsoleActuator),
}

impl ProxyActuator {
    /// Only [`Mode::Apply`] touches the config file or signals the proxy.
    pub fn for_mode(mode: Mode, path: impl Into<PathBuf>, reload_command: Vec<String>) -> Self {
        match mode {
            Mode::Apply => Self::File(FileActuator::new(path, reload_command)),
            Mode::Print => Self::Console(ConsoleActuator),
        }
    }
}

impl Actuator for ProxyActuator {
    async fn apply(&self, document: &str) -> Result<(), ApplyError> {
        match self {
            Self::File(actuator) => actuator.apply(document).await,
            Self::Console(actuator) => actuator.apply(document).await,
        }
    }
}
