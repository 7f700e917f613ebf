//! Host-side capabilities the dispatch engine drives.
//!
//! Each capability is a trait so the engine can be exercised with the
//! recording doubles in [`super::mock`]. The system implementations are
//! fire-and-forget: they start the work and return without waiting for it.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::keys::KeyToken;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Key injection failed: {0}")]
    Injection(String),

    #[error("Failed to launch '{target}': {source}")]
    Launch {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open URL '{url}': {source}")]
    OpenUrl {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Key injection service
pub trait KeyInjector: Send + Sync {
    /// Press every key in order, then release them in reverse order
    fn press_and_release(&self, keys: &[KeyToken]) -> Result<(), ActionError>;

    /// Type literal text
    fn type_text(&self, text: &str) -> Result<(), ActionError>;
}

/// Process launch service
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, command: &str) -> Result<(), ActionError>;
}

/// URL open service
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), ActionError>;
}

/// Injector that only reports what it would press.
///
/// Used when no OS injection backend is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogKeyInjector;

impl KeyInjector for LogKeyInjector {
    fn press_and_release(&self, keys: &[KeyToken]) -> Result<(), ActionError> {
        log::info!("Key chord: {:?}", keys);
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), ActionError> {
        log::info!("Type text: {:?}", text);
        Ok(())
    }
}

/// How an `exe:` target gets started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// Existing absolute path, executed directly
    Direct(PathBuf),
    /// Name or command line resolved by the host shell
    Shell(String),
}

impl LaunchTarget {
    pub fn resolve(command: &str) -> Self {
        let trimmed = command.trim().trim_matches('"');
        let path = Path::new(trimmed);
        if path.is_absolute() && path.exists() {
            LaunchTarget::Direct(path.to_path_buf())
        } else {
            LaunchTarget::Shell(trimmed.to_string())
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    #[cfg(target_os = "windows")]
    fn shell_command(command: &str) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", "", command]);
        cmd
    }

    #[cfg(not(target_os = "windows"))]
    fn shell_command(command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, command: &str) -> Result<(), ActionError> {
        let target = LaunchTarget::resolve(command);
        let mut cmd = match &target {
            LaunchTarget::Direct(path) => Command::new(path),
            LaunchTarget::Shell(line) => Self::shell_command(line),
        };

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ActionError::Launch {
                target: command.to_string(),
                source,
            })?;
        log::info!("Launched {:?} (pid {})", target, child.id());

        // reap in the background so the child never lingers as a zombie
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUrlOpener;

impl UrlOpener for SystemUrlOpener {
    fn open(&self, url: &str) -> Result<(), ActionError> {
        open::that_detached(url).map_err(|source| ActionError::OpenUrl {
            url: url.to_string(),
            source,
        })?;
        log::info!("Opened {}", url);
        Ok(())
    }
}
