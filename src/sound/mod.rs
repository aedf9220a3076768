//! Sound effect playback
//!
//! Hands the file to the platform's command-line player. Starting the
//! player is synchronous; the returned [`Playback`] is awaited elsewhere so
//! the child is always reaped and its exit status checked.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::debug;

/// Errors that can occur when starting or finishing playback
#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("sound file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}")]
    Exited {
        program: &'static str,
        status: ExitStatus,
    },

    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Something that can play the configured sound effect
pub trait SoundPlayer: Send + Sync {
    fn play(&self) -> Result<Playback, SoundError>;
}

/// A started playback
#[derive(Debug)]
pub struct Playback {
    child: Option<(Child, &'static str)>,
}

impl Playback {
    /// A playback with no process behind it
    pub fn finished() -> Self {
        Self { child: None }
    }

    /// Process id of the player, if one is still running
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|(child, _)| child.id())
    }

    /// Wait for the player to exit; a non-zero exit is an error
    pub async fn wait(self) -> Result<(), SoundError> {
        let Some((mut child, program)) = self.child else {
            return Ok(());
        };

        let status = child
            .wait()
            .await
            .map_err(|source| SoundError::Wait { program, source })?;
        if status.success() {
            Ok(())
        } else {
            Err(SoundError::Exited { program, status })
        }
    }
}

#[cfg(target_os = "macos")]
const PLAYER_PROGRAM: &str = "afplay";
#[cfg(not(target_os = "macos"))]
const PLAYER_PROGRAM: &str = "paplay";

/// Plays a file by spawning `afplay` (macOS) or `paplay` (elsewhere)
///
/// Must be called from within the tokio runtime.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    path: PathBuf,
    program: &'static str,
}

impl CommandPlayer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            program: PLAYER_PROGRAM,
        }
    }

    #[cfg(test)]
    pub fn with_program(path: impl Into<PathBuf>, program: &'static str) -> Self {
        Self {
            path: path.into(),
            program,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SoundPlayer for CommandPlayer {
    fn play(&self) -> Result<Playback, SoundError> {
        if !self.path.is_file() {
            return Err(SoundError::FileNotFound(self.path.clone()));
        }

        let child = Command::new(self.program)
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SoundError::Spawn {
                program: self.program,
                source,
            })?;

        debug!(pid = child.id(), program = self.program, "sound playback started");
        Ok(Playback {
            child: Some((child, self.program)),
        })
    }
}
