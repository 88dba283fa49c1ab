use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::alert::synth::encode_wav;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio resource unavailable: {0}")]
    Unavailable(String),

    #[error("playback rejected: {0}")]
    Rejected(String),
}

/// A sounding voice. Stopping must be immediate and idempotent.
pub trait Voice: Send {
    fn stop(&mut self);
}

pub trait AudioOutput: Send + Sync {
    /// Plays a prepared audio resource on loop until the voice is stopped.
    fn play_resource(&self, path: &Path) -> Result<Box<dyn Voice>, AudioError>;

    /// Plays a short PCM buffer once.
    fn play_pcm(&self, samples: &[f32], sample_rate: u32) -> Result<Box<dyn Voice>, AudioError>;
}

/// Output used when no player is configured: resources are unavailable and
/// synthesized beats are only logged.
#[derive(Debug, Default)]
pub struct SilentOutput;

struct SilentVoice;

impl Voice for SilentVoice {
    fn stop(&mut self) {}
}

impl AudioOutput for SilentOutput {
    fn play_resource(&self, path: &Path) -> Result<Box<dyn Voice>, AudioError> {
        Err(AudioError::Unavailable(format!(
            "no player configured for {}",
            path.display()
        )))
    }

    fn play_pcm(&self, samples: &[f32], sample_rate: u32) -> Result<Box<dyn Voice>, AudioError> {
        debug!(samples = samples.len(), sample_rate, "alert beat (silent output)");
        Ok(Box::new(SilentVoice))
    }
}

/// Drives an external player program (`aplay`, `paplay`, `afplay`, ...), one
/// child process per voice. Children are killed when the voice stops.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    player: String,
    scratch_dir: PathBuf,
}

impl CommandOutput {
    pub fn new(player: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            player: player.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.player);
        command
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

struct LoopVoice(Option<JoinHandle<()>>);

impl Voice for LoopVoice {
    fn stop(&mut self) {
        if let Some(task) = self.0.take() {
            task.abort();
        }
    }
}

struct ChildVoice(Option<Child>);

impl Voice for ChildVoice {
    fn stop(&mut self) {
        if let Some(mut child) = self.0.take() {
            let _ = child.start_kill();
        }
    }
}

impl AudioOutput for CommandOutput {
    fn play_resource(&self, path: &Path) -> Result<Box<dyn Voice>, AudioError> {
        if !path.is_file() {
            return Err(AudioError::Unavailable(path.display().to_string()));
        }

        // Probe once so a broken player surfaces as a rejection instead of a
        // silently respawning loop.
        let first = self
            .command(path)
            .spawn()
            .map_err(|err| AudioError::Rejected(err.to_string()))?;

        let output = self.clone();
        let path = path.to_path_buf();
        let task = tokio::spawn(async move {
            let mut child = first;
            loop {
                if let Err(err) = child.wait().await {
                    warn!(error = %err, "alert player failed");
                    return;
                }
                child = match output.command(&path).spawn() {
                    Ok(child) => child,
                    Err(err) => {
                        warn!(error = %err, "alert player could not be restarted");
                        return;
                    }
                };
            }
        });

        Ok(Box::new(LoopVoice(Some(task))))
    }

    fn play_pcm(&self, samples: &[f32], sample_rate: u32) -> Result<Box<dyn Voice>, AudioError> {
        let path = self.scratch_dir.join("alert-beat.wav");
        if !path.is_file() {
            std::fs::create_dir_all(&self.scratch_dir)
                .and_then(|_| std::fs::write(&path, encode_wav(samples, sample_rate)))
                .map_err(|err| AudioError::Unavailable(err.to_string()))?;
        }

        let child = self
            .command(&path)
            .spawn()
            .map_err(|err| AudioError::Rejected(err.to_string()))?;
        Ok(Box::new(ChildVoice(Some(child))))
    }
}
