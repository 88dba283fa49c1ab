//! Attention-grabbing alert for incoming offers.
//!
//! Best effort only: every playback failure is logged and swallowed. The
//! engine owns its output handle, so each window gets its own engine and
//! tests can substitute a recording output.

pub mod output;
pub mod synth;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, warn};

use crate::alert::output::{AudioOutput, Voice};
use crate::alert::synth::{beat_duration, render_beat, BEAT_INTERVAL, DEFAULT_SAMPLE_RATE};

type Voices = Arc<Mutex<Vec<Box<dyn Voice>>>>;

pub struct AlertEngine {
    output: Arc<dyn AudioOutput>,
    resource: Option<PathBuf>,
    duration: Duration,
    beat: Arc<[f32]>,
    voices: Voices,
    timer: Option<JoinHandle<()>>,
}

impl AlertEngine {
    pub fn new(output: Arc<dyn AudioOutput>, resource: Option<PathBuf>, duration: Duration) -> Self {
        Self {
            output,
            resource,
            duration,
            beat: render_beat(DEFAULT_SAMPLE_RATE).into(),
            voices: Arc::new(Mutex::new(Vec::new())),
            timer: None,
        }
    }

    /// Starts the alert, replacing one that is already sounding.
    pub fn play(&mut self) {
        self.stop();

        if let Some(path) = &self.resource {
            match self.output.play_resource(path) {
                Ok(voice) => {
                    lock(&self.voices).push(voice);
                    let voices = self.voices.clone();
                    let duration = self.duration;
                    self.timer = Some(tokio::spawn(async move {
                        sleep(duration).await;
                        silence(&voices);
                    }));
                    return;
                }
                Err(err) => debug!(error = %err, "alert resource unavailable; synthesizing"),
            }
        }

        let output = self.output.clone();
        let beat = self.beat.clone();
        let voices = self.voices.clone();
        let beats = self.duration.as_secs().max(1);
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval(BEAT_INTERVAL);
            for _ in 0..beats {
                ticker.tick().await;
                match output.play_pcm(&beat, DEFAULT_SAMPLE_RATE) {
                    Ok(voice) => lock(&voices).push(voice),
                    Err(err) => {
                        warn!(error = %err, "alert beat rejected");
                        break;
                    }
                }
            }
            sleep(beat_duration()).await;
            silence(&voices);
        }));
    }

    /// Silences every voice and cancels pending beats. Safe to call when
    /// nothing is playing.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        silence(&self.voices);
    }

    pub fn is_playing(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for AlertEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(voices: &Voices) -> std::sync::MutexGuard<'_, Vec<Box<dyn Voice>>> {
    voices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn silence(voices: &Voices) {
    for mut voice in lock(voices).drain(..) {
        voice.stop();
    }
}
