//! Synthesized fallback alert: a staggered three-note square-wave chord with a
//! short attack and exponential decay per note.

use std::time::Duration;

pub const CHORD_HZ: [f64; 3] = [660.0, 880.0, 1100.0];
pub const NOTE_STAGGER: Duration = Duration::from_millis(120);
pub const BEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

const PEAK_GAIN: f64 = 0.7;
const FLOOR_GAIN: f64 = 0.001;
const ATTACK_SECS: f64 = 0.02;
const DECAY_END_SECS: f64 = 0.35;
const NOTE_SECS: f64 = 0.4;
const NOTE_LENGTH: Duration = Duration::from_millis(400);

/// Gain of a single note `t` seconds after its onset.
pub fn envelope(t: f64) -> f64 {
    if !(0.0..NOTE_SECS).contains(&t) {
        0.0
    } else if t < ATTACK_SECS {
        PEAK_GAIN * t / ATTACK_SECS
    } else if t < DECAY_END_SECS {
        let progress = (t - ATTACK_SECS) / (DECAY_END_SECS - ATTACK_SECS);
        PEAK_GAIN * (FLOOR_GAIN / PEAK_GAIN).powf(progress)
    } else {
        FLOOR_GAIN
    }
}

fn square(freq: f64, t: f64) -> f64 {
    if (t * freq).fract() < 0.5 { 1.0 } else { -1.0 }
}

pub fn beat_duration() -> Duration {
    NOTE_STAGGER * (CHORD_HZ.len() as u32 - 1) + NOTE_LENGTH
}

/// Renders one beat of the chord as mono PCM in `[-1.0, 1.0]`.
pub fn render_beat(sample_rate: u32) -> Vec<f32> {
    let len = (beat_duration().as_millis() as u64 * sample_rate as u64 / 1_000) as usize;
    let stagger = NOTE_STAGGER.as_secs_f64();
    let voices = CHORD_HZ.len() as f64;

    (0..len)
        .map(|n| {
            let t = n as f64 / sample_rate as f64;
            let mixed: f64 = CHORD_HZ
                .iter()
                .enumerate()
                .map(|(i, freq)| {
                    let local = t - i as f64 * stagger;
                    envelope(local) * square(*freq, local.max(0.0))
                })
                .sum();
            (mixed / voices).clamp(-1.0, 1.0) as f32
        })
        .collect()
}

/// Wraps mono PCM as a 16-bit RIFF/WAVE file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{beat_duration, encode_wav, envelope, render_beat};

    #[test]
    fn envelope_ramps_up_then_decays() {
        assert_eq!(envelope(0.0), 0.0);
        assert!((envelope(0.02) - 0.7).abs() < 1e-9);
        assert!(envelope(0.1) < envelope(0.03));
        assert!((envelope(0.3499) - 0.001).abs() < 1e-3);
        assert_eq!(envelope(0.4), 0.0);
        assert_eq!(envelope(-0.1), 0.0);
    }

    #[test]
    fn beat_spans_the_staggered_notes() {
        assert_eq!(beat_duration().as_millis(), 640);

        let samples = render_beat(1_000);
        assert_eq!(samples.len(), 640);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(samples.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn wav_header_describes_the_payload() {
        let wav = encode_wav(&[0.0, 0.5, -0.5], 8_000);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 6);
        assert_eq!(wav.len(), 44 + 6);
    }
}
