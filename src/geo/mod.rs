use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One raw fix from the device. `speed` is in metres per second, as reported
/// by the positioning hardware; it is absent when the device has no reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub speed: Option<f64>,
}

impl PositionSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

pub fn mps_to_kmh(speed_mps: f64) -> f64 {
    speed_mps * MPS_TO_KMH
}

/// Sliding average over the last `capacity` speed readings, in km/h.
#[derive(Debug, Clone)]
pub struct SpeedWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl SpeedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Pushes a reading and returns the average rounded to one decimal.
    pub fn push_kmh(&mut self, kmh: f64) -> f64 {
        self.samples.push_back(kmh);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }

        let sum: f64 = self.samples.iter().sum();
        round_one_decimal(sum / self.samples.len() as f64)
    }

    /// Smoothed speed for a raw sample. Missing or negative readings yield
    /// `None` and leave the window untouched.
    pub fn observe(&mut self, sample: &PositionSample) -> Option<f64> {
        match sample.speed {
            Some(speed) if speed >= 0.0 => Some(self.push_kmh(mps_to_kmh(speed))),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
