use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

use log::*;

use crate::error::SourceError;
use crate::{Sample, SampleSource};

/// Paced multi-channel sine generator.
///
/// Channel `c` carries a `base_freq * (c + 1)` Hz tone plus a per-channel offset, so
/// DC removal hooks have something to remove. Samples are released no faster than
/// the configured rate.
pub struct SyntheticSource {
    channels: usize,
    rate: f64,
    base_freq: f64,
    amplitude: f64,
    offset: f64,
    started: Option<Instant>,
    produced: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(channels: usize, rate: f64) -> SyntheticSource {
        SyntheticSource {
            channels,
            rate,
            base_freq: 10.0,
            amplitude: 50.0,
            offset: 20.0,
            started: None,
            produced: 0,
            limit: None,
        }
    }

    pub fn base_freq(mut self, hz: f64) -> SyntheticSource {
        self.base_freq = hz;
        self
    }

    pub fn amplitude(mut self, amplitude: f64) -> SyntheticSource {
        self.amplitude = amplitude;
        self
    }

    /// Disconnect after `n` samples.
    pub fn limit(mut self, n: u64) -> SyntheticSource {
        self.limit = Some(n);
        self
    }

    fn value(&self, channel: usize, t: f64) -> f32 {
        let freq = self.base_freq * (channel + 1) as f64;
        let v = self.amplitude * (2.0 * PI * freq * t).sin() + self.offset * (channel + 1) as f64;
        v as f32
    }
}

impl SampleSource for SyntheticSource {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        if let Some(limit) = self.limit {
            if self.produced >= limit {
                return Err(SourceError::Disconnected);
            }
        }

        let (channels, rate) = (self.channels, self.rate);
        let started = *self.started.get_or_insert_with(|| {
            debug!("synthetic source: {} channels at {} Hz", channels, rate);
            Instant::now()
        });

        let t = self.produced as f64 / self.rate;
        let due = started + Duration::from_secs_f64(t);
        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(wait);
        }

        let values = (0..self.channels).map(|c| self.value(c, t)).collect();
        self.produced += 1;
        Ok(Some(Sample::new(values, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_paced_samples_then_disconnects() {
        let mut source = SyntheticSource::new(2, 1000.0).limit(5);
        let start = Instant::now();
        let mut stamps = Vec::new();
        while let Ok(pulled) = source.pull_sample(Duration::from_millis(50)) {
            if let Some(sample) = pulled {
                assert_eq!(sample.values.len(), 2);
                stamps.push(sample.timestamp);
            }
        }
        assert_eq!(stamps, vec![0.0, 0.001, 0.002, 0.003, 0.004]);
        assert!(start.elapsed() >= Duration::from_millis(4));
    }

    #[test]
    fn returns_none_when_next_sample_is_not_due() {
        let mut source = SyntheticSource::new(1, 1.0);
        assert!(source.pull_sample(Duration::from_millis(5)).unwrap().is_some());
        assert!(source.pull_sample(Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn channels_carry_distinct_offsets() {
        let mut source = SyntheticSource::new(3, 1000.0).amplitude(0.0);
        let sample = source.pull_sample(Duration::from_millis(5)).unwrap().unwrap();
        assert_eq!(sample.values, vec![20.0, 40.0, 60.0]);
    }
}
