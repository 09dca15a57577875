use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use log::*;
use ringbuf::{Consumer, Producer, RingBuffer};

use crate::error::SourceError;
use crate::{Sample, SampleSource};

/// Creates a lock-free single-producer/single-consumer sample queue holding up to
/// `frames` samples. The feeder side goes to an acquisition thread, the source side
/// to the pipeline.
pub fn sample_feed(channels: usize, frames: usize) -> (SampleFeeder, RingSource) {
    let (value_producer, value_consumer) = RingBuffer::<f32>::new(channels * frames).split();
    let (stamp_producer, stamp_consumer) = RingBuffer::<f64>::new(frames).split();
    let closed = Arc::new(AtomicBool::from(false));

    let feeder = SampleFeeder {
        values: value_producer,
        stamps: stamp_producer,
        channels,
        closed: closed.clone(),
        dropped: 0,
    };
    let source = RingSource {
        values: value_consumer,
        stamps: stamp_consumer,
        channels,
        closed,
    };
    (feeder, source)
}

pub struct SampleFeeder {
    values: Producer<f32>,
    stamps: Producer<f64>,
    channels: usize,
    closed: Arc<AtomicBool>,
    dropped: u64,
}

impl SampleFeeder {
    /// Queues one sample. Returns `Ok(false)` when the queue is full and the sample
    /// was dropped; samples of the wrong width are refused here.
    pub fn push(&mut self, values: &[f32], timestamp: f64) -> Result<bool, SourceError> {
        if values.len() != self.channels {
            return Err(SourceError::Malformed {
                expected: self.channels,
                got: values.len(),
            });
        }

        if self.values.remaining() < self.channels || self.stamps.is_full() {
            self.dropped += 1;
            warn!("sample feed full, dropped {} samples so far", self.dropped);
            return Ok(false);
        }

        // values first: the consumer only reads a frame once its stamp is visible
        self.values.push_slice(values);
        Ok(self.stamps.push(timestamp).is_ok())
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn queued(&self) -> usize {
        self.stamps.len()
    }
}

impl Drop for SampleFeeder {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        trace!("sample feeder closed");
    }
}

pub struct RingSource {
    values: Consumer<f32>,
    stamps: Consumer<f64>,
    channels: usize,
    closed: Arc<AtomicBool>,
}

impl RingSource {
    fn pop_frame(&mut self) -> Option<Result<Sample, SourceError>> {
        let timestamp = self.stamps.pop()?;
        let mut values = vec![0.0; self.channels];
        let got = self.values.pop_slice(&mut values);
        if got != self.channels {
            return Some(Err(SourceError::Malformed {
                expected: self.channels,
                got,
            }));
        }
        Some(Ok(Sample::new(values, timestamp)))
    }
}

impl SampleSource for RingSource {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();

        loop {
            if let Some(frame) = self.pop_frame() {
                return frame.map(Some);
            }
            if self.closed.load(Ordering::Acquire) && self.stamps.is_empty() {
                return Err(SourceError::Disconnected);
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            if backoff.is_completed() {
                thread::sleep(Duration::from_micros(500));
            } else {
                backoff.snooze();
            }
        }
    }
}
