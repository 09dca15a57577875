//! The ingest/emit pipeline.
//!
//! A [`Coordinator`] owns one [`PipelineState`] per run and lends it to two scoped
//! threads: the [`SampleIngestor`] appends to the rolling buffer and raises the
//! ready signal every `send_every` samples, the [`ChunkEmitter`] waits on that
//! signal, snapshots the buffer and forwards the chunk.

pub mod coordinator;
pub mod emit;
pub mod ingest;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ring::SampleRing;
use crate::signal::{ReadySignal, StopFlag};

pub use coordinator::{Coordinator, RunReport};
pub use emit::{ChunkEmitter, EmitStats};
pub use ingest::{IngestStats, Ingested, SampleIngestor};

/// Rolling buffer behind a lock that is only held for a single push or snapshot.
#[derive(Debug)]
pub struct SharedRing(Mutex<SampleRing>);

impl SharedRing {
    pub fn new(ring: SampleRing) -> SharedRing {
        SharedRing(Mutex::new(ring))
    }

    fn lock(&self) -> MutexGuard<'_, SampleRing> {
        // pushes validate before writing, so a poisoned ring is still consistent
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn writer(&self) -> RingWriter<'_> {
        RingWriter(self)
    }

    pub fn reader(&self) -> RingReader<'_> {
        RingReader(self)
    }
}

/// Append-only view of the shared ring.
#[derive(Clone, Copy, Debug)]
pub struct RingWriter<'a>(&'a SharedRing);

impl<'a> RingWriter<'a> {
    pub fn push(&self, sample: &[f32]) -> Result<()> {
        self.0.lock().push(sample)
    }
}

/// Snapshot-only view of the shared ring.
#[derive(Clone, Copy, Debug)]
pub struct RingReader<'a>(&'a SharedRing);

impl<'a> RingReader<'a> {
    pub fn snapshot(&self) -> Vec<Vec<f32>> {
        self.0.lock().snapshot()
    }

    pub fn samples_written(&self) -> u64 {
        self.0.lock().samples_written()
    }
}

/// Everything the two pipeline threads share for one run.
#[derive(Debug)]
pub struct PipelineState {
    pub ring: SharedRing,
    pub signal: ReadySignal,
    /// Shutdown requested; watched by the ingestor.
    pub stop: Arc<StopFlag>,
    /// The ingestor has exited; watched by the emitter so it can flush first.
    pub drained: StopFlag,
    pub clock: Clock,
}

impl PipelineState {
    pub fn new(config: &PipelineConfig) -> Result<PipelineState> {
        PipelineState::with_stop(config, Arc::new(StopFlag::new()))
    }

    pub fn with_stop(config: &PipelineConfig, stop: Arc<StopFlag>) -> Result<PipelineState> {
        let ring = SampleRing::new(config.channels, config.capacity, config.fill)?;
        Ok(PipelineState {
            ring: SharedRing::new(ring),
            signal: ReadySignal::new(),
            stop,
            drained: StopFlag::new(),
            clock: Clock::new(),
        })
    }

    /// Marks the ingestor as finished and wakes the emitter.
    pub fn finish_ingest(&self) {
        self.drained.request();
        self.signal.wake_all();
    }
}
