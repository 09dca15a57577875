use std::time::{Duration, Instant};

use log::*;

use super::{PipelineState, RingReader};
use crate::chunk::Chunk;
use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::hook::ChunkHook;
use crate::signal::{ReadySignal, StopFlag, Wait};
use crate::ChunkSink;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub sent: u64,
    pub dropped: u64,
    pub liveness_warnings: u64,
}

/// Waits for the ready signal, snapshots the buffer and forwards the chunk.
pub struct ChunkEmitter<'a, K: ?Sized> {
    sink: &'a mut K,
    ring: RingReader<'a>,
    signal: &'a ReadySignal,
    drained: &'a StopFlag,
    clock: Clock,
    hook: Option<Box<dyn ChunkHook>>,
    wait_slice: Duration,
    idle_warning: Duration,
    seq: u64,
    stats: EmitStats,
}

impl<'a, K: ChunkSink + ?Sized> ChunkEmitter<'a, K> {
    pub fn new(
        config: &PipelineConfig,
        sink: &'a mut K,
        state: &'a PipelineState,
        hook: Option<Box<dyn ChunkHook>>,
    ) -> ChunkEmitter<'a, K> {
        ChunkEmitter {
            sink,
            ring: state.ring.reader(),
            signal: &state.signal,
            drained: &state.drained,
            clock: state.clock,
            hook,
            wait_slice: config.shutdown_timeout,
            idle_warning: config.idle_warning,
            seq: 0,
            stats: EmitStats::default(),
        }
    }

    pub fn stats(&self) -> EmitStats {
        self.stats
    }

    /// Snapshots, processes and forwards one chunk, then clears the ready signal.
    /// The signal is cleared even if the sink refuses the chunk; that chunk is
    /// dropped and the error returned for reporting.
    pub fn emit(&mut self) -> Result<Chunk> {
        let mut data = self.ring.snapshot();
        let timestamp = self.clock.now();
        if let Some(hook) = self.hook.as_mut() {
            hook.process(&mut data);
        }

        let chunk = Chunk::new(self.seq, timestamp, data);
        self.seq += 1;

        let pushed = self.sink.push_chunk(&chunk);
        self.signal.clear();

        match pushed {
            Ok(()) => {
                self.stats.sent += 1;
                debug!("sent {}", chunk);
                Ok(chunk)
            }
            Err(e) => {
                self.stats.dropped += 1;
                Err(PipelineError::SinkWrite(e))
            }
        }
    }

    /// Forwards one chunk per raised signal until the ingestor has finished and
    /// nothing is pending. Sink failures drop the chunk and carry on.
    pub fn run(&mut self) -> EmitStats {
        info!("emit thread awake");
        let mut idle_since = Instant::now();
        let mut next_warning = self.idle_warning;

        loop {
            match self.signal.wait(self.drained, self.wait_slice) {
                Wait::Ready => {
                    idle_since = Instant::now();
                    next_warning = self.idle_warning;
                    if let Err(e) = self.emit() {
                        warn!("dropped chunk #{}: {}", self.seq - 1, e);
                    }
                }
                Wait::TimedOut => {
                    let waited = idle_since.elapsed();
                    if waited >= next_warning {
                        self.stats.liveness_warnings += 1;
                        next_warning += self.idle_warning;
                        warn!("{}", PipelineError::SynchronizationTimeout { waited });
                    }
                }
                Wait::Stopped => break,
            }
        }

        debug!(
            "emit thread stopping, {} sent, {} dropped",
            self.stats.sent, self.stats.dropped
        );
        self.stats
    }
}
