use std::thread;
use std::time::{Duration, Instant};

use log::*;

use super::{PipelineState, RingWriter};
use crate::config::{OverrunPolicy, PipelineConfig, SourceRetry};
use crate::error::{PipelineError, Result, SourceError};
use crate::signal::{Raise, ReadySignal, StopFlag};
use crate::{Sample, SampleSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ingested {
    /// The source had nothing within the pull timeout.
    Idle,
    Accepted,
    /// This sample completed an epoch and raised the ready signal.
    Raised,
    /// This sample completed an epoch while the previous chunk was still pending.
    Coalesced,
    /// Shutdown was requested while waiting to raise.
    Stopped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub idle_polls: u64,
    pub raised: u64,
    pub coalesced: u64,
    pub source_errors: u64,
}

/// Pulls samples from the source into the rolling buffer and raises the ready
/// signal once every `send_every` accepted samples.
pub struct SampleIngestor<'a, S: ?Sized> {
    source: &'a mut S,
    ring: RingWriter<'a>,
    signal: &'a ReadySignal,
    stop: &'a StopFlag,
    channels: usize,
    send_every: usize,
    overrun: OverrunPolicy,
    retry: SourceRetry,
    pull_timeout: Duration,
    counter: usize,
    stats: IngestStats,
}

impl<'a, S: SampleSource + ?Sized> SampleIngestor<'a, S> {
    pub fn new(
        config: &PipelineConfig,
        source: &'a mut S,
        state: &'a PipelineState,
    ) -> SampleIngestor<'a, S> {
        SampleIngestor {
            source,
            ring: state.ring.writer(),
            signal: &state.signal,
            stop: &*state.stop,
            channels: config.channels,
            send_every: config.send_every,
            overrun: config.overrun,
            retry: config.retry,
            pull_timeout: config.shutdown_timeout,
            counter: 0,
            stats: IngestStats::default(),
        }
    }

    /// Samples accepted since the last epoch boundary.
    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Appends one sample and advances the epoch counter. A sample of the wrong
    /// width is refused before the buffer is touched.
    pub fn accept(&mut self, sample: &Sample) -> Result<Ingested> {
        if sample.values.len() != self.channels {
            return Err(SourceError::Malformed {
                expected: self.channels,
                got: sample.values.len(),
            }
            .into());
        }

        self.ring.push(&sample.values)?;
        self.stats.accepted += 1;
        self.counter += 1;
        if self.counter < self.send_every {
            return Ok(Ingested::Accepted);
        }

        self.counter = 0;
        match self.signal.raise(self.overrun, self.stop, self.pull_timeout) {
            Raise::Raised => {
                self.stats.raised += 1;
                trace!("chunk ready after {} samples", self.stats.accepted);
                Ok(Ingested::Raised)
            }
            Raise::Coalesced => {
                self.stats.coalesced += 1;
                warn!(
                    "previous chunk still pending at sample {}, folding into it",
                    self.stats.accepted
                );
                Ok(Ingested::Coalesced)
            }
            Raise::Stopped => Ok(Ingested::Stopped),
        }
    }

    /// One pull from the source, followed by [`accept`](Self::accept) if it
    /// produced a sample.
    pub fn poll(&mut self) -> Result<Ingested> {
        match self.source.pull_sample(self.pull_timeout)? {
            Some(sample) => self.accept(&sample),
            None => {
                self.stats.idle_polls += 1;
                Ok(Ingested::Idle)
            }
        }
    }

    /// Ingests until shutdown is requested. Source failures are retried with
    /// bounded backoff; running out of attempts ends the run with the last error.
    pub fn run(&mut self) -> Result<()> {
        info!("ingest thread awake");
        let mut failures = 0u32;

        while !self.stop.is_set() {
            match self.poll() {
                Ok(_) => failures = 0,
                Err(PipelineError::SourceRead(e)) => {
                    self.stats.source_errors += 1;
                    failures += 1;
                    if failures > self.retry.max_attempts {
                        error!("giving up on source after {} failures: {}", failures, e);
                        return Err(PipelineError::SourceRead(e));
                    }

                    let delay = self.retry.backoff(failures);
                    warn!(
                        "source read failed ({}), retry {}/{} in {:?}",
                        e, failures, self.retry.max_attempts, delay
                    );
                    self.pause(delay);
                }
                Err(e) => return Err(e),
            }
        }

        debug!("ingest thread stopping, {} samples accepted", self.stats.accepted);
        Ok(())
    }

    fn pause(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        loop {
            let now = Instant::now();
            if now >= deadline || self.stop.is_set() {
                return;
            }
            thread::sleep((deadline - now).min(self.pull_timeout));
        }
    }
}
