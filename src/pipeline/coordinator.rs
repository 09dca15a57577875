use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::*;

use super::{ChunkEmitter, EmitStats, IngestStats, PipelineState, SampleIngestor};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::hook::ChunkHook;
use crate::signal::{ShutdownHandle, SignalStats, StopFlag};
use crate::{ChunkSink, SampleSource};

/// Counters from one pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunReport {
    pub ingest: IngestStats,
    pub emit: EmitStats,
    pub signal: SignalStats,
    pub elapsed: Duration,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples ({} idle polls, {} source errors), {} chunks sent, {} dropped, {} coalesced, {} liveness warnings in {:?}",
            self.ingest.accepted,
            self.ingest.idle_polls,
            self.ingest.source_errors,
            self.emit.sent,
            self.emit.dropped,
            self.signal.coalesced,
            self.emit.liveness_warnings,
            self.elapsed
        )
    }
}

// Lets the emitter finish even if the ingest thread unwinds.
struct IngestDone<'a>(&'a PipelineState);

impl<'a> Drop for IngestDone<'a> {
    fn drop(&mut self) {
        self.0.finish_ingest();
    }
}

// Stops the ingestor if the emit thread unwinds, so both joins return.
struct EmitDone<'a>(&'a PipelineState);

impl<'a> Drop for EmitDone<'a> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("emit thread panicked, stopping ingest");
            self.0.stop.request();
            self.0.signal.wake_all();
        }
    }
}

/// Owns the source, the sink and the run's shared state, and drives the ingest and
/// emit threads from startup to an orderly shutdown.
pub struct Coordinator<S, K> {
    config: PipelineConfig,
    source: S,
    sink: K,
    hook: Option<Box<dyn ChunkHook>>,
    stop: Arc<StopFlag>,
}

impl<S: SampleSource, K: ChunkSink> Coordinator<S, K> {
    pub fn new(config: PipelineConfig, source: S, sink: K) -> Result<Coordinator<S, K>> {
        config.validate()?;

        let source_channels = source.channel_count();
        if source_channels != config.channels {
            return Err(PipelineError::InvalidConfig(format!(
                "source has {} channels, pipeline configured for {}",
                source_channels, config.channels
            )));
        }

        Ok(Coordinator {
            config,
            source,
            sink,
            hook: None,
            stop: Arc::new(StopFlag::new()),
        })
    }

    pub fn with_hook<H: ChunkHook + 'static>(mut self, hook: H) -> Coordinator<S, K> {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.stop.clone())
    }

    /// Runs until shutdown is requested or the source fails for good, then returns
    /// the source and sink along with the outcome.
    pub fn run_with(self) -> (S, K, Result<RunReport>) {
        let Coordinator {
            config,
            mut source,
            mut sink,
            hook,
            stop,
        } = self;

        let result = run_pipeline(&config, &mut source, &mut sink, hook, stop);

        source.close();
        sink.close();
        (source, sink, result)
    }

    pub fn run(self) -> Result<RunReport> {
        let (_, _, result) = self.run_with();
        result
    }
}

fn run_pipeline<S: SampleSource, K: ChunkSink>(
    config: &PipelineConfig,
    source: &mut S,
    sink: &mut K,
    hook: Option<Box<dyn ChunkHook>>,
    stop: Arc<StopFlag>,
) -> Result<RunReport> {
    let started = Instant::now();
    let state = PipelineState::with_stop(config, stop)?;
    debug!(
        "buffer ready: {} channels x {} samples, chunk every {} samples",
        config.channels, config.capacity, config.send_every
    );

    let descriptor = config.descriptor();
    if let Err(e) = sink.open(&descriptor) {
        error!("could not open sink: {}", e);
        return Err(PipelineError::SinkWrite(e));
    }

    let joined = crossbeam::thread::scope(|s| {
        let ingest = s.spawn(|_| {
            let _done = IngestDone(&state);
            let mut ingestor = SampleIngestor::new(config, source, &state);
            let result = ingestor.run();
            if result.is_err() {
                state.stop.request();
            }
            (ingestor.stats(), result)
        });
        let emit = s.spawn(|_| {
            let _done = EmitDone(&state);
            ChunkEmitter::new(config, sink, &state, hook).run()
        });

        (ingest.join(), emit.join())
    });

    let (ingested, emitted) = joined.map_err(|_| PipelineError::TaskPanicked("pipeline"))?;
    let emit = emitted.map_err(|_| PipelineError::TaskPanicked("emit"))?;
    let (ingest, outcome) = ingested.map_err(|_| PipelineError::TaskPanicked("ingest"))?;

    let report = RunReport {
        ingest,
        emit,
        signal: state.signal.stats(),
        elapsed: started.elapsed(),
    };
    info!("pipeline finished: {}", report);

    outcome.map(|_| report)
}
