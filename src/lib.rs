pub mod chunk;
pub mod clock;
pub mod config;
pub mod error;
pub mod hook;
pub mod pipeline;
pub mod ring;
pub mod signal;
pub mod sink;
pub mod source;

use std::time::Duration;

pub use chunk::Chunk;
pub use config::{OverrunPolicy, PipelineConfig, SourceRetry, StreamDescriptor};
pub use error::{PipelineError, SinkError, SourceError};
pub use pipeline::{Coordinator, RunReport};
pub use signal::ShutdownHandle;

/// One multi-channel reading, one value per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub values: Vec<f32>,
    /// Capture time on the source's own clock, in seconds.
    pub timestamp: f64,
}

impl Sample {
    pub fn new(values: Vec<f32>, timestamp: f64) -> Sample {
        Sample { values, timestamp }
    }
}

/// Where samples come from. Connected once, before the pipeline starts.
pub trait SampleSource: Send {
    /// Fixed for the whole session.
    fn channel_count(&self) -> usize;

    /// Waits at most `timeout` for the next sample. `Ok(None)` means nothing arrived,
    /// which is not an error.
    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError>;

    fn close(&mut self) {}
}

/// Where chunks go.
pub trait ChunkSink: Send {
    /// Called once before the first chunk with the negotiated stream layout.
    fn open(&mut self, desc: &StreamDescriptor) -> Result<(), SinkError>;

    fn push_chunk(&mut self, chunk: &Chunk) -> Result<(), SinkError>;

    fn close(&mut self) {}
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        (**self).pull_sample(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<S: ChunkSink + ?Sized> ChunkSink for Box<S> {
    fn open(&mut self, desc: &StreamDescriptor) -> Result<(), SinkError> {
        (**self).open(desc)
    }

    fn push_chunk(&mut self, chunk: &Chunk) -> Result<(), SinkError> {
        (**self).push_chunk(chunk)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
