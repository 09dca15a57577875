use failure::*;
use std::io;
use std::time::Duration;

/// Failures reported by a [`SampleSource`](crate::SampleSource).
#[derive(Debug, Fail)]
pub enum SourceError {
    #[fail(display = "source disconnected")]
    Disconnected,

    #[fail(display = "malformed sample: expected {} channels, got {}", expected, got)]
    Malformed { expected: usize, got: usize },

    #[fail(display = "source i/o error: {}", _0)]
    Io(#[fail(cause)] io::Error),
}

impl From<io::Error> for SourceError {
    fn from(e: io::Error) -> SourceError {
        SourceError::Io(e)
    }
}

/// Failures reported by a [`ChunkSink`](crate::ChunkSink).
#[derive(Debug, Fail)]
pub enum SinkError {
    #[fail(display = "sink queue full")]
    Backpressure,

    #[fail(display = "sink disconnected")]
    Disconnected,

    #[fail(display = "sink rejected chunk: {}", _0)]
    Rejected(String),

    #[fail(display = "sink i/o error: {}", _0)]
    Io(#[fail(cause)] io::Error),
}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> SinkError {
        SinkError::Io(e)
    }
}

#[derive(Debug, Fail)]
pub enum PipelineError {
    #[fail(display = "invalid channel {} (pipeline has {} channels)", index, channels)]
    InvalidChannel { index: usize, channels: usize },

    #[fail(display = "invalid configuration: {}", _0)]
    InvalidConfig(String),

    #[fail(display = "source read error: {}", _0)]
    SourceRead(#[fail(cause)] SourceError),

    #[fail(display = "sink write error: {}", _0)]
    SinkWrite(#[fail(cause)] SinkError),

    #[fail(display = "no chunk signal for {:?}", waited)]
    SynchronizationTimeout { waited: Duration },

    #[fail(display = "{} thread panicked", _0)]
    TaskPanicked(&'static str),
}

impl PipelineError {
    /// Errors that must stop the pipeline. Everything else is reported and absorbed
    /// by the component that hit it.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::SinkWrite(_) | PipelineError::SynchronizationTimeout { .. } => false,
            _ => true,
        }
    }
}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> PipelineError {
        PipelineError::SourceRead(e)
    }
}

impl From<SinkError> for PipelineError {
    fn from(e: SinkError) -> PipelineError {
        PipelineError::SinkWrite(e)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
