use log::*;

use crate::chunk::Chunk;
use crate::config::StreamDescriptor;
use crate::error::SinkError;
use crate::ChunkSink;

/// Logs the shape of every chunk and drops it.
#[derive(Debug, Default)]
pub struct LogSink {
    name: String,
    received: u64,
}

impl LogSink {
    pub fn new() -> LogSink {
        LogSink::default()
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

impl ChunkSink for LogSink {
    fn open(&mut self, desc: &StreamDescriptor) -> Result<(), SinkError> {
        self.name = desc.name.clone();
        info!(
            "{} ({}): {}",
            desc.name,
            desc.kind,
            desc.channels
                .iter()
                .map(|c| format!("{} [{}]", c.label, c.unit))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    fn push_chunk(&mut self, chunk: &Chunk) -> Result<(), SinkError> {
        self.received += 1;
        info!("{}: {}", self.name, chunk);
        Ok(())
    }

    fn close(&mut self) {
        info!("{}: {} chunks", self.name, self.received);
    }
}
