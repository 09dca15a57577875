use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::*;

use crate::chunk::Chunk;
use crate::config::StreamDescriptor;
use crate::error::SinkError;
use crate::ChunkSink;

/// In-process outlet holding at most `max_buffered` unread chunks. A full queue is
/// reported as backpressure rather than waited on.
pub struct ChannelSink {
    tx: Sender<Chunk>,
    descriptor: Option<StreamDescriptor>,
}

impl ChannelSink {
    pub fn bounded(max_buffered: usize) -> (ChannelSink, Receiver<Chunk>) {
        let (tx, rx) = crossbeam_channel::bounded(max_buffered);
        let sink = ChannelSink {
            tx,
            descriptor: None,
        };
        (sink, rx)
    }

    pub fn descriptor(&self) -> Option<&StreamDescriptor> {
        self.descriptor.as_ref()
    }
}

impl ChunkSink for ChannelSink {
    fn open(&mut self, desc: &StreamDescriptor) -> Result<(), SinkError> {
        debug!(
            "channel outlet {}: {} channels, chunk size {}",
            desc.name,
            desc.channel_count(),
            desc.chunk_size
        );
        self.descriptor = Some(desc.clone());
        Ok(())
    }

    fn push_chunk(&mut self, chunk: &Chunk) -> Result<(), SinkError> {
        match self.tx.try_send(chunk.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Backpressure),
            Err(TrySendError::Disconnected(_)) => Err(SinkError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_is_backpressure() {
        let (mut sink, rx) = ChannelSink::bounded(1);
        let chunk = Chunk::new(0, 0.0, vec![vec![1.0]]);

        sink.push_chunk(&chunk).unwrap();
        match sink.push_chunk(&chunk) {
            Err(SinkError::Backpressure) => {}
            other => panic!("expected backpressure, got {:?}", other),
        }

        assert_eq!(rx.recv().unwrap(), chunk);
        drop(rx);
        match sink.push_chunk(&chunk) {
            Err(SinkError::Disconnected) => {}
            other => panic!("expected disconnect, got {:?}", other),
        }
    }
}
