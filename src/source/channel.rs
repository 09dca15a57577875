use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::SourceError;
use crate::{Sample, SampleSource};

/// Source backed by a crossbeam channel. Senders may hand over samples of any width;
/// the ingestor decides what to do with malformed ones.
pub struct ChannelSource {
    rx: Receiver<Sample>,
    channels: usize,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Sample>, channels: usize) -> ChannelSource {
        ChannelSource { rx, channels }
    }
}

impl SampleSource for ChannelSource {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        match self.rx.recv_timeout(timeout) {
            Ok(sample) => Ok(Some(sample)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_timeout_and_disconnect() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = ChannelSource::new(rx, 1);
        let timeout = Duration::from_millis(5);

        assert!(source.pull_sample(timeout).unwrap().is_none());
        tx.send(Sample::new(vec![1.0], 0.0)).unwrap();
        assert!(source.pull_sample(timeout).unwrap().is_some());
        drop(tx);
        assert!(source.pull_sample(timeout).is_err());
    }
}
