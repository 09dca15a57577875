use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Buf;
use log::*;

use crate::error::SourceError;
use crate::{Sample, SampleSource};

/// Replays a recording of interleaved little-endian `f32` frames
/// (`ch0 ch1 .. chN-1 ch0 ch1 ..`). Reaching the end of the data disconnects.
pub struct FileSource<R> {
    reader: R,
    channels: usize,
    rate: f64,
    realtime: bool,
    frame: Vec<u8>,
    started: Option<Instant>,
    produced: u64,
}

impl FileSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, channels: usize, rate: f64) -> io::Result<Self> {
        debug!("opening sample dump {}", path.as_ref().display());
        let file = File::open(path)?;
        Ok(FileSource::new(BufReader::new(file), channels, rate))
    }
}

impl<R: Read + Send> FileSource<R> {
    pub fn new(reader: R, channels: usize, rate: f64) -> FileSource<R> {
        FileSource {
            reader,
            channels,
            rate,
            realtime: true,
            frame: vec![0; channels * 4],
            started: None,
            produced: 0,
        }
    }

    /// Replay as fast as the pipeline pulls instead of at the sample rate.
    pub fn unpaced(mut self) -> FileSource<R> {
        self.realtime = false;
        self
    }

    fn read_frame(&mut self) -> Result<(), SourceError> {
        let mut filled = 0;
        while filled < self.frame.len() {
            match self.reader.read(&mut self.frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match filled {
            0 => Err(SourceError::Disconnected),
            n if n == self.frame.len() => Ok(()),
            n => Err(SourceError::Malformed {
                expected: self.channels,
                got: n / 4,
            }),
        }
    }
}

impl<R: Read + Send> SampleSource for FileSource<R> {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        let t = self.produced as f64 / self.rate;

        if self.realtime {
            let started = *self.started.get_or_insert_with(Instant::now);
            let due = started + Duration::from_secs_f64(t);
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > timeout {
                    thread::sleep(timeout);
                    return Ok(None);
                }
                thread::sleep(wait);
            }
        }

        self.read_frame()?;
        let mut buf = &self.frame[..];
        let mut values = Vec::with_capacity(self.channels);
        while buf.has_remaining() {
            values.push(buf.get_f32_le());
        }

        self.produced += 1;
        trace!("replayed frame {}", self.produced);
        Ok(Some(Sample::new(values, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use std::io::Cursor;

    fn dump(frames: &[&[f32]]) -> Vec<u8> {
        let mut out = Vec::new();
        for frame in frames {
            for v in frame.iter() {
                out.put_f32_le(*v);
            }
        }
        out
    }

    #[test]
    fn replays_frames_then_disconnects() {
        let data = dump(&[&[1.0, -1.0], &[2.0, -2.0]]);
        let mut source = FileSource::new(Cursor::new(data), 2, 250.0).unpaced();
        let timeout = Duration::from_millis(5);

        let a = source.pull_sample(timeout).unwrap().unwrap();
        let b = source.pull_sample(timeout).unwrap().unwrap();
        assert_eq!(a.values, vec![1.0, -1.0]);
        assert_eq!(b.values, vec![2.0, -2.0]);
        assert_eq!(b.timestamp, 1.0 / 250.0);
        match source.pull_sample(timeout) {
            Err(SourceError::Disconnected) => {}
            other => panic!("expected disconnect, got {:?}", other),
        }
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let mut data = dump(&[&[1.0, 2.0, 3.0]]);
        data.truncate(8);
        let mut source = FileSource::new(Cursor::new(data), 3, 250.0).unpaced();
        match source.pull_sample(Duration::from_millis(5)) {
            Err(SourceError::Malformed { expected, got }) => assert_eq!((expected, got), (3, 2)),
            other => panic!("expected malformed frame, got {:?}", other),
        }
    }
}
