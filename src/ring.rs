use crate::error::{PipelineError, Result};

/// Fixed-capacity rolling buffer holding the most recent `capacity` values of every
/// channel.
///
/// Storage is one contiguous block laid out channel-major, so channel `c` lives at
/// `c * capacity .. (c + 1) * capacity`. Every slot starts at the fill value and the
/// oldest value of a channel is overwritten once that channel wraps.
#[derive(Clone, Debug)]
pub struct SampleRing {
    data: Box<[f32]>,
    // next slot to write, per channel
    heads: Box<[usize]>,
    channels: usize,
    capacity: usize,
    fill: f32,
    appended: u64,
}

impl SampleRing {
    pub fn new(channels: usize, capacity: usize, fill: f32) -> Result<SampleRing> {
        if channels == 0 || capacity == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "ring buffer needs at least one channel and one slot ({}x{})",
                channels, capacity
            )));
        }

        Ok(SampleRing {
            data: vec![fill; channels * capacity].into_boxed_slice(),
            heads: vec![0; channels].into_boxed_slice(),
            channels,
            capacity,
            fill,
            appended: 0,
        })
    }

    /// Whole samples written since construction.
    pub fn samples_written(&self) -> u64 {
        self.appended
    }

    /// Writes one value to `channel`, overwriting its oldest value once full.
    pub fn append(&mut self, channel: usize, value: f32) -> Result<()> {
        if channel >= self.channels {
            return Err(PipelineError::InvalidChannel {
                index: channel,
                channels: self.channels,
            });
        }

        let head = self.heads[channel];
        self.data[channel * self.capacity + head] = value;
        self.heads[channel] = (head + 1) % self.capacity;
        Ok(())
    }

    /// Appends one value to every channel so all channels advance together.
    /// A sample of the wrong width leaves the buffer untouched.
    pub fn push(&mut self, sample: &[f32]) -> Result<()> {
        if sample.len() != self.channels {
            return Err(PipelineError::InvalidChannel {
                index: sample.len().min(self.channels),
                channels: self.channels,
            });
        }

        for (channel, value) in sample.iter().enumerate() {
            self.append(channel, *value)?;
        }
        self.appended += 1;
        Ok(())
    }

    /// Copies out every channel, oldest value first.
    pub fn snapshot(&self) -> Vec<Vec<f32>> {
        (0..self.channels).map(|c| self.channel(c)).collect()
    }

    fn channel(&self, channel: usize) -> Vec<f32> {
        let base = channel * self.capacity;
        let head = self.heads[channel];
        let slots = &self.data[base..base + self.capacity];

        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&slots[head..]);
        out.extend_from_slice(&slots[..head]);
        out
    }

    /// Resets every slot to the fill value.
    pub fn clear(&mut self) {
        for v in self.data.iter_mut() {
            *v = self.fill;
        }
        for h in self.heads.iter_mut() {
            *h = 0;
        }
        self.appended = 0;
    }
}
