use std::fmt;

/// An immutable snapshot of the rolling buffer, as handed to a sink.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Emission counter, starting at zero for the first chunk of a run.
    pub seq: u64,
    /// Stream clock reading taken right after the snapshot.
    pub timestamp: f64,
    data: Vec<Vec<f32>>,
}

impl Chunk {
    pub fn new(seq: u64, timestamp: f64, data: Vec<Vec<f32>>) -> Chunk {
        Chunk {
            seq,
            timestamp,
            data,
        }
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.data.get(index).map(Vec::as_slice)
    }

    /// Per-channel sequences, oldest sample first.
    pub fn data(&self) -> &[Vec<f32>] {
        &self.data
    }

    /// Row-per-sample view, the layout sample-oriented outlets expect.
    pub fn to_samples(&self) -> Vec<Vec<f32>> {
        (0..self.len())
            .map(|i| self.data.iter().map(|ch| ch[i]).collect())
            .collect()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk #{} ({}, {}) @ {:.3}",
            self.seq,
            self.channels(),
            self.len(),
            self.timestamp
        )
    }
}
