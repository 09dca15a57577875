use std::time::Duration;

use crate::error::{PipelineError, Result};

pub const DEFAULT_CHANNELS: usize = 3;
pub const DEFAULT_CAPACITY: usize = 150;
// ~152 ms at 250 Hz
pub const DEFAULT_SEND_EVERY: usize = 38;
pub const DEFAULT_SAMPLE_RATE: f64 = 250.0;

/// What the ingestor does when a cadence boundary is reached while the previous
/// chunk signal has not been cleared yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverrunPolicy {
    /// Leave the pending signal in place; the emitter's snapshot will already carry
    /// the newer samples, so the older chunk is superseded.
    Coalesce,
    /// Stall ingestion until the emitter clears the signal.
    Block,
}

impl std::str::FromStr for OverrunPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<OverrunPolicy> {
        match s {
            "coalesce" => Ok(OverrunPolicy::Coalesce),
            "block" => Ok(OverrunPolicy::Block),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown overrun policy {:?} (expected coalesce or block)",
                other
            ))),
        }
    }
}

/// Bounded exponential backoff for failed source pulls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceRetry {
    /// Consecutive failures tolerated before the pipeline stops. Zero stops on the
    /// first failure.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl SourceRetry {
    pub fn terminate() -> SourceRetry {
        SourceRetry {
            max_attempts: 0,
            ..SourceRetry::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.checked_mul(1 << shift);
        delay.unwrap_or(self.max_backoff).min(self.max_backoff)
    }
}

impl Default for SourceRetry {
    fn default() -> SourceRetry {
        SourceRetry {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelInfo {
    pub label: String,
    pub unit: String,
    pub kind: String,
}

/// Stream metadata handed to the sink once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamDescriptor {
    pub name: String,
    pub kind: String,
    pub source_id: String,
    /// Nominal chunk rate; 0.0 marks an irregular stream.
    pub nominal_rate: f64,
    /// Samples per channel in every chunk.
    pub chunk_size: usize,
    pub channels: Vec<ChannelInfo>,
}

impl StreamDescriptor {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub channels: usize,
    /// Samples per channel kept in the rolling buffer, and the size of each chunk.
    pub capacity: usize,
    /// Accepted samples between chunk emissions.
    pub send_every: usize,
    pub sample_rate: f64,
    /// Value every buffer slot holds before real samples arrive.
    pub fill: f32,
    pub overrun: OverrunPolicy,
    pub retry: SourceRetry,
    /// Upper bound on any single blocking wait, and so on how long either task takes
    /// to notice a shutdown request.
    pub shutdown_timeout: Duration,
    /// The emitter reports a liveness warning after waiting this long for a signal.
    pub idle_warning: Duration,
    pub stream_name: String,
    pub stream_type: String,
    pub source_id: String,
    pub channel_labels: Vec<String>,
    pub channel_unit: String,
    pub channel_type: String,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            channels: DEFAULT_CHANNELS,
            capacity: DEFAULT_CAPACITY,
            send_every: DEFAULT_SEND_EVERY,
            sample_rate: DEFAULT_SAMPLE_RATE,
            fill: 0.0,
            overrun: OverrunPolicy::Coalesce,
            retry: SourceRetry::default(),
            shutdown_timeout: Duration::from_millis(250),
            idle_warning: Duration::from_secs(2),
            stream_name: "EMG_Chunk_Stream".to_string(),
            stream_type: "EMG_chunk".to_string(),
            source_id: "chunkforward".to_string(),
            channel_labels: Vec::new(),
            channel_unit: "microvolts".to_string(),
            channel_type: "EMG".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn new(channels: usize, capacity: usize, send_every: usize) -> PipelineConfig {
        PipelineConfig {
            channels,
            capacity,
            send_every,
            ..PipelineConfig::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.channels == 0 {
            return invalid("channel count must be at least 1".into());
        }
        if self.capacity == 0 {
            return invalid("buffer capacity must be at least 1".into());
        }
        if self.send_every == 0 {
            return invalid("send_every must be at least 1".into());
        }
        if !(self.sample_rate > 0.0) {
            return invalid(format!("sample rate {} is not positive", self.sample_rate));
        }
        if self.shutdown_timeout == Duration::from_secs(0) {
            return invalid("shutdown timeout must be non-zero".into());
        }
        if self.idle_warning == Duration::from_secs(0) {
            return invalid("idle warning must be non-zero".into());
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return invalid("initial backoff exceeds max backoff".into());
        }
        if !self.channel_labels.is_empty() && self.channel_labels.len() != self.channels {
            return invalid(format!(
                "{} channel labels given for {} channels",
                self.channel_labels.len(),
                self.channels
            ));
        }
        Ok(())
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        let channels = (0..self.channels)
            .map(|i| ChannelInfo {
                label: self
                    .channel_labels
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("{}{}", self.channel_type, i + 1)),
                unit: self.channel_unit.clone(),
                kind: self.channel_type.clone(),
            })
            .collect();

        StreamDescriptor {
            name: self.stream_name.clone(),
            kind: self.stream_type.clone(),
            source_id: self.source_id.clone(),
            nominal_rate: 0.0,
            chunk_size: self.capacity,
            channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_sizes() {
        assert!(PipelineConfig::new(0, 10, 2).validate().is_err());
        assert!(PipelineConfig::new(2, 0, 2).validate().is_err());
        assert!(PipelineConfig::new(2, 10, 0).validate().is_err());
    }

    #[test]
    fn rejects_mismatched_labels() {
        let mut cfg = PipelineConfig::new(2, 10, 2);
        cfg.channel_labels = vec!["a".into()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn descriptor_labels_default_to_type_and_index() {
        let desc = PipelineConfig::default().descriptor();
        let labels: Vec<_> = desc.channels.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["EMG1", "EMG2", "EMG3"]);
        assert_eq!(desc.chunk_size, DEFAULT_CAPACITY);
        assert_eq!(desc.channels[0].unit, "microvolts");
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let retry = SourceRetry::default();
        assert_eq!(retry.backoff(1), Duration::from_millis(20));
        assert_eq!(retry.backoff(2), Duration::from_millis(40));
        assert_eq!(retry.backoff(3), Duration::from_millis(80));
        assert_eq!(retry.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn parses_overrun_policy() {
        assert_eq!("block".parse::<OverrunPolicy>().ok(), Some(OverrunPolicy::Block));
        assert!("drop".parse::<OverrunPolicy>().is_err());
    }
}
