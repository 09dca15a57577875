//! Transforms applied to a chunk snapshot before it is forwarded.
//!
//! A hook sees the per-channel sequences of one chunk, oldest sample first, and
//! rewrites them in place. Hooks run on the emitter thread.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Q_BUTTERWORTH_F32};
use log::*;

use crate::error::{PipelineError, Result};

pub trait ChunkHook: Send {
    fn process(&mut self, data: &mut [Vec<f32>]);

    fn name(&self) -> &str {
        "hook"
    }
}

impl<F> ChunkHook for F
where
    F: FnMut(&mut [Vec<f32>]) + Send,
{
    fn process(&mut self, data: &mut [Vec<f32>]) {
        self(data)
    }

    fn name(&self) -> &str {
        "fn"
    }
}

/// Second-order Butterworth high-pass, for removing DC offset and drift.
///
/// Each channel of each chunk is filtered from a zeroed state, so consecutive
/// (overlapping) chunks do not feed into each other.
pub struct HighPassHook {
    coeffs: Coefficients<f32>,
}

impl HighPassHook {
    pub fn new(sample_rate: f32, cutoff: f32) -> Result<HighPassHook> {
        let coeffs = Coefficients::<f32>::from_params(
            biquad::Type::HighPass,
            sample_rate.hz(),
            cutoff.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| {
            PipelineError::InvalidConfig(format!(
                "high-pass cutoff {} Hz at {} Hz sample rate: {:?}",
                cutoff, sample_rate, e
            ))
        })?;

        debug!("high-pass hook: cutoff {} Hz, fs {} Hz", cutoff, sample_rate);
        Ok(HighPassHook { coeffs })
    }
}

impl ChunkHook for HighPassHook {
    fn process(&mut self, data: &mut [Vec<f32>]) {
        for channel in data.iter_mut() {
            let mut filter = DirectForm2Transposed::<f32>::new(self.coeffs);
            for v in channel.iter_mut() {
                *v = filter.run(*v);
            }
        }
    }

    fn name(&self) -> &str {
        "highpass"
    }
}

/// Subtracts each channel's mean.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetrendHook;

impl ChunkHook for DetrendHook {
    fn process(&mut self, data: &mut [Vec<f32>]) {
        for channel in data.iter_mut() {
            if channel.is_empty() {
                continue;
            }
            let mean = channel.iter().sum::<f32>() / channel.len() as f32;
            for v in channel.iter_mut() {
                *v -= mean;
            }
        }
    }

    fn name(&self) -> &str {
        "detrend"
    }
}

/// Runs hooks in order.
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Box<dyn ChunkHook>>,
}

impl HookChain {
    pub fn new() -> HookChain {
        HookChain::default()
    }

    pub fn with<H: ChunkHook + 'static>(mut self, hook: H) -> HookChain {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }
}

impl ChunkHook for HookChain {
    fn process(&mut self, data: &mut [Vec<f32>]) {
        for hook in self.hooks.iter_mut() {
            trace!("running {} hook", hook.name());
            hook.process(data);
        }
    }

    fn name(&self) -> &str {
        "chain"
    }
}
