use std::time::Instant;

/// Monotonic stream clock, in seconds since the pipeline was created.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Clock {
        Clock {
            epoch: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.since(Instant::now())
    }

    pub fn since(&self, at: Instant) -> f64 {
        at.saturating_duration_since(self.epoch).as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Clock {
        Clock::new()
    }
}
