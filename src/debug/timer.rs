use instant::Instant;

/// Which stage of the frame is being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Input = 0,
    Particles = 1,
    Heat = 2,
    Layout = 3,
    GpuUpload = 4,
    RenderSubmit = 5,
    Overlay = 6,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Self::Input,
        Self::Particles,
        Self::Heat,
        Self::Layout,
        Self::GpuUpload,
        Self::RenderSubmit,
        Self::Overlay,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::Particles => "Particles",
            Self::Heat => "Heat",
            Self::Layout => "Layout",
            Self::GpuUpload => "GPU Upload",
            Self::RenderSubmit => "Render",
            Self::Overlay => "Overlay",
        }
    }
}

const EMA_ALPHA: f64 = 0.1;

/// Per-phase frame timing with exponential moving average smoothing.
pub struct PhaseTimers {
    /// EMA-smoothed duration in microseconds per phase.
    pub durations_us: [f64; 7],
    start: Instant,
}

impl PhaseTimers {
    pub fn new() -> Self {
        Self {
            durations_us: [0.0; 7],
            start: Instant::now(),
        }
    }

    /// Call before a phase runs.
    pub fn begin(&mut self) {
        self.start = Instant::now();
    }

    /// Call after a phase finishes. Records elapsed time for `phase`.
    pub fn end(&mut self, phase: Phase) {
        let elapsed_us = self.start.elapsed().as_secs_f64() * 1_000_000.0;
        let idx = phase as usize;
        self.durations_us[idx] =
            self.durations_us[idx] * (1.0 - EMA_ALPHA) + elapsed_us * EMA_ALPHA;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_accumulates_into_the_right_slot() {
        let mut t = PhaseTimers::new();
        t.begin();
        t.end(Phase::Heat);
        assert!(t.durations_us[Phase::Heat as usize] >= 0.0);
        assert_eq!(t.durations_us[Phase::Input as usize], 0.0);
    }
}
