/// Highest quality level.
pub const MAX_LEVEL: u8 = 3;
/// EMA weight for new frame-time samples.
const EMA_ALPHA: f32 = 0.1;
/// Lower the level when the smoothed frame time exceeds this.
const LOWER_MS: f32 = 22.0;
/// Raise the level when the smoothed frame time drops below this.
const RAISE_MS: f32 = 14.0;
/// Physics dt clamp applied at the low levels.
const DT_CLAMP: f32 = 1.0 / 30.0;

/// Feedback controller that trades visual fidelity for frame-time budget.
///
/// A single EMA of measured frame cost drives a discrete level in
/// {0,1,2,3}; the gap between the raise and lower thresholds is the
/// hysteresis that keeps it from oscillating at a boundary. State persists
/// for the life of the process.
pub struct QualityController {
    level: u8,
    ema_ms: f32,
}

impl QualityController {
    pub fn new() -> Self {
        Self {
            level: MAX_LEVEL,
            ema_ms: 0.0,
        }
    }

    /// Feed one measured frame cost. The level moves at most one step.
    pub fn update(&mut self, sample_ms: f32) {
        self.ema_ms = self.ema_ms * (1.0 - EMA_ALPHA) + sample_ms * EMA_ALPHA;
        if self.ema_ms > LOWER_MS && self.level > 0 {
            self.level -= 1;
            log::debug!("quality lowered to {} (ema {:.1}ms)", self.level, self.ema_ms);
        } else if self.ema_ms < RAISE_MS && self.level < MAX_LEVEL {
            self.level += 1;
            log::debug!("quality raised to {} (ema {:.1}ms)", self.level, self.ema_ms);
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn ema_ms(&self) -> f32 {
        self.ema_ms
    }

    /// Clamp the physics timestep at the low levels so a slow device's huge
    /// frame deltas chunk the motion instead of destabilizing it.
    pub fn clamp_dt(&self, dt: f32) -> f32 {
        if self.level <= 1 {
            dt.min(DT_CLAMP)
        } else {
            dt
        }
    }

    /// Temporal draw-thinning modulus: every `m`-th point (rotating with
    /// the frame index) is skipped. 0 means draw everything.
    pub fn thin_modulus(&self) -> u64 {
        match self.level {
            3 => 0,
            2 => 4,
            _ => 2,
        }
    }

    /// Bloom is the first cost shed after thinning.
    pub fn bloom_allowed(&self) -> bool {
        self.level >= 2
    }

    pub fn stars_allowed(&self) -> bool {
        self.level >= 1
    }

    /// Scale on spark spawn probability.
    pub fn particle_scale(&self) -> f32 {
        match self.level {
            3 => 1.0,
            2 => 0.7,
            1 => 0.35,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_full_quality() {
        assert_eq!(QualityController::new().level(), 3);
    }

    #[test]
    fn constant_slow_frames_drive_level_to_zero_and_hold() {
        let mut q = QualityController::new();
        for _ in 0..200 {
            q.update(30.0);
            assert!(q.level() <= MAX_LEVEL);
        }
        assert_eq!(q.level(), 0);
        q.update(30.0);
        assert_eq!(q.level(), 0);
    }

    #[test]
    fn constant_fast_frames_recover_full_quality() {
        let mut q = QualityController::new();
        for _ in 0..200 {
            q.update(30.0);
        }
        assert_eq!(q.level(), 0);
        for _ in 0..200 {
            q.update(10.0);
        }
        assert_eq!(q.level(), 3);
    }

    #[test]
    fn level_moves_at_most_one_step_per_update() {
        let mut q = QualityController::new();
        let mut prev = q.level();
        for _ in 0..100 {
            q.update(35.0);
            let lvl = q.level();
            assert!(prev.abs_diff(lvl) <= 1);
            prev = lvl;
        }
    }

    #[test]
    fn hysteresis_band_holds_steady() {
        let mut q = QualityController::new();
        // Drop one level first.
        for _ in 0..50 {
            q.update(30.0);
        }
        let settled = q.level();
        // 18ms sits between the 14/22 thresholds: no movement either way.
        for _ in 0..300 {
            q.update(18.0);
        }
        assert_eq!(q.level(), settled);
    }

    #[test]
    fn dt_clamp_only_at_low_levels() {
        let mut q = QualityController::new();
        assert_eq!(q.clamp_dt(0.1), 0.1);
        for _ in 0..200 {
            q.update(30.0);
        }
        assert!(q.level() <= 1);
        assert_eq!(q.clamp_dt(0.1), DT_CLAMP);
    }

    #[test]
    fn gates_follow_level() {
        let mut q = QualityController::new();
        assert_eq!(q.thin_modulus(), 0);
        assert!(q.bloom_allowed());
        assert_eq!(q.particle_scale(), 1.0);
        for _ in 0..200 {
            q.update(30.0);
        }
        assert_eq!(q.thin_modulus(), 2);
        assert!(!q.bloom_allowed());
        assert!(!q.stars_allowed());
        assert_eq!(q.particle_scale(), 0.0);
    }
}
