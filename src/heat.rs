use glam::Vec2;

use crate::config::EngineConfig;
use crate::input::PointerSample;

pub mod worker;

/// Cap on how much a single injection can add to one point. Keeps one fast
/// swipe from saturating a dot instantly.
const INJECT_CAP: f32 = 0.22;
/// Minimum segment subdivision step in pixels.
const MIN_STEP_PX: f32 = 6.0;
/// Sub-step length as a fraction of the lattice spacing.
const STEP_SPACING_FACTOR: f32 = 0.75;
/// Speed factors below this inject nothing worth iterating the cells for.
const FACTOR_FLOOR: f32 = 1e-4;

/// Tuning shared by the synchronous path and the worker's private copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatParams {
    pub spacing: f32,
    pub influence_radius: f32,
    pub heat_gain: f32,
    pub heat_decay: f32,
    pub speed_gain: f32,
    pub speed_gamma: f32,
}

impl HeatParams {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            spacing: cfg.spacing,
            influence_radius: cfg.influence_radius,
            heat_gain: cfg.heat_gain,
            heat_decay: cfg.heat_decay,
            speed_gain: cfg.speed_gain,
            speed_gamma: cfg.speed_gamma,
        }
    }
}

/// One heat injection: a position, the speed of whatever passed through it,
/// and the slice of time it was there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InjectCmd {
    pub pos: Vec2,
    /// px/s of the pointer or particle at this sample.
    pub speed: f32,
    pub dt: f32,
}

/// Add heat around `cmd.pos` to every lattice point within the influence
/// radius. Bounded cell-range search, never a full-grid scan. Heat
/// saturates at 1.
pub fn inject(heats: &mut [f32], cols: usize, rows: usize, p: &HeatParams, cmd: InjectCmd) {
    if heats.is_empty() {
        return;
    }
    // Saturating speed response raised past 1 so slow motion stays cold.
    let factor = (cmd.speed / p.speed_gain).tanh().powf(p.speed_gamma);
    if factor < FACTOR_FLOOR {
        return;
    }

    // Distance actually traveled during this call; makes the injected
    // amount invariant to sampling frequency.
    let travel = cmd.speed * cmd.dt;
    let base = travel / p.spacing * factor * p.heat_gain;

    let r = p.influence_radius;
    let gx0 = (((cmd.pos.x - r) / p.spacing).floor().max(0.0)) as usize;
    let gy0 = (((cmd.pos.y - r) / p.spacing).floor().max(0.0)) as usize;
    let gx1 = ((((cmd.pos.x + r) / p.spacing).ceil()) as usize).min(cols.saturating_sub(1));
    let gy1 = ((((cmd.pos.y + r) / p.spacing).ceil()) as usize).min(rows.saturating_sub(1));
    if gx0 > gx1 || gy0 > gy1 {
        return;
    }

    let inv_r = 1.0 / r;
    for gy in gy0..=gy1 {
        let py = gy as f32 * p.spacing;
        let row = gy * cols;
        for gx in gx0..=gx1 {
            let px = gx as f32 * p.spacing;
            let dist = Vec2::new(px - cmd.pos.x, py - cmd.pos.y).length();
            let t = 1.0 - dist * inv_r;
            if t <= 0.0 {
                continue;
            }
            // Cubed so influence is sharply localized around the sample.
            let add = (base * t * t * t).min(INJECT_CAP);
            let h = &mut heats[row + gx];
            *h = (*h + add).min(1.0);
        }
    }
}

/// Linear decay, clamped at zero, independent of current value.
pub fn decay(heats: &mut [f32], decay_per_sec: f32, dt: f32) {
    let amount = decay_per_sec * dt;
    for h in heats.iter_mut() {
        *h = (*h - amount).max(0.0);
    }
}

/// Subdivide the segment between two consecutive raw samples into inject
/// commands so fast trajectories leave a continuous trail instead of
/// isolated splats. `dt` is divided evenly across the sub-steps.
pub fn segment_cmds(
    prev: PointerSample,
    curr: PointerSample,
    spacing: f32,
    out: &mut Vec<InjectCmd>,
) {
    let delta = curr.pos - prev.pos;
    let dist = delta.length();
    let dt = ((curr.time - prev.time).max(1e-4)) as f32;
    let speed = dist / dt;
    if dist <= f32::EPSILON {
        return;
    }

    let step = MIN_STEP_PX.max(spacing * STEP_SPACING_FACTOR);
    let n = ((dist / step).ceil() as usize).max(1);
    let sub_dt = dt / n as f32;
    for k in 1..=n {
        let t = k as f32 / n as f32;
        out.push(InjectCmd {
            pos: prev.pos + delta * t,
            speed,
            dt: sub_dt,
        });
    }
}

enum Backend {
    Local,
    Threaded(worker::WorkerHandle),
}

/// Heat simulation facade. Injection commands queue up during the frame and
/// `step` applies them plus one decay tick — either synchronously, or on a
/// background worker that owns its private buffer and ships back whole
/// snapshots (last-update-wins, up to one frame stale).
///
/// Callers cannot tell the two paths apart; a failed worker spawn or a dead
/// worker degrades to the synchronous path with the same signatures.
pub struct HeatSim {
    params: HeatParams,
    cols: usize,
    rows: usize,
    pending: Vec<InjectCmd>,
    backend: Backend,
}

impl HeatSim {
    pub fn new(params: HeatParams, cols: usize, rows: usize, use_worker: bool) -> Self {
        let backend = if use_worker {
            match worker::spawn(params, cols, rows) {
                Ok(handle) => Backend::Threaded(handle),
                Err(e) => {
                    log::warn!("heat worker spawn failed ({e}); running decay on the render thread");
                    Backend::Local
                }
            }
        } else {
            Backend::Local
        };
        Self {
            params,
            cols,
            rows,
            pending: Vec::with_capacity(256),
            backend,
        }
    }

    pub fn is_threaded(&self) -> bool {
        matches!(self.backend, Backend::Threaded(_))
    }

    /// Track a grid rebuild. The worker clears and resizes its private copy.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.cols = cols;
        self.rows = rows;
        let died = match &self.backend {
            Backend::Threaded(handle) => {
                handle.tx.send(worker::Cmd::Resize { cols, rows }).is_err()
            }
            Backend::Local => false,
        };
        if died {
            self.fall_back();
        }
    }

    pub fn retune(&mut self, params: HeatParams) {
        self.params = params;
        let died = match &self.backend {
            Backend::Threaded(handle) => handle.tx.send(worker::Cmd::Tune(params)).is_err(),
            Backend::Local => false,
        };
        if died {
            self.fall_back();
        }
    }

    /// Queue one injection for this frame's step.
    pub fn queue(&mut self, cmd: InjectCmd) {
        self.pending.push(cmd);
    }

    /// Queue injections along a pointer segment.
    pub fn queue_segment(&mut self, prev: PointerSample, curr: PointerSample) {
        let spacing = self.params.spacing;
        segment_cmds(prev, curr, spacing, &mut self.pending);
    }

    /// Apply this frame's queued injections and one decay tick to `heats`.
    ///
    /// Threaded: commands and the step are fire-and-forget messages; the
    /// newest snapshot received (if any) replaces `heats` wholesale and the
    /// displaced buffer is recycled back to the worker.
    pub fn step(&mut self, heats: &mut Vec<f32>, dt: f32) {
        let died = match &self.backend {
            Backend::Local => {
                for cmd in self.pending.drain(..) {
                    inject(heats, self.cols, self.rows, &self.params, cmd);
                }
                decay(heats, self.params.heat_decay, dt);
                return;
            }
            Backend::Threaded(handle) => {
                let batch = std::mem::take(&mut self.pending);
                let sent = (batch.is_empty() || handle.tx.send(worker::Cmd::Inject(batch)).is_ok())
                    && handle.tx.send(worker::Cmd::Step { dt }).is_ok();
                if sent {
                    let mut latest: Option<Vec<f32>> = None;
                    while let Ok(buf) = handle.rx.try_recv() {
                        if let Some(old) = latest.replace(buf) {
                            let _ = handle.recycle_tx.send(old);
                        }
                    }
                    if let Some(buf) = latest {
                        if buf.len() == heats.len() {
                            let old = std::mem::replace(heats, buf);
                            let _ = handle.recycle_tx.send(old);
                        } else {
                            // Snapshot from before a resize; ignore it.
                            let _ = handle.recycle_tx.send(buf);
                        }
                    }
                }
                !sent
            }
        };
        if died {
            self.fall_back();
            // Keep this frame moving on the main copy.
            decay(heats, self.params.heat_decay, dt);
        }
    }

    fn fall_back(&mut self) {
        log::warn!("heat worker unreachable; falling back to synchronous decay");
        self.backend = Backend::Local;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HeatParams {
        HeatParams {
            spacing: 24.0,
            influence_radius: 180.0,
            heat_gain: 0.9,
            heat_decay: 0.45,
            speed_gain: 900.0,
            speed_gamma: 1.6,
        }
    }

    fn grid_800x600() -> (Vec<f32>, usize, usize) {
        let cols = (800.0f32 / 24.0).ceil() as usize + 1;
        let rows = (600.0f32 / 24.0).ceil() as usize + 1;
        (vec![0.0; cols * rows], cols, rows)
    }

    #[test]
    fn injection_heats_nearby_and_skips_far_points() {
        let (mut heats, cols, rows) = grid_800x600();
        let p = params();
        inject(
            &mut heats,
            cols,
            rows,
            &p,
            InjectCmd {
                pos: Vec2::new(100.0, 100.0),
                speed: 500.0,
                dt: 0.016,
            },
        );

        // Point nearest (100,100) is (96,96) = (4,4).
        assert!(heats[4 * cols + 4] > 0.0);
        // (100,500) is ~400px away, outside the 180px radius.
        let far = (500.0f32 / 24.0).round() as usize * cols + 4;
        assert_eq!(heats[far], 0.0);
    }

    #[test]
    fn heat_stays_clamped_under_hammering() {
        let (mut heats, cols, rows) = grid_800x600();
        let p = params();
        for i in 0..500 {
            inject(
                &mut heats,
                cols,
                rows,
                &p,
                InjectCmd {
                    pos: Vec2::new(100.0 + (i % 7) as f32, 100.0),
                    speed: 4000.0,
                    dt: 0.016,
                },
            );
        }
        assert!(heats.iter().all(|&h| (0.0..=1.0).contains(&h)));
        // Hammered points actually saturate.
        assert_eq!(heats[4 * cols + 4], 1.0);
    }

    #[test]
    fn slow_motion_stays_cold() {
        let (mut heats, cols, rows) = grid_800x600();
        inject(
            &mut heats,
            cols,
            rows,
            &params(),
            InjectCmd {
                pos: Vec2::new(100.0, 100.0),
                speed: 3.0,
                dt: 0.016,
            },
        );
        assert!(heats[4 * cols + 4] < 1e-4);
    }

    #[test]
    fn decay_is_linear_and_clamps_at_zero() {
        let mut heats = vec![0.5, 1.0, 0.0];
        decay(&mut heats, 0.9, 1.0);
        assert_eq!(heats, vec![0.0, 0.1, 0.0]);
        decay(&mut heats, 0.45, 0.1);
        assert!(heats.iter().all(|&h| h >= 0.0));
    }

    #[test]
    fn decay_never_increases() {
        let mut heats = vec![0.3; 64];
        let before = heats.clone();
        decay(&mut heats, 0.45, 0.016);
        for (a, b) in heats.iter().zip(&before) {
            assert!(a < b);
        }
    }

    #[test]
    fn segment_subdivides_with_even_dt() {
        let prev = PointerSample {
            pos: Vec2::new(0.0, 0.0),
            time: 0.0,
        };
        let curr = PointerSample {
            pos: Vec2::new(120.0, 0.0),
            time: 0.016,
        };
        let mut out = Vec::new();
        segment_cmds(prev, curr, 24.0, &mut out);

        // 120px at max(6, 24*0.75)=18px steps -> 7 sub-steps.
        assert_eq!(out.len(), 7);
        let total_dt: f32 = out.iter().map(|c| c.dt).sum();
        assert!((total_dt - 0.016).abs() < 1e-5);
        // Sub-steps land on the segment, ending at the new sample.
        assert_eq!(out.last().unwrap().pos, Vec2::new(120.0, 0.0));
        for c in &out {
            assert_eq!(c.pos.y, 0.0);
            assert!((0.0..=120.0).contains(&c.pos.x));
        }
    }

    #[test]
    fn zero_length_segment_emits_nothing() {
        let s = PointerSample {
            pos: Vec2::new(5.0, 5.0),
            time: 0.0,
        };
        let mut out = Vec::new();
        segment_cmds(
            s,
            PointerSample {
                pos: s.pos,
                time: 0.016,
            },
            24.0,
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn local_sim_applies_queue_then_decay() {
        let (mut heats, cols, rows) = grid_800x600();
        let mut sim = HeatSim::new(params(), cols, rows, false);
        assert!(!sim.is_threaded());
        sim.queue(InjectCmd {
            pos: Vec2::new(100.0, 100.0),
            speed: 500.0,
            dt: 0.016,
        });
        sim.step(&mut heats, 0.016);
        assert!(heats[4 * cols + 4] > 0.0);

        // Pure decay from here on: strictly decreasing until zero.
        let before = heats[4 * cols + 4];
        sim.step(&mut heats, 0.016);
        assert!(heats[4 * cols + 4] < before);
    }
}
