use glam::Vec2;

/// Scales spark velocity into position change per second.
const VEL_SCALE: f32 = 1.0;
/// Spawn velocity perturbation range in px/s.
const SPAWN_JITTER: f32 = 40.0;
/// Fraction of the pointer delta that becomes spawn velocity.
const SPAWN_VEL_GAIN: f32 = 0.55;

/// A transient spark spawned by pointer motion. Lives in the pool only;
/// `life` is the remaining fraction, counting down from 1.
#[derive(Debug, Clone, Copy)]
struct Spark {
    pos: Vec2,
    vel: Vec2,
    life: f32,
    max_life: f32,
}

/// Fixed-capacity spark pool. Spawning past capacity recycles slot 0
/// (oldest-replacement) instead of growing — bounded memory, no allocation
/// after construction.
pub struct SparkPool {
    sparks: Vec<Spark>,
    capacity: usize,
}

impl SparkPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            sparks: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Insert a spark, recycling the first slot when full.
    pub fn spawn(&mut self, pos: Vec2, vel: Vec2, max_life: f32) {
        let spark = Spark {
            pos,
            vel,
            life: 1.0,
            max_life: max_life.max(0.05),
        };
        if self.sparks.len() < self.capacity {
            self.sparks.push(spark);
        } else {
            self.sparks[0] = spark;
        }
    }

    /// Spawn from a pointer movement delta: velocity follows the gesture
    /// plus a small random perturbation so identical gestures don't produce
    /// identical trajectories.
    pub fn spawn_from_pointer(
        &mut self,
        pos: Vec2,
        pointer_delta: Vec2,
        dt: f32,
        rng: &mut fastrand::Rng,
    ) {
        let vel = pointer_delta / dt.max(1e-3) * SPAWN_VEL_GAIN
            + Vec2::new(
                (rng.f32() * 2.0 - 1.0) * SPAWN_JITTER,
                (rng.f32() * 2.0 - 1.0) * SPAWN_JITTER,
            );
        let max_life = 0.5 + rng.f32() * 0.6;
        self.spawn(pos, vel, max_life);
    }

    /// Advance all sparks one tick. Dead sparks are swap-removed; live ones
    /// report an injection via `inject(pos, speed, dt)` so they act as a
    /// diffuse secondary heat source.
    ///
    /// `damping` is a per-frame factor at a 60 Hz reference; the caller
    /// passes a lower value once the pointer has gone idle so sparks settle
    /// faster.
    pub fn step(&mut self, dt: f32, damping: f32, mut inject: impl FnMut(Vec2, f32, f32)) {
        let drag = damping.powf(dt * 60.0);
        let mut i = 0;
        while i < self.sparks.len() {
            let s = &mut self.sparks[i];
            s.vel *= drag;
            s.pos += s.vel * dt * VEL_SCALE;
            s.life -= dt / s.max_life;

            if s.life <= 0.0 {
                self.sparks.swap_remove(i);
            } else {
                let (pos, speed) = (s.pos, s.vel.length());
                inject(pos, speed, dt);
                i += 1;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.sparks.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Position, speed and remaining-life fraction per live spark, for the
    /// draw pass.
    pub fn iter(&self) -> impl Iterator<Item = (Vec2, f32, f32)> + '_ {
        self.sparks.iter().map(|s| (s.pos, s.vel.length(), s.life))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_never_exceeds_capacity() {
        let mut pool = SparkPool::new(800);
        for i in 0..801 {
            pool.spawn(Vec2::new(i as f32, 0.0), Vec2::ZERO, 1.0);
        }
        assert_eq!(pool.count(), 800);
        assert_eq!(pool.capacity(), 800);
    }

    #[test]
    fn overflow_recycles_slot_zero() {
        let mut pool = SparkPool::new(800);
        for i in 0..800 {
            pool.spawn(Vec2::new(i as f32, 0.0), Vec2::ZERO, 1.0);
        }
        pool.spawn(Vec2::new(9999.0, 0.0), Vec2::ZERO, 1.0);
        assert_eq!(pool.count(), 800);
        let first = pool.iter().next().unwrap();
        assert_eq!(first.0, Vec2::new(9999.0, 0.0));
    }

    #[test]
    fn dead_sparks_are_removed_live_ones_inject() {
        let mut pool = SparkPool::new(16);
        pool.spawn(Vec2::ZERO, Vec2::new(100.0, 0.0), 10.0); // long-lived
        pool.spawn(Vec2::ZERO, Vec2::ZERO, 0.05); // dies on first step

        let mut injections = 0;
        pool.step(0.1, 0.92, |_, _, _| injections += 1);
        assert_eq!(pool.count(), 1);
        assert_eq!(injections, 1);
    }

    #[test]
    fn drag_slows_sparks() {
        let mut pool = SparkPool::new(4);
        pool.spawn(Vec2::ZERO, Vec2::new(200.0, 0.0), 10.0);
        let mut speed_after = 0.0;
        pool.step(1.0 / 60.0, 0.92, |_, speed, _| speed_after = speed);
        assert!(speed_after < 200.0);
        assert!(speed_after > 0.0);
    }

    #[test]
    fn idle_damping_settles_faster() {
        let mut moving = SparkPool::new(4);
        let mut idle = SparkPool::new(4);
        moving.spawn(Vec2::ZERO, Vec2::new(200.0, 0.0), 10.0);
        idle.spawn(Vec2::ZERO, Vec2::new(200.0, 0.0), 10.0);

        let mut v_moving = 0.0;
        let mut v_idle = 0.0;
        moving.step(1.0 / 60.0, 0.92, |_, s, _| v_moving = s);
        idle.step(1.0 / 60.0, 0.82, |_, s, _| v_idle = s);
        assert!(v_idle < v_moving);
    }

    #[test]
    fn spawn_from_pointer_perturbs_velocity() {
        let mut pool = SparkPool::new(8);
        let mut rng = fastrand::Rng::with_seed(7);
        pool.spawn_from_pointer(Vec2::ZERO, Vec2::new(16.0, 0.0), 0.016, &mut rng);
        pool.spawn_from_pointer(Vec2::ZERO, Vec2::new(16.0, 0.0), 0.016, &mut rng);
        let speeds: Vec<f32> = pool.iter().map(|(_, s, _)| s).collect();
        assert_ne!(speeds[0], speeds[1]);
    }
}
