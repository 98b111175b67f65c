use glam::Vec2;

/// Per-point buffers for the dot lattice.
///
/// All arrays are parallel and sized exactly `cols * rows`; `rebuild`
/// reallocates them together so a partially-resized grid is never
/// observable. Seeds come from a hash of the flat index, so a rebuild at
/// the same dimensions reproduces the same field.
pub struct Grid {
    pub cols: usize,
    pub rows: usize,
    pub spacing: f32,
    pub dpr: f32,
    /// Fixed lattice coordinate per point; immutable until the next rebuild.
    pub base: Vec<Vec2>,
    /// Rendered position; relaxes toward a per-frame target.
    pub pos: Vec<Vec2>,
    /// Accumulated activity in [0, 1].
    pub heat: Vec<f32>,
    /// Per-point deterministic pseudo-random value in [0, 1).
    pub seed: Vec<f32>,
    /// Depth bucket derived from the seed.
    pub layer: Vec<u8>,
    /// Bumped on every rebuild; dependents sized to the old grid compare it.
    generation: u64,
}

impl Grid {
    pub fn new() -> Self {
        Self {
            cols: 0,
            rows: 0,
            spacing: 1.0,
            dpr: 1.0,
            base: Vec::new(),
            pos: Vec::new(),
            heat: Vec::new(),
            seed: Vec::new(),
            layer: Vec::new(),
            generation: 0,
        }
    }

    /// Reallocate and reinitialize every per-point buffer for the given
    /// viewport. Heat is zeroed and displayed positions snap to base.
    pub fn rebuild(&mut self, width: f32, height: f32, spacing: f32, dpr: f32, layers: u32) {
        let spacing = spacing.max(1.0);
        let cols = (width / spacing).ceil() as usize + 1;
        let rows = (height / spacing).ceil() as usize + 1;
        let count = cols * rows;

        self.cols = cols;
        self.rows = rows;
        self.spacing = spacing;
        self.dpr = dpr;

        self.base.clear();
        self.base.reserve_exact(count);
        self.seed.clear();
        self.seed.reserve_exact(count);
        self.layer.clear();
        self.layer.reserve_exact(count);

        let layers = layers.max(1);
        for gy in 0..rows {
            for gx in 0..cols {
                let i = (gy * cols + gx) as u32;
                let s = seed_of(i);
                self.base.push(Vec2::new(gx as f32 * spacing, gy as f32 * spacing));
                self.seed.push(s);
                self.layer.push(((s * layers as f32) as u32).min(layers - 1) as u8);
            }
        }

        self.pos.clear();
        self.pos.extend_from_slice(&self.base);
        self.heat.clear();
        self.heat.resize(count, 0.0);

        self.generation = self.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// Rebuild counter for invalidating viewport-sized dependents.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// SplitMix-style finalizer. Cheap, deterministic, well-mixed for
/// consecutive indices.
pub fn hash_u32(mut x: u32) -> u32 {
    x = x.wrapping_add(0x9e3779b9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x21f0aaad);
    x ^= x >> 15;
    x = x.wrapping_mul(0x735a2d97);
    x ^= x >> 15;
    x
}

/// Per-point seed in [0, 1) from the flat index.
pub fn seed_of(index: u32) -> f32 {
    // Top 24 bits keep the f32 mantissa exact.
    (hash_u32(index) >> 8) as f32 / (1u32 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_dimensions_follow_ceil_plus_one() {
        let mut g = Grid::new();
        g.rebuild(800.0, 600.0, 24.0, 1.0, 3);
        assert_eq!(g.cols, (800.0f32 / 24.0).ceil() as usize + 1);
        assert_eq!(g.rows, (600.0f32 / 24.0).ceil() as usize + 1);
        assert_eq!(g.len(), g.cols * g.rows);
        assert_eq!(g.pos.len(), g.len());
        assert_eq!(g.heat.len(), g.len());
        assert_eq!(g.seed.len(), g.len());
        assert_eq!(g.layer.len(), g.len());
    }

    #[test]
    fn rebuild_is_deterministic() {
        let mut a = Grid::new();
        let mut b = Grid::new();
        a.rebuild(1024.0, 768.0, 20.0, 2.0, 3);
        b.rebuild(1024.0, 768.0, 20.0, 2.0, 3);
        assert_eq!(a.cols, b.cols);
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.base, b.base);
        assert_eq!(a.seed, b.seed);
        assert_eq!(a.layer, b.layer);
    }

    #[test]
    fn resize_leaves_no_stale_state() {
        let mut g = Grid::new();
        g.rebuild(800.0, 600.0, 24.0, 1.0, 3);
        // Dirty the mutable buffers.
        for h in g.heat.iter_mut() {
            *h = 0.7;
        }
        g.pos[0] = Vec2::new(-99.0, -99.0);
        let gen_before = g.generation();

        g.rebuild(1920.0, 1080.0, 24.0, 1.0, 3);
        assert_eq!(g.cols, (1920.0f32 / 24.0).ceil() as usize + 1);
        assert_eq!(g.rows, (1080.0f32 / 24.0).ceil() as usize + 1);
        assert!(g.heat.iter().all(|&h| h == 0.0));
        assert_eq!(g.pos, g.base);
        assert_ne!(g.generation(), gen_before);
    }

    #[test]
    fn seeds_are_in_unit_range_and_layers_bounded() {
        let mut g = Grid::new();
        g.rebuild(640.0, 480.0, 16.0, 1.0, 3);
        for &s in &g.seed {
            assert!((0.0..1.0).contains(&s));
        }
        for &l in &g.layer {
            assert!(l < 3);
        }
        // A healthy hash should populate every layer on a few thousand points.
        for want in 0..3u8 {
            assert!(g.layer.iter().any(|&l| l == want));
        }
    }

    #[test]
    fn hash_differs_for_adjacent_indices() {
        assert_ne!(hash_u32(0), hash_u32(1));
        assert_ne!(seed_of(100), seed_of(101));
    }
}
