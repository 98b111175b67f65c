//! Prerendered sprite atlas. Drawing thousands of gradient circles per
//! frame is what kills fill rate; instead the dot, the glow and three star
//! tiers are rasterized once into a single RGBA atlas and sampled from the
//! instanced quad shader. Rebuilds happen only when the key (DPR or the
//! driving style values) changes — never inside the render loop.

/// Atlas frame indices, matching the instance `frame` attribute.
pub const FRAME_DOT: u32 = 0;
pub const FRAME_GLOW: u32 = 1;
pub const FRAME_STAR_SMALL: u32 = 2;
pub const FRAME_STAR_MEDIUM: u32 = 3;
pub const FRAME_STAR_LARGE: u32 = 4;
pub const FRAME_COUNT: usize = 5;

/// Star radius tiers as multiples of the dot radius.
const STAR_TIERS: [f32; 3] = [1.8, 2.6, 3.4];
/// Transparent gap between packed frames, in pixels.
const FRAME_GAP: u32 = 2;
/// Peak alpha at the center of the glow gradient.
const GLOW_PEAK: f32 = 0.85;

/// Everything the raster output depends on. Compared on config/DPI change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteKey {
    pub dpr: f32,
    pub dot_size: f32,
    pub dot_color: [f32; 3],
    pub bloom_size_mult: f32,
}

/// One packed frame: UV rect plus the quad half-extent in physical pixels.
#[derive(Debug, Clone, Copy)]
pub struct SpriteFrame {
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
    pub half_size: f32,
}

/// The built atlas: premultiplied RGBA pixels plus per-frame metadata.
pub struct SpriteSheet {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub frames: [SpriteFrame; FRAME_COUNT],
    key: SpriteKey,
}

impl SpriteSheet {
    pub fn needs_rebuild(&self, key: &SpriteKey) -> bool {
        self.key != *key
    }
}

/// Rasterize all frames for the given key.
pub fn build(key: &SpriteKey) -> SpriteSheet {
    let dot_r = (key.dot_size * key.dpr).max(0.5);
    let glow_r = (key.dot_size * key.bloom_size_mult * key.dpr).max(dot_r);

    let radii = [
        dot_r,
        glow_r,
        dot_r * STAR_TIERS[0],
        dot_r * STAR_TIERS[1],
        dot_r * STAR_TIERS[2],
    ];

    // One row, left to right, each frame a square sized to avoid clipping.
    let sides: Vec<u32> = radii.iter().map(|r| (r * 2.0).ceil() as u32 + 2).collect();
    let width: u32 = sides.iter().sum::<u32>() + FRAME_GAP * (FRAME_COUNT as u32 - 1);
    let height: u32 = *sides.iter().max().unwrap_or(&1);

    let mut pixels = vec![0u8; (width * height * 4) as usize];
    let mut frames = [SpriteFrame {
        uv_min: [0.0; 2],
        uv_max: [0.0; 2],
        half_size: 0.0,
    }; FRAME_COUNT];

    let mut x0 = 0u32;
    for (idx, (&side, &radius)) in sides.iter().zip(radii.iter()).enumerate() {
        let cx = side as f32 / 2.0;
        let cy = side as f32 / 2.0;
        // Stars read brighter with the tint pulled toward white.
        let color = if idx >= FRAME_STAR_SMALL as usize {
            lighten(key.dot_color, 0.6)
        } else {
            key.dot_color
        };

        for py in 0..side {
            for px in 0..side {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                let alpha = match idx as u32 {
                    FRAME_DOT => dot_alpha(dx, dy, radius),
                    FRAME_GLOW => glow_alpha(dx, dy, radius),
                    _ => star_alpha(dx, dy, radius),
                };
                if alpha <= 0.0 {
                    continue;
                }
                let o = (((py * width) + x0 + px) * 4) as usize;
                // Premultiplied.
                pixels[o] = (color[0] * alpha * 255.0) as u8;
                pixels[o + 1] = (color[1] * alpha * 255.0) as u8;
                pixels[o + 2] = (color[2] * alpha * 255.0) as u8;
                pixels[o + 3] = (alpha * 255.0) as u8;
            }
        }

        frames[idx] = SpriteFrame {
            uv_min: [x0 as f32 / width as f32, 0.0],
            uv_max: [
                (x0 + side) as f32 / width as f32,
                side as f32 / height as f32,
            ],
            half_size: side as f32 / 2.0,
        };
        x0 += side + FRAME_GAP;
    }

    SpriteSheet {
        pixels,
        width,
        height,
        frames,
        key: *key,
    }
}

/// Solid disc with a one-pixel antialiased rim.
fn dot_alpha(dx: f32, dy: f32, r: f32) -> f32 {
    let d = (dx * dx + dy * dy).sqrt();
    (r - d + 0.5).clamp(0.0, 1.0)
}

/// Radial gradient fading quadratically to transparent at the rim.
fn glow_alpha(dx: f32, dy: f32, r: f32) -> f32 {
    let d = (dx * dx + dy * dy).sqrt();
    let t = (1.0 - d / r).max(0.0);
    t * t * GLOW_PEAK
}

/// Four-point sparkle: a soft core plus sharpened axial spikes.
fn star_alpha(dx: f32, dy: f32, r: f32) -> f32 {
    let d = (dx * dx + dy * dy).sqrt();
    let core = (1.0 - d / (r * 0.45)).max(0.0);
    let spike_h = (1.0 - dx.abs() / r).max(0.0) * (1.0 - dy.abs() / (r * 0.22)).max(0.0);
    let spike_v = (1.0 - dy.abs() / r).max(0.0) * (1.0 - dx.abs() / (r * 0.22)).max(0.0);
    (core * core + spike_h.powi(3) + spike_v.powi(3)).min(1.0)
}

fn lighten(c: [f32; 3], t: f32) -> [f32; 3] {
    [
        c[0] + (1.0 - c[0]) * t,
        c[1] + (1.0 - c[1]) * t,
        c[2] + (1.0 - c[2]) * t,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SpriteKey {
        SpriteKey {
            dpr: 1.0,
            dot_size: 1.6,
            dot_color: [0.82, 0.87, 1.0],
            bloom_size_mult: 6.0,
        }
    }

    #[test]
    fn build_is_deterministic() {
        let a = build(&key());
        let b = build(&key());
        assert_eq!(a.width, b.width);
        assert_eq!(a.height, b.height);
        assert_eq!(a.pixels, b.pixels);
    }

    #[test]
    fn identical_key_needs_no_rebuild() {
        let sheet = build(&key());
        assert!(!sheet.needs_rebuild(&key()));
        let mut changed = key();
        changed.dpr = 2.0;
        assert!(sheet.needs_rebuild(&changed));
        let mut recolored = key();
        recolored.dot_color = [1.0, 0.0, 0.0];
        assert!(sheet.needs_rebuild(&recolored));
    }

    #[test]
    fn dpr_scales_the_raster() {
        let mut hi = key();
        hi.dpr = 2.0;
        let lo_sheet = build(&key());
        let hi_sheet = build(&hi);
        assert!(hi_sheet.width > lo_sheet.width);
        assert!(
            hi_sheet.frames[FRAME_DOT as usize].half_size
                > lo_sheet.frames[FRAME_DOT as usize].half_size
        );
    }

    #[test]
    fn frames_are_opaque_at_center_transparent_at_corner() {
        let sheet = build(&key());
        for frame in &sheet.frames {
            let cx = ((frame.uv_min[0] + frame.uv_max[0]) / 2.0 * sheet.width as f32) as u32;
            let cy = ((frame.uv_min[1] + frame.uv_max[1]) / 2.0 * sheet.height as f32) as u32;
            let center = sheet.pixels[((cy * sheet.width + cx) * 4 + 3) as usize];
            assert!(center > 0, "frame center has no coverage");

            let corner_x = (frame.uv_min[0] * sheet.width as f32) as u32;
            let corner = sheet.pixels[(corner_x * 4 + 3) as usize];
            assert_eq!(corner, 0, "frame corner must stay transparent");
        }
    }

    #[test]
    fn glow_is_larger_than_dot() {
        let sheet = build(&key());
        assert!(
            sheet.frames[FRAME_GLOW as usize].half_size
                > sheet.frames[FRAME_DOT as usize].half_size
        );
    }

    #[test]
    fn star_tiers_increase_in_size() {
        let sheet = build(&key());
        let s = sheet.frames[FRAME_STAR_SMALL as usize].half_size;
        let m = sheet.frames[FRAME_STAR_MEDIUM as usize].half_size;
        let l = sheet.frames[FRAME_STAR_LARGE as usize].half_size;
        assert!(s < m && m < l);
    }

    #[test]
    fn uv_rects_are_disjoint_and_inside_unit_square() {
        let sheet = build(&key());
        for (i, f) in sheet.frames.iter().enumerate() {
            assert!(f.uv_min[0] >= 0.0 && f.uv_max[0] <= 1.0);
            assert!(f.uv_min[1] >= 0.0 && f.uv_max[1] <= 1.0);
            for g in sheet.frames.iter().skip(i + 1) {
                assert!(f.uv_max[0] <= g.uv_min[0] || g.uv_max[0] <= f.uv_min[0]);
            }
        }
    }

    #[test]
    fn premultiplied_alpha_holds() {
        let sheet = build(&key());
        for px in sheet.pixels.chunks_exact(4) {
            assert!(px[0] <= px[3].saturating_add(2));
            assert!(px[1] <= px[3].saturating_add(2));
            assert!(px[2] <= px[3].saturating_add(2));
        }
    }
}
