use bytemuck::{Pod, Zeroable};

/// Per-sprite instance data uploaded to the GPU each frame.
/// Stride = 20 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DotInstance {
    /// Center position in physical pixels.
    pub position: [f32; 2],
    /// Quad half-extent in physical pixels.
    pub half_size: f32,
    /// Opacity multiplier on the (premultiplied) sprite sample.
    pub alpha: f32,
    /// Atlas frame index (see `sprite::FRAME_*`).
    pub frame: u32,
}

impl DotInstance {
    pub fn new(x: f32, y: f32, half_size: f32, alpha: f32, frame: u32) -> Self {
        Self {
            position: [x, y],
            half_size,
            alpha,
            frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_matches_vertex_layout() {
        assert_eq!(std::mem::size_of::<DotInstance>(), 20);
    }
}
