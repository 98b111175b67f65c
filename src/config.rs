/// Engine tuning surface. The engine never reads ambient state; the host
/// constructs one of these and pushes changes through `Engine::update_config`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    // --- Lattice ---
    /// Cell size of the dot lattice in physical pixels.
    pub spacing: f32,
    /// Number of depth layers (parallax + thinning buckets).
    pub layers: u32,

    // --- Pointer interaction ---
    /// Radius within which the pointer attracts dots and injects heat.
    pub influence_radius: f32,
    /// Maximum pointer-attraction displacement in pixels.
    pub max_offset: f32,
    /// Power curve applied to normalized pointer distance for attraction.
    pub attract_gamma: f32,
    /// Power curve applied to normalized pointer distance for glow.
    pub proximity_gamma: f32,
    /// Per-frame (60 Hz reference) lerp factor for displayed-position relaxation.
    pub return_lerp: f32,
    /// Whole-field parallax gain from the viewport-center-to-pointer vector.
    pub parallax_center_strength: f32,

    // --- Heat ---
    /// Injection gain.
    pub heat_gain: f32,
    /// Linear decay per second.
    pub heat_decay: f32,
    /// Pointer speed (px/s) at which the tanh response reaches ~0.76.
    pub speed_gain: f32,
    /// Exponent on the speed response; > 1 so slow motion stays cold.
    pub speed_gamma: f32,

    // --- Flow field ---
    /// How fast the organic drift evolves.
    pub flow_time_scale: f32,
    /// Spatial frequency of the noise field.
    pub flow_scale: f32,
    /// Drift displacement amplitude in pixels.
    pub flow_amplitude: f32,

    // --- Appearance ---
    /// Dot radius in logical pixels (scaled by DPR at raster time).
    pub dot_size: f32,
    /// Dot/glow tint, linear RGB.
    pub dot_color: [f32; 3],
    /// Window clear color.
    pub background_color: [f32; 3],

    // --- Bloom ---
    /// Composite opacity of the bloom layer.
    pub bloom_alpha: f32,
    /// Downsample divisor for the bloom buffer (>= 1).
    pub bloom_downscale: u32,
    /// Glow sprite radius as a multiple of the dot radius.
    pub bloom_size_mult: f32,
    /// Per-frame fade of the accumulation buffer; 1.0 clears it entirely.
    pub bloom_fade: f32,
    /// Activation (heat or proximity) above which a point draws glow.
    pub glow_threshold: f32,

    // --- Stars ---
    /// Fraction of points eligible to render as stars.
    pub star_probability: f32,
    /// Activation above which a star emits bloom glow.
    pub star_threshold: f32,

    // --- Particles ---
    /// Fixed spark pool capacity.
    pub particle_capacity: usize,
    /// Per-frame (60 Hz reference) velocity damping while the pointer moves.
    pub particle_damping: f32,
    /// Stronger damping once the pointer has been idle.
    pub particle_idle_damping: f32,
    /// Seconds of no pointer movement before idle damping kicks in.
    pub particle_idle_after: f32,

    // --- Capabilities ---
    /// Offload heat decay + batched injection to a background thread.
    pub worker_offload: bool,
    /// Spawn sparks on pointer movement.
    pub particles: bool,
    /// Render a subset of points as twinkling stars.
    pub stars: bool,
    /// Keep the innermost (strongest-parallax) depth layer.
    pub inner_layer: bool,
    /// Bloom post-process on/off.
    pub bloom: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spacing: 24.0,
            layers: 3,
            influence_radius: 180.0,
            max_offset: 14.0,
            attract_gamma: 2.0,
            proximity_gamma: 2.5,
            return_lerp: 0.12,
            parallax_center_strength: 0.018,
            heat_gain: 0.9,
            heat_decay: 0.45,
            speed_gain: 900.0,
            speed_gamma: 1.6,
            flow_time_scale: 0.06,
            flow_scale: 0.013,
            flow_amplitude: 6.0,
            dot_size: 1.6,
            dot_color: [0.82, 0.87, 1.0],
            background_color: [0.027, 0.031, 0.055],
            bloom_alpha: 0.55,
            bloom_downscale: 4,
            bloom_size_mult: 6.0,
            bloom_fade: 0.35,
            glow_threshold: 0.12,
            star_probability: 0.06,
            star_threshold: 0.25,
            particle_capacity: 800,
            particle_damping: 0.92,
            particle_idle_damping: 0.82,
            particle_idle_after: 0.35,
            worker_offload: true,
            particles: true,
            stars: true,
            inner_layer: true,
            bloom: true,
        }
    }
}

impl EngineConfig {
    /// Depth layer count actually used (the inner layer is a capability).
    pub fn effective_layers(&self) -> u32 {
        if self.inner_layer {
            self.layers
        } else {
            self.layers.saturating_sub(1).max(1)
        }
    }

    /// Apply a partial update. Returns which dependents must rebuild.
    pub fn apply(&mut self, patch: &ConfigPatch) -> ConfigEffects {
        let mut fx = ConfigEffects::default();

        macro_rules! set {
            ($field:ident, $($flag:ident),*) => {
                if let Some(v) = patch.$field {
                    if self.$field != v {
                        self.$field = v;
                        $(fx.$flag = true;)*
                    }
                }
            };
        }

        set!(spacing, rebuild_grid, retune_heat);
        set!(layers, rebuild_grid);
        set!(inner_layer, rebuild_grid);
        set!(influence_radius, retune_heat);
        set!(max_offset,);
        set!(attract_gamma,);
        set!(proximity_gamma,);
        set!(return_lerp,);
        set!(parallax_center_strength,);
        set!(heat_gain, retune_heat);
        set!(heat_decay, retune_heat);
        set!(speed_gain, retune_heat);
        set!(speed_gamma, retune_heat);
        set!(flow_time_scale,);
        set!(flow_scale,);
        set!(flow_amplitude,);
        set!(dot_size, rebuild_sprites);
        set!(dot_color, rebuild_sprites);
        set!(background_color,);
        set!(bloom_alpha,);
        set!(bloom_downscale, resize_bloom);
        set!(bloom_size_mult, rebuild_sprites);
        set!(bloom_fade,);
        set!(glow_threshold,);
        set!(star_probability,);
        set!(star_threshold,);
        set!(particle_damping,);
        set!(particle_idle_damping,);
        set!(particle_idle_after,);
        set!(worker_offload, rebuild_heat_backend);
        set!(particles,);
        set!(stars,);
        set!(bloom,);

        fx
    }
}

/// Partial configuration update; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigPatch {
    pub spacing: Option<f32>,
    pub layers: Option<u32>,
    pub inner_layer: Option<bool>,
    pub influence_radius: Option<f32>,
    pub max_offset: Option<f32>,
    pub attract_gamma: Option<f32>,
    pub proximity_gamma: Option<f32>,
    pub return_lerp: Option<f32>,
    pub parallax_center_strength: Option<f32>,
    pub heat_gain: Option<f32>,
    pub heat_decay: Option<f32>,
    pub speed_gain: Option<f32>,
    pub speed_gamma: Option<f32>,
    pub flow_time_scale: Option<f32>,
    pub flow_scale: Option<f32>,
    pub flow_amplitude: Option<f32>,
    pub dot_size: Option<f32>,
    pub dot_color: Option<[f32; 3]>,
    pub background_color: Option<[f32; 3]>,
    pub bloom_alpha: Option<f32>,
    pub bloom_downscale: Option<u32>,
    pub bloom_size_mult: Option<f32>,
    pub bloom_fade: Option<f32>,
    pub glow_threshold: Option<f32>,
    pub star_probability: Option<f32>,
    pub star_threshold: Option<f32>,
    pub particle_damping: Option<f32>,
    pub particle_idle_damping: Option<f32>,
    pub particle_idle_after: Option<f32>,
    pub worker_offload: Option<bool>,
    pub particles: Option<bool>,
    pub stars: Option<bool>,
    pub bloom: Option<bool>,
}

/// What a config change invalidates downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigEffects {
    pub rebuild_grid: bool,
    pub rebuild_sprites: bool,
    pub resize_bloom: bool,
    pub retune_heat: bool,
    pub rebuild_heat_backend: bool,
}

impl ConfigEffects {
    pub fn any(&self) -> bool {
        self.rebuild_grid
            || self.rebuild_sprites
            || self.resize_bloom
            || self.retune_heat
            || self.rebuild_heat_backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_is_noop() {
        let mut cfg = EngineConfig::default();
        let before = cfg.clone();
        let fx = cfg.apply(&ConfigPatch::default());
        assert_eq!(cfg, before);
        assert!(!fx.any());
    }

    #[test]
    fn same_value_reports_no_effect() {
        let mut cfg = EngineConfig::default();
        let patch = ConfigPatch {
            spacing: Some(cfg.spacing),
            ..Default::default()
        };
        assert!(!cfg.apply(&patch).any());
    }

    #[test]
    fn spacing_change_rebuilds_grid_and_retunes_heat() {
        let mut cfg = EngineConfig::default();
        let patch = ConfigPatch {
            spacing: Some(32.0),
            ..Default::default()
        };
        let fx = cfg.apply(&patch);
        assert!(fx.rebuild_grid);
        assert!(fx.retune_heat);
        assert!(!fx.rebuild_sprites);
        assert_eq!(cfg.spacing, 32.0);
    }

    #[test]
    fn sprite_key_fields_flag_sprite_rebuild() {
        let mut cfg = EngineConfig::default();
        let patch = ConfigPatch {
            dot_size: Some(2.4),
            dot_color: Some([1.0, 0.5, 0.2]),
            ..Default::default()
        };
        let fx = cfg.apply(&patch);
        assert!(fx.rebuild_sprites);
        assert!(!fx.rebuild_grid);
    }

    #[test]
    fn worker_toggle_rebuilds_backend() {
        let mut cfg = EngineConfig::default();
        let patch = ConfigPatch {
            worker_offload: Some(!cfg.worker_offload),
            ..Default::default()
        };
        assert!(cfg.apply(&patch).rebuild_heat_backend);
    }

    #[test]
    fn inner_layer_gates_effective_layers() {
        let mut cfg = EngineConfig::default();
        assert_eq!(cfg.effective_layers(), 3);
        cfg.inner_layer = false;
        assert_eq!(cfg.effective_layers(), 2);
    }
}
