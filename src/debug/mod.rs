pub mod ring;
pub mod timer;

use winit::window::Window;

use self::ring::FrameHistory;
use self::timer::{Phase, PhaseTimers};

use crate::config::{ConfigPatch, EngineConfig};
use crate::render::GpuState;

/// Number of frame times to keep in the histogram.
const FRAME_HISTORY_LEN: usize = 300;
/// Seconds between FPS summary log lines.
const FPS_LOG_INTERVAL: f64 = 5.0;

/// Engine readouts the app refreshes each frame for the overlay.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineInfo {
    pub quality_level: u8,
    pub quality_ema_ms: f32,
    pub points: usize,
    pub sparks: usize,
    pub dot_instances: usize,
    pub glow_instances: usize,
    pub worker_threaded: bool,
}

/// Live tuning controls mirrored from the engine config. The UI mutates
/// these; `diff` turns the changes into a `ConfigPatch`.
#[derive(Debug, Clone, Copy)]
pub struct Controls {
    pub paused: bool,
    pub bloom: bool,
    pub stars: bool,
    pub particles: bool,
    pub worker: bool,
    pub spacing: f32,
    pub influence_radius: f32,
    pub max_offset: f32,
    pub heat_gain: f32,
    pub heat_decay: f32,
    pub bloom_alpha: f32,
    pub bloom_fade: f32,
    pub flow_amplitude: f32,
    pub return_lerp: f32,
}

impl Controls {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            paused: false,
            bloom: cfg.bloom,
            stars: cfg.stars,
            particles: cfg.particles,
            worker: cfg.worker_offload,
            spacing: cfg.spacing,
            influence_radius: cfg.influence_radius,
            max_offset: cfg.max_offset,
            heat_gain: cfg.heat_gain,
            heat_decay: cfg.heat_decay,
            bloom_alpha: cfg.bloom_alpha,
            bloom_fade: cfg.bloom_fade,
            flow_amplitude: cfg.flow_amplitude,
            return_lerp: cfg.return_lerp,
        }
    }

    /// A patch containing only the fields that differ from `cfg`.
    pub fn diff(&self, cfg: &EngineConfig) -> ConfigPatch {
        fn ne(a: f32, b: f32) -> Option<f32> {
            (a != b).then_some(a)
        }
        ConfigPatch {
            bloom: (self.bloom != cfg.bloom).then_some(self.bloom),
            stars: (self.stars != cfg.stars).then_some(self.stars),
            particles: (self.particles != cfg.particles).then_some(self.particles),
            worker_offload: (self.worker != cfg.worker_offload).then_some(self.worker),
            spacing: ne(self.spacing, cfg.spacing),
            influence_radius: ne(self.influence_radius, cfg.influence_radius),
            max_offset: ne(self.max_offset, cfg.max_offset),
            heat_gain: ne(self.heat_gain, cfg.heat_gain),
            heat_decay: ne(self.heat_decay, cfg.heat_decay),
            bloom_alpha: ne(self.bloom_alpha, cfg.bloom_alpha),
            bloom_fade: ne(self.bloom_fade, cfg.bloom_fade),
            flow_amplitude: ne(self.flow_amplitude, cfg.flow_amplitude),
            return_lerp: ne(self.return_lerp, cfg.return_lerp),
            ..Default::default()
        }
    }
}

/// Debug overlay powered by egui. Toggled with F12.
pub struct DebugOverlay {
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    pub egui_renderer: egui_wgpu::Renderer,

    pub visible: bool,

    /// Rolling window of frame times (seconds).
    pub frame_times: FrameHistory,
    pub fps: f64,
    pub frame_time_avg: f64,
    pub frame_time_min: f64,
    pub frame_time_max: f64,

    /// Per-phase timers; the engine writes the simulation phases, the app
    /// the render ones.
    pub timers: PhaseTimers,

    /// Engine readouts (refreshed by the app each frame).
    pub info: EngineInfo,

    /// UI controls.
    pub controls: Controls,

    // Periodic-log accumulator.
    frame_count: u64,
    log_timer: f64,
    log_frame_count: u32,
    log_frame_sum: f64,
}

impl DebugOverlay {
    pub fn new(window: &Window, gpu: &GpuState, cfg: &EngineConfig) -> Self {
        let egui_ctx = egui::Context::default();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(gpu.device.limits().max_texture_dimension_2d as usize),
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            &gpu.device,
            gpu.surface_config.format,
            egui_wgpu::RendererOptions {
                depth_stencil_format: None,
                msaa_samples: 1,
                dithering: true,
                predictable_texture_filtering: false,
            },
        );

        Self {
            egui_ctx,
            egui_state,
            egui_renderer,
            visible: false,
            frame_times: FrameHistory::new(FRAME_HISTORY_LEN),
            fps: 0.0,
            frame_time_avg: 0.0,
            frame_time_min: 0.0,
            frame_time_max: 0.0,
            timers: PhaseTimers::new(),
            info: EngineInfo::default(),
            controls: Controls::from_config(cfg),
            frame_count: 0,
            log_timer: 0.0,
            log_frame_count: 0,
            log_frame_sum: 0.0,
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    /// Record a frame time, update rolling stats, and periodically log.
    pub fn record_frame(&mut self, dt: f64) {
        self.frame_count += 1;
        self.frame_times.push(dt);

        if let Some((avg, min, max)) = self.frame_times.stats() {
            self.frame_time_avg = avg;
            self.frame_time_min = min;
            self.frame_time_max = max;
            self.fps = 1.0 / avg.max(1e-9);
        }

        self.log_frame_count += 1;
        self.log_frame_sum += dt;
        self.log_timer += dt;
        if self.log_timer >= FPS_LOG_INTERVAL {
            let avg_ms = (self.log_frame_sum / self.log_frame_count as f64) * 1000.0;
            let fps = self.log_frame_count as f64 / self.log_timer;
            log::info!(
                "FPS: {:.0} | avg: {:.2}ms | quality: {} | points: {} | sparks: {} | frames: {}",
                fps,
                avg_ms,
                self.info.quality_level,
                self.info.points,
                self.info.sparks,
                self.frame_count,
            );
            self.log_timer = 0.0;
            self.log_frame_count = 0;
            self.log_frame_sum = 0.0;
        }
    }

    /// Forward a winit event to egui. Returns true if egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &winit::event::WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        response.consumed
    }

    /// Run the egui frame and produce paint output.
    pub fn run_frame(
        &mut self,
        window: &Window,
        screen_w: u32,
        screen_h: u32,
    ) -> (
        Vec<egui::epaint::ClippedPrimitive>,
        egui::TexturesDelta,
        egui_wgpu::ScreenDescriptor,
    ) {
        let raw_input = self.egui_state.take_egui_input(window);

        // Snapshot read-only state for UI drawing (avoids borrow conflict
        // between egui_ctx.run() borrowing self and the closure borrowing self).
        let ui_state = UiSnapshot {
            visible: self.visible,
            fps: self.fps,
            frame_time_avg: self.frame_time_avg,
            frame_time_min: self.frame_time_min,
            frame_time_max: self.frame_time_max,
            frame_times: self.frame_times.iter().collect(),
            phase_durations: self.timers.durations_us,
            info: self.info,
        };

        // Mutable controls — read from self, written back after run().
        let mut controls = self.controls;

        let ctx = self.egui_ctx.clone();
        let full_output = ctx.run(raw_input, |ctx| {
            draw_ui(ctx, &ui_state, &mut controls);
        });

        self.controls = controls;

        self.egui_state
            .handle_platform_output(window, full_output.platform_output);

        let pixels_per_point = full_output.pixels_per_point;
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes, pixels_per_point);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [screen_w, screen_h],
            pixels_per_point,
        };

        (clipped_primitives, full_output.textures_delta, screen_descriptor)
    }

    /// Upload egui textures and buffers. Call before the egui render pass.
    pub fn prepare_egui(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        primitives: &[egui::epaint::ClippedPrimitive],
        textures_delta: &egui::TexturesDelta,
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, image_delta) in &textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.egui_renderer
            .update_buffers(device, queue, encoder, primitives, screen_descriptor)
    }

    /// Render egui into the given render pass.
    pub fn render_egui(
        &self,
        render_pass: &mut wgpu::RenderPass<'static>,
        primitives: &[egui::epaint::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        self.egui_renderer
            .render(render_pass, primitives, screen_descriptor);
    }

    /// Free textures after present.
    pub fn free_textures(&mut self, textures_delta: &egui::TexturesDelta) {
        for &id in &textures_delta.free {
            self.egui_renderer.free_texture(&id);
        }
    }
}

// ---------------------------------------------------------------------------
// UI snapshot + free-function draw (avoids borrow conflicts with egui_ctx)
// ---------------------------------------------------------------------------

struct UiSnapshot {
    visible: bool,
    fps: f64,
    frame_time_avg: f64,
    frame_time_min: f64,
    frame_time_max: f64,
    frame_times: Vec<f64>,
    phase_durations: [f64; 7],
    info: EngineInfo,
}

fn draw_ui(ctx: &egui::Context, s: &UiSnapshot, c: &mut Controls) {
    if !s.visible {
        return;
    }

    let panel_frame = egui::Frame::NONE
        .fill(egui::Color32::from_rgba_unmultiplied(20, 20, 20, 220))
        .corner_radius(6.0)
        .inner_margin(10.0);

    egui::Window::new("Debug")
        .default_pos([10.0, 10.0])
        .default_width(320.0)
        .resizable(true)
        .frame(panel_frame)
        .show(ctx, |ui| {
            ui.style_mut().visuals.override_text_color = Some(egui::Color32::from_gray(220));

            // --- Performance ---
            ui.heading("Performance");
            ui.label(format!("FPS: {:.1}", s.fps));
            ui.label(format!(
                "Frame: {:.2}ms avg | {:.2} min | {:.2} max",
                s.frame_time_avg * 1000.0,
                s.frame_time_min * 1000.0,
                s.frame_time_max * 1000.0,
            ));
            ui.label(format!(
                "Quality: {}/3 (ema {:.1}ms)",
                s.info.quality_level, s.info.quality_ema_ms,
            ));
            ui.add_space(4.0);

            // --- Frame time histogram ---
            ui.heading("Frame Time History");
            if !s.frame_times.is_empty() {
                let max_time = s
                    .frame_times
                    .iter()
                    .copied()
                    .fold(0.0f64, f64::max)
                    .max(0.020);

                let (response, painter) =
                    ui.allocate_painter(egui::vec2(300.0, 60.0), egui::Sense::hover());
                let rect = response.rect;

                let bar_width = rect.width() / s.frame_times.len() as f32;
                let target_y = rect.bottom() - (0.01667 / max_time as f32) * rect.height();

                for (i, &t) in s.frame_times.iter().enumerate() {
                    let h = (t / max_time) as f32 * rect.height();
                    let x = rect.left() + i as f32 * bar_width;
                    let color = if t > 0.01667 {
                        egui::Color32::from_rgb(255, 100, 80)
                    } else {
                        egui::Color32::from_rgb(80, 200, 120)
                    };
                    painter.rect_filled(
                        egui::Rect::from_min_max(
                            egui::pos2(x, rect.bottom() - h),
                            egui::pos2(x + bar_width - 1.0, rect.bottom()),
                        ),
                        0.0,
                        color,
                    );
                }

                // 16.67ms target line
                painter.line_segment(
                    [
                        egui::pos2(rect.left(), target_y),
                        egui::pos2(rect.right(), target_y),
                    ],
                    egui::Stroke::new(1.0, egui::Color32::from_rgb(255, 255, 100)),
                );
            }
            ui.add_space(4.0);

            // --- Phase timers ---
            ui.heading("Phase Timers");
            let total: f64 = s.phase_durations.iter().sum::<f64>().max(1.0);
            let max_us = s
                .phase_durations
                .iter()
                .copied()
                .fold(0.0f64, f64::max)
                .max(1.0);

            for phase in Phase::ALL {
                let us = s.phase_durations[phase as usize];
                let pct = us / total * 100.0;
                let bar_frac = (us / max_us) as f32;

                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(format!("{:<12}", phase.label())).monospace());
                    ui.label(
                        egui::RichText::new(format!("{:>5.0}us ({:>2.0}%)", us, pct)).monospace(),
                    );

                    let (response, painter) =
                        ui.allocate_painter(egui::vec2(80.0, 12.0), egui::Sense::hover());
                    let r = response.rect;
                    painter.rect_filled(
                        egui::Rect::from_min_max(
                            r.left_top(),
                            egui::pos2(r.left() + r.width() * bar_frac, r.bottom()),
                        ),
                        2.0,
                        egui::Color32::from_rgb(100, 180, 255),
                    );
                });
            }
            ui.add_space(4.0);

            // --- Controls ---
            ui.heading("Controls");
            ui.checkbox(&mut c.paused, "Pause Simulation");
            ui.checkbox(&mut c.bloom, "Bloom");
            ui.checkbox(&mut c.stars, "Stars");
            ui.checkbox(&mut c.particles, "Particles");
            ui.checkbox(&mut c.worker, "Heat Worker");
            ui.add_space(4.0);

            // --- Tuning ---
            ui.heading("Tuning");
            slider(ui, "Spacing", &mut c.spacing, 12.0..=64.0);
            slider(ui, "Radius", &mut c.influence_radius, 60.0..=400.0);
            slider(ui, "Offset", &mut c.max_offset, 0.0..=40.0);
            slider(ui, "Heat Gain", &mut c.heat_gain, 0.0..=2.0);
            slider(ui, "Heat Decay", &mut c.heat_decay, 0.05..=2.0);
            slider(ui, "Bloom Alpha", &mut c.bloom_alpha, 0.0..=1.0);
            slider(ui, "Bloom Fade", &mut c.bloom_fade, 0.05..=1.0);
            slider(ui, "Drift", &mut c.flow_amplitude, 0.0..=20.0);
            slider(ui, "Return Lerp", &mut c.return_lerp, 0.01..=0.5);
            ui.add_space(4.0);

            // --- Info ---
            ui.heading("Info");
            ui.label(format!(
                "Points: {} | Sparks: {}",
                s.info.points, s.info.sparks
            ));
            ui.label(format!(
                "Instances: {} dots | {} glows",
                s.info.dot_instances, s.info.glow_instances
            ));
            ui.label(format!(
                "Heat decay: {}",
                if s.info.worker_threaded {
                    "worker thread"
                } else {
                    "render thread"
                }
            ));
            ui.label("F12: Toggle | ESC: Quit");
        });
}

fn slider(ui: &mut egui::Ui, label: &str, value: &mut f32, range: std::ops::RangeInclusive<f32>) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(format!("{label:<12}")).monospace());
        ui.add(egui::Slider::new(value, range));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_diff_is_empty_for_matching_config() {
        let cfg = EngineConfig::default();
        let c = Controls::from_config(&cfg);
        let patch = c.diff(&cfg);
        let mut probe = cfg.clone();
        assert!(!probe.apply(&patch).any());
        assert!(patch.spacing.is_none());
        assert!(patch.bloom.is_none());
    }

    #[test]
    fn controls_diff_reports_only_changes() {
        let cfg = EngineConfig::default();
        let mut c = Controls::from_config(&cfg);
        c.bloom = !c.bloom;
        c.spacing = 40.0;
        let patch = c.diff(&cfg);
        assert_eq!(patch.bloom, Some(c.bloom));
        assert_eq!(patch.spacing, Some(40.0));
        assert!(patch.heat_gain.is_none());
    }
}
