use std::sync::Arc;

use instant::Instant;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::EngineConfig;
use crate::debug::timer::Phase;
use crate::debug::DebugOverlay;
use crate::engine::Engine;
use crate::render::GpuState;
use crate::sprite::{self, SpriteSheet};

/// Top-level application state.
struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    overlay: Option<DebugOverlay>,

    engine: Engine,
    sprites: Option<SpriteSheet>,

    start: Instant,
    last_frame_time: Option<Instant>,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            gpu: None,
            overlay: None,
            engine: Engine::new(EngineConfig::default()),
            sprites: None,
            start: Instant::now(),
            last_frame_time: None,
        }
    }

    /// Seconds since app start, the clock all pointer samples use.
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Rebuild + upload the sprite atlas if DPI or style changed.
    fn refresh_sprites(&mut self) {
        let key = self.engine.sprite_key();
        let stale = self
            .sprites
            .as_ref()
            .map(|s| s.needs_rebuild(&key))
            .unwrap_or(true);
        if !stale {
            return;
        }
        let sheet = sprite::build(&key);
        if let Some(gpu) = &mut self.gpu {
            gpu.dot_pipeline.set_atlas(&gpu.device, &gpu.queue, &sheet);
        }
        self.engine.set_sprite_metrics(&sheet);
        log::info!(
            "sprite atlas rebuilt: {}x{} (dpr {:.1})",
            sheet.width,
            sheet.height,
            key.dpr,
        );
        self.sprites = Some(sheet);
    }

    /// One full frame: apply UI tuning, step the simulation, upload, draw,
    /// composite bloom, draw the overlay, then feed the measured cost back
    /// into the quality controller.
    fn frame(&mut self) {
        let frame_start = Instant::now();
        let now = self.now();

        let dt = self
            .last_frame_time
            .map(|last| frame_start.duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_frame_time = Some(frame_start);

        if self.window.is_none() || self.gpu.is_none() || self.overlay.is_none() {
            return;
        }

        // --- Live tuning from the overlay ---
        let (patch, paused) = {
            let overlay = self.overlay.as_mut().expect("overlay initialized");
            overlay.record_frame(dt);
            (
                overlay.controls.diff(self.engine.config()),
                overlay.controls.paused,
            )
        };
        let fx = self.engine.update_config(&patch);
        if fx.resize_bloom {
            let gpu = self.gpu.as_mut().expect("gpu initialized");
            gpu.bloom.resize(
                &gpu.device,
                gpu.surface_config.width,
                gpu.surface_config.height,
                self.engine.config().bloom_downscale,
            );
        }
        if fx.rebuild_sprites {
            self.refresh_sprites();
        }

        // --- Simulation ---
        if !paused {
            let overlay = self.overlay.as_mut().expect("overlay initialized");
            self.engine.step(dt as f32, now, &mut overlay.timers);
        }

        let window = self.window.as_ref().expect("window initialized").clone();
        let gpu = self.gpu.as_mut().expect("gpu initialized");
        let overlay = self.overlay.as_mut().expect("overlay initialized");

        // --- Upload instance buffers ---
        overlay.timers.begin();
        gpu.dot_pipeline
            .update_dots(&gpu.queue, &self.engine.dot_instances);
        gpu.dot_pipeline
            .update_glows(&gpu.queue, &self.engine.glow_instances);
        overlay.timers.end(Phase::GpuUpload);

        // --- Render ---
        overlay.timers.begin();
        let Some(mut frame) = gpu.begin_frame() else {
            // Surface lost/outdated; skip this frame, the next reconfigures.
            return;
        };

        let cfg = self.engine.config();
        gpu.draw_dots(&mut frame.encoder, &frame.view, cfg.background_color);

        let bloom_on = cfg.bloom && self.engine.quality().bloom_allowed();
        if bloom_on {
            gpu.draw_glow_accum(&mut frame.encoder);
            gpu.bloom.downsample(&mut frame.encoder);
            gpu.bloom
                .composite(&mut frame.encoder, &frame.view, cfg.bloom_alpha);
            // Fade runs after compositing, exactly once per frame.
            gpu.bloom.fade(&mut frame.encoder, cfg.bloom_fade);
        }
        overlay.timers.end(Phase::RenderSubmit);

        // --- Debug overlay ---
        overlay.timers.begin();
        overlay.info = crate::debug::EngineInfo {
            quality_level: self.engine.quality().level(),
            quality_ema_ms: self.engine.quality().ema_ms(),
            points: self.engine.point_count(),
            sparks: self.engine.spark_count(),
            dot_instances: self.engine.dot_instances.len(),
            glow_instances: self.engine.glow_instances.len(),
            worker_threaded: self.engine.heat_is_threaded(),
        };
        let (primitives, textures_delta, screen_descriptor) =
            overlay.run_frame(&window, gpu.surface_config.width, gpu.surface_config.height);
        let extra_cmd_bufs = overlay.prepare_egui(
            &gpu.device,
            &gpu.queue,
            &mut frame.encoder,
            &primitives,
            &textures_delta,
            &screen_descriptor,
        );
        {
            let mut egui_pass = GpuState::begin_egui_pass(&mut frame.encoder, &frame.view);
            overlay.render_egui(&mut egui_pass, &primitives, &screen_descriptor);
        }
        overlay.timers.end(Phase::Overlay);

        gpu.finish_frame(frame.encoder, frame.output, extra_cmd_bufs);
        overlay.free_textures(&textures_delta);

        // --- Feed the quality controller the whole frame's CPU cost ---
        let frame_ms = frame_start.elapsed().as_secs_f64() * 1000.0;
        self.engine.note_frame_cost(frame_ms as f32);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = WindowAttributes::default()
            .with_title("dotfield")
            .with_maximized(true);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .expect("failed to create window"),
        );

        let size = window.inner_size();
        let dpr = window.scale_factor() as f32;
        log::info!("Window created: {}x{} @ {dpr:.1}x", size.width, size.height);

        let gpu = GpuState::new(window.clone(), self.engine.config().bloom_downscale);
        log::info!("wgpu + dot pipeline initialized");

        self.engine
            .resize(size.width as f32, size.height as f32, dpr);
        log::info!(
            "Grid built: {}x{} ({} points)",
            self.engine.grid_dims().0,
            self.engine.grid_dims().1,
            self.engine.point_count(),
        );

        let overlay = DebugOverlay::new(&window, &gpu, self.engine.config());

        self.gpu = Some(gpu);
        self.overlay = Some(overlay);
        self.refresh_sprites();

        // Continuous animation loop.
        event_loop.set_control_flow(ControlFlow::Poll);
        self.window = Some(window);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        // Give the overlay first look; it consumes clicks/drags on its panel.
        let consumed = match (&self.window, &mut self.overlay) {
            (Some(window), Some(overlay)) => overlay.on_window_event(window, &event),
            _ => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(
                        new_size.width,
                        new_size.height,
                        self.engine.config().bloom_downscale,
                    );
                }
                let dpr = self
                    .window
                    .as_ref()
                    .map(|w| w.scale_factor() as f32)
                    .unwrap_or(1.0);
                self.engine
                    .resize(new_size.width as f32, new_size.height as f32, dpr);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.engine
                        .resize(size.width as f32, size.height as f32, scale_factor as f32);
                }
                self.refresh_sprites();
            }
            WindowEvent::CursorMoved { position, .. } => {
                if !consumed {
                    let now = self.now();
                    self.engine
                        .on_pointer_move(position.x as f32, position.y as f32, now);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::F12) => {
                            if let Some(overlay) = &mut self.overlay {
                                overlay.toggle();
                            }
                        }
                        PhysicalKey::Code(KeyCode::Escape) => {
                            log::info!("ESC pressed, exiting");
                            event_loop.exit();
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.frame();
            }
            _ => {}
        }
    }
}

/// Entry point — create event loop and run.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new();
    event_loop.run_app(&mut app)?;
    Ok(())
}
