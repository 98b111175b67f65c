use glam::Vec2;

/// One raw pointer sample, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub pos: Vec2,
    /// Seconds since engine start.
    pub time: f64,
}

/// Max queued samples before the oldest half is dropped.
const MAX_QUEUE: usize = 64;
/// Per-frame (60 Hz reference) smoothing factor for the display cursor.
const DISPLAY_SMOOTHING: f32 = 0.22;

/// Converts raw pointer events into a queue of timestamped samples for
/// physics plus a smoothed cursor for rendering.
///
/// The split matters: heat injection wants physically accurate speeds from
/// the raw samples, while the attraction/parallax math wants a cursor that
/// doesn't jitter with every high-frequency event. Smoothing is applied
/// once per frame in `advance`, never per event.
pub struct InputTracker {
    queue: Vec<PointerSample>,
    /// Latest raw pointer position.
    pub display_target: Vec2,
    /// Exponentially smoothed pointer position.
    pub display_mouse: Vec2,
    has_pointer: bool,
    last_move_time: f64,
}

impl InputTracker {
    pub fn new() -> Self {
        Self {
            queue: Vec::with_capacity(MAX_QUEUE),
            display_target: Vec2::ZERO,
            display_mouse: Vec2::ZERO,
            has_pointer: false,
            last_move_time: f64::NEG_INFINITY,
        }
    }

    /// Ingest a single pointer-move event.
    pub fn on_pointer_move(&mut self, x: f32, y: f32, now: f64) {
        self.push_batch(&[Vec2::new(x, y)], now, now);
    }

    /// Ingest a batch of coalesced sub-events covering `[start, end]`.
    /// Timestamps are interpolated evenly across the batch interval to
    /// approximate the true sampling times.
    pub fn push_batch(&mut self, points: &[Vec2], start: f64, end: f64) {
        if points.is_empty() {
            return;
        }
        let n = points.len();
        for (k, &pos) in points.iter().enumerate() {
            let t = if n == 1 {
                end
            } else {
                start + (end - start) * (k as f64 / (n - 1) as f64)
            };
            self.queue.push(PointerSample { pos, time: t });
        }
        if self.queue.len() > MAX_QUEUE {
            // Drop the oldest half, preserving recency.
            self.queue.drain(..self.queue.len() / 2);
        }

        let last = points[n - 1];
        self.display_target = last;
        if !self.has_pointer {
            // First contact: snap instead of gliding in from the origin.
            self.display_mouse = last;
            self.has_pointer = true;
        }
        self.last_move_time = end;
    }

    /// Relax the display cursor toward the latest raw position. Call once
    /// per frame.
    pub fn advance(&mut self, dt: f32) {
        if !self.has_pointer {
            return;
        }
        let k = (DISPLAY_SMOOTHING * dt * 60.0).min(1.0);
        self.display_mouse += (self.display_target - self.display_mouse) * k;
    }

    /// Move queued samples into `out`, keeping the newest one queued so the
    /// next frame's first segment connects to this one.
    pub fn drain(&mut self, out: &mut Vec<PointerSample>) {
        out.extend_from_slice(&self.queue);
        if let Some(&last) = self.queue.last() {
            self.queue.clear();
            self.queue.push(last);
        }
    }

    /// Whether any pointer event has ever arrived.
    pub fn has_pointer(&self) -> bool {
        self.has_pointer
    }

    /// Seconds since the last pointer movement.
    pub fn idle_seconds(&self, now: f64) -> f64 {
        now - self.last_move_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_event_snaps_display_cursor() {
        let mut t = InputTracker::new();
        t.on_pointer_move(100.0, 50.0, 0.1);
        assert_eq!(t.display_mouse, Vec2::new(100.0, 50.0));
        assert_eq!(t.display_target, Vec2::new(100.0, 50.0));
    }

    #[test]
    fn display_cursor_smooths_after_first_event() {
        let mut t = InputTracker::new();
        t.on_pointer_move(0.0, 0.0, 0.0);
        t.on_pointer_move(100.0, 0.0, 0.016);
        t.advance(1.0 / 60.0);
        assert!(t.display_mouse.x > 0.0);
        assert!(t.display_mouse.x < 100.0);
    }

    #[test]
    fn overflow_drops_oldest_half() {
        let mut t = InputTracker::new();
        for i in 0..(MAX_QUEUE + 1) {
            t.on_pointer_move(i as f32, 0.0, i as f64 * 0.001);
        }
        let mut out = Vec::new();
        t.drain(&mut out);
        assert!(out.len() <= MAX_QUEUE);
        // The newest sample survived the trim.
        assert_eq!(out.last().unwrap().pos.x, MAX_QUEUE as f32);
    }

    #[test]
    fn drain_keeps_newest_for_continuity() {
        let mut t = InputTracker::new();
        t.on_pointer_move(1.0, 1.0, 0.0);
        t.on_pointer_move(2.0, 2.0, 0.01);

        let mut out = Vec::new();
        t.drain(&mut out);
        assert_eq!(out.len(), 2);

        // Next drain starts from the sample the previous frame ended on.
        out.clear();
        t.drain(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pos, Vec2::new(2.0, 2.0));
    }

    #[test]
    fn batch_timestamps_interpolate_evenly() {
        let mut t = InputTracker::new();
        let pts = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
        ];
        t.push_batch(&pts, 1.0, 1.02);
        let mut out = Vec::new();
        t.drain(&mut out);
        assert_eq!(out[0].time, 1.0);
        assert!((out[1].time - 1.01).abs() < 1e-9);
        assert_eq!(out[2].time, 1.02);
    }

    #[test]
    fn idle_seconds_tracks_last_move() {
        let mut t = InputTracker::new();
        t.on_pointer_move(0.0, 0.0, 2.0);
        assert_eq!(t.idle_seconds(5.0), 3.0);
    }
}
