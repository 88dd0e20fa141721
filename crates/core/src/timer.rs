//! Frame timing.

use std::time::{Duration, Instant};

/// Time values sampled once per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous frame.
    pub delta: f32,
    /// Seconds since the timer started.
    pub elapsed: f32,
}

/// Tracks time since start and time between frames.
///
/// The camera controller scales movement by [`FrameTime::delta`] and the
/// model rotation is driven by [`FrameTime::elapsed`].
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_frame: Instant,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Starts a new frame and returns its timing.
    pub fn frame(&mut self) -> FrameTime {
        let now = Instant::now();
        let delta = now - self.last_frame;
        self.last_frame = now;
        FrameTime {
            delta: delta.as_secs_f32(),
            elapsed: (now - self.start).as_secs_f32(),
        }
    }

    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_frame = now;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_frame_delta_is_measured_between_frames() {
        let mut timer = FrameTimer::new();
        thread::sleep(Duration::from_millis(5));
        let first = timer.frame();
        assert!(first.delta >= 0.005);
        assert!(first.elapsed >= first.delta);

        let second = timer.frame();
        assert!(second.delta < first.elapsed + 1.0);
        assert!(second.elapsed >= first.elapsed);
    }

    #[test]
    fn test_reset_restarts_elapsed() {
        let mut timer = FrameTimer::new();
        thread::sleep(Duration::from_millis(5));
        timer.reset();
        assert!(timer.elapsed_secs() < 0.005);
    }
}
