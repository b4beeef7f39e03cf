use bevy::prelude::*;

/// Per-frame timing supplied by the host loop.
///
/// The core never samples wall-clock time itself. Whoever owns the game loop
/// stores the frame delta here (see [`run_frame`]) before the schedule runs,
/// and every timed behaviour advances by exactly that amount.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameClock {
    delta: f32,
    elapsed: f64,
    frame: u64,
}

impl FrameClock {
    /// Seconds since the previous frame. Never negative.
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Sum of every delta fed so far, in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Number of frames started so far; the first frame is 1.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn begin_frame(&mut self, delta: f32) {
        self.delta = sanitize_delta(delta);
        self.elapsed += self.delta as f64;
        self.frame += 1;
    }
}

fn sanitize_delta(delta: f32) -> f32 {
    if delta.is_finite() {
        delta.max(0.0)
    } else {
        0.0
    }
}

/// Delta of the frame in progress, or 0 when no clock is installed.
pub fn frame_delta(world: &World) -> f32 {
    world
        .get_resource::<FrameClock>()
        .map(FrameClock::delta)
        .unwrap_or(0.0)
}

/// Advance the app by one frame of `delta` seconds.
pub fn run_frame(app: &mut App, delta: f32) {
    app.world
        .get_resource_or_insert_with(FrameClock::default)
        .begin_frame(delta);
    app.update();
}

/// Advance the app by `frames` frames of a fixed `delta`.
pub fn run_for(app: &mut App, delta: f32, frames: u32) {
    for _ in 0..frames {
        run_frame(app, delta);
    }
}
