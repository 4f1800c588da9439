use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Cooperative stop flag shared by every stage of one pipeline.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a stage iteration decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Stop,
}

/// One pipeline stage: a short iteration repeated until the stage stops
/// itself or shutdown is requested. Every blocking wait inside `step` is
/// bounded by the shared poll interval, so the loop re-checks the shutdown
/// token promptly.
pub(crate) trait Stage {
    fn name(&self) -> &'static str;

    /// Invoked once on the stage's worker before the first iteration.
    fn on_start(&mut self) {}

    fn step(&mut self) -> Step;
}

/// Drive a stage to completion on the current thread.
pub(crate) fn run<S: Stage>(mut stage: S, shutdown: ShutdownToken) {
    debug!(stage = stage.name(), "stage started");
    stage.on_start();
    while !shutdown.is_requested() {
        if stage.step() == Step::Stop {
            break;
        }
    }
    debug!(stage = stage.name(), "stage stopped");
}
