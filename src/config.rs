use std::{fmt, sync::Arc, time::Duration};

use crate::{frame::FrameError, time::FramesPerSecond};

/// Called on the frame thread when a run ends because of an error.
pub type FaultHandler = Arc<dyn Fn(&FrameError) + Send + Sync>;

#[derive(Clone)]
pub struct PacerConfig {
    /// The rate the pacer starts out with. Values below 1 run unthrottled.
    pub target_rate: FramesPerSecond,
    /// How long the frame thread sleeps between checks while paused. This also
    /// bounds how long a pause takes to come into effect.
    pub pause_tick: Duration,
    pub thread_name: String,
    pub on_fault: Option<FaultHandler>,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            target_rate: FramesPerSecond(60),
            pause_tick: Duration::from_millis(100),
            thread_name: "frame-pacer".to_owned(),
            on_fault: None,
        }
    }
}

impl fmt::Debug for PacerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacerConfig")
            .field("target_rate", &self.target_rate)
            .field("pause_tick", &self.pause_tick)
            .field("thread_name", &self.thread_name)
            .field("on_fault", &self.on_fault.is_some())
            .finish()
    }
}
