use std::{
    ops::{Add, AddAssign},
    time::{Duration, Instant},
};

pub(crate) const MILLISECONDS_PER_SECOND: u64 = 1000;

/// A target frame rate in whole frames per second.
///
/// Rates below 1 disable throttling entirely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FramesPerSecond(pub i32);

impl FramesPerSecond {
    pub const UNTHROTTLED: Self = Self(0);

    #[must_use]
    pub const fn new(fps: i32) -> Self {
        Self(fps)
    }

    #[must_use]
    pub const fn is_unthrottled(self) -> bool {
        self.0 < 1
    }

    /// The time allotted to a single paced iteration, truncated to whole
    /// milliseconds. Zero when unthrottled.
    #[must_use]
    pub fn frame_budget(self) -> Duration {
        if self.is_unthrottled() {
            return Duration::ZERO;
        }

        let fps = u64::try_from(self.0).unwrap_or(1);
        Duration::from_millis(MILLISECONDS_PER_SECOND / fps)
    }

    /// The number of paced iterations run before the rate is read again.
    ///
    /// This is one fewer than the rate. A rate of 1 therefore runs empty
    /// batches and never draws.
    #[must_use]
    pub fn batch_len(self) -> u32 {
        if self.is_unthrottled() {
            return 1;
        }

        u32::try_from(self.0 - 1).unwrap_or(0)
    }
}

impl From<i32> for FramesPerSecond {
    fn from(fps: i32) -> Self {
        Self(fps)
    }
}

/// Identifies a paced iteration. The first iteration of a pacer is frame 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

impl Add<u64> for FrameId {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for FrameId {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Measures the wall time spent inside a paced iteration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    elapsed: Duration,
}

impl Stopwatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh measurement, discarding the previous one.
    pub fn start(&mut self) {
        self.elapsed = Duration::ZERO;
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) -> Duration {
        if let Some(started) = self.started.take() {
            self.elapsed = started.elapsed();
        }
        self.elapsed
    }

    pub fn reset(&mut self) {
        self.started = None;
        self.elapsed = Duration::ZERO;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// The time measured so far, including a measurement still in progress.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self.started {
            Some(started) => started.elapsed(),
            None => self.elapsed,
        }
    }

    /// How much of `budget` is left after the last measurement.
    #[must_use]
    pub fn remaining(&self, budget: Duration) -> Duration {
        budget.saturating_sub(self.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_budget() {
        assert_eq!(FramesPerSecond(10).frame_budget(), Duration::from_millis(100));
        assert_eq!(FramesPerSecond(60).frame_budget(), Duration::from_millis(16));
        assert_eq!(FramesPerSecond(1).frame_budget(), Duration::from_secs(1));
        assert_eq!(FramesPerSecond(2000).frame_budget(), Duration::ZERO);
        assert_eq!(FramesPerSecond(0).frame_budget(), Duration::ZERO);
        assert_eq!(FramesPerSecond(-5).frame_budget(), Duration::ZERO);
    }

    #[test]
    fn batch_is_one_short_of_rate() {
        assert_eq!(FramesPerSecond(10).batch_len(), 9);
        assert_eq!(FramesPerSecond(2).batch_len(), 1);
        assert_eq!(FramesPerSecond(1).batch_len(), 0);
        assert_eq!(FramesPerSecond::UNTHROTTLED.batch_len(), 1);
        assert!(FramesPerSecond(-1).is_unthrottled());
        assert!(!FramesPerSecond(1).is_unthrottled());
    }

    #[test]
    fn stopwatch() {
        let mut watch = Stopwatch::new();
        assert!(!watch.is_running());
        assert_eq!(watch.elapsed(), Duration::ZERO);

        watch.start();
        assert!(watch.is_running());
        std::thread::sleep(Duration::from_millis(20));
        let elapsed = watch.stop();
        assert!(elapsed >= Duration::from_millis(20));
        assert_eq!(watch.elapsed(), elapsed);

        assert_eq!(watch.remaining(Duration::from_millis(10)), Duration::ZERO);
        assert!(watch.remaining(Duration::from_secs(10)) <= Duration::from_secs(10) - elapsed);

        watch.reset();
        assert_eq!(watch.elapsed(), Duration::ZERO);
    }

    #[test]
    fn frame_id() {
        let mut id = FrameId::default();
        id += 3;
        assert_eq!(id, FrameId(3));
        assert_eq!(id + 2, FrameId(5));
    }
}
