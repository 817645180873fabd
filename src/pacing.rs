//! The frame-thread side of the pacer.
//!
//! The loop reads the target rate once per batch. A throttled batch runs
//! `rate - 1` paced iterations and sleeps after each one for whatever is left
//! of its `1000 / rate` ms budget, so time spent in callbacks is absorbed into
//! the budget instead of accumulating. Sleep overshoot from the scheduler is
//! not compensated for.
//!
//! Stop and pause requests are only observed between paced iterations and
//! during sleeps. A callback that is already running is never interrupted.

use std::{
    panic::{self, AssertUnwindSafe},
    time::{Duration, Instant},
};

use crate::{
    device::RenderDevice,
    frame::{FrameError, Notification},
    pacer::PacerHandle,
    time::Stopwatch,
};

/// Entry point of the frame thread.
pub(crate) fn run<D: RenderDevice>(pacer: &PacerHandle<D>) {
    tracing::debug!("frame loop entered");

    let result = panic::catch_unwind(AssertUnwindSafe(|| pace(pacer)))
        .unwrap_or_else(|payload| Err(FrameError::from_panic(&*payload)));

    pacer.set_paused(false);

    match result {
        Ok(()) => tracing::debug!(frame = pacer.frame_id().0, "frame loop exited"),
        Err(error) => {
            tracing::error!(%error, frame = pacer.frame_id().0, "frame loop failed");
            pacer.fault(error);
        }
    }
}

fn pace<D: RenderDevice>(pacer: &PacerHandle<D>) -> Result<(), FrameError> {
    pacer.set_paused(false);
    let mut stopwatch = Stopwatch::new();

    while !pacer.is_stop_requested() {
        wait_while_paused(pacer);
        if pacer.is_stop_requested() {
            break;
        }

        let rate = pacer.target_rate();

        if rate.is_unthrottled() {
            run_frame(pacer)?;
            continue;
        }

        let budget = rate.frame_budget();
        let batch_len = rate.batch_len();

        // A rate of 1 has nothing to draw. Idle for its budget rather than
        // spinning on the rate.
        if batch_len == 0 {
            sleep_unless_interrupted(pacer, budget);
            continue;
        }

        for _ in 0..batch_len {
            if pacer.is_stop_requested() || pacer.is_paused() {
                break;
            }

            stopwatch.start();
            run_frame(pacer)?;
            stopwatch.stop();

            sleep_unless_interrupted(pacer, stopwatch.remaining(budget));
        }
    }

    Ok(())
}

/// Runs one paced iteration: the three notifications, with the frame
/// notification inside an open scene.
///
/// # Errors
///
/// Fails before notifying anyone if no device is attached. Otherwise the first
/// failing subscriber or device call aborts the iteration; a scene that was
/// already open at that point is left open.
pub(crate) fn run_frame<D: RenderDevice>(pacer: &PacerHandle<D>) -> Result<(), FrameError> {
    #[cfg(feature = "profile")]
    let _s = tracing_tracy::client::span!("Frame");

    let device = pacer.device().ok_or(FrameError::NoDevice)?;
    let subscribers = &pacer.shared.subscribers;

    subscribers.notify(Notification::FrameStarting, pacer, &device)?;

    if !device.is_drawing() {
        device
            .begin_scene()
            .map_err(|source| FrameError::Device {
                operation: "begin a scene",
                source,
            })?;
    }

    subscribers.notify(Notification::Frame, pacer, &device)?;

    if device.is_drawing() {
        device.end_scene().map_err(|source| FrameError::Device {
            operation: "end the scene",
            source,
        })?;
    }

    subscribers.notify(Notification::FrameEnding, pacer, &device)?;

    pacer.finish_frame();

    #[cfg(feature = "profile")]
    tracing_tracy::client::frame_mark();

    Ok(())
}

fn wait_while_paused<D: RenderDevice>(pacer: &PacerHandle<D>) {
    if !pacer.is_paused() || pacer.is_stop_requested() {
        return;
    }

    tracing::debug!(frame = pacer.frame_id().0, "frame loop paused");

    while pacer.is_paused() && !pacer.is_stop_requested() {
        std::thread::sleep(pacer.shared.pause_tick);
    }

    tracing::debug!("frame loop resumed");
}

/// Sleeps for `duration` in ticks no longer than the pause tick, returning
/// early if a stop or pause is requested in the meantime.
fn sleep_unless_interrupted<D: RenderDevice>(pacer: &PacerHandle<D>, duration: Duration) {
    if duration.is_zero() {
        return;
    }

    let deadline = Instant::now() + duration;
    let tick = pacer.shared.pause_tick;

    loop {
        if pacer.is_stop_requested() || pacer.is_paused() {
            return;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }

        std::thread::sleep(remaining.min(tick));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::Ordering, Arc};

    use super::*;
    use crate::{
        device::testing::{Call, FakeDevice},
        pacer::FramePacer,
        time::FrameId,
    };

    fn recording_pacer(device: &Arc<FakeDevice>) -> FramePacer<FakeDevice> {
        let pacer = FramePacer::with_device(device.clone(), 0);

        pacer.on_frame_starting(|_, device| {
            device.record(Call::Notify("starting"));
            Ok(())
        });
        pacer.on_frame(|_, device| {
            assert!(device.is_drawing());
            device.record(Call::Notify("frame"));
            Ok(())
        });
        pacer.on_frame_ending(|_, device| {
            assert!(!device.is_drawing());
            device.record(Call::Notify("ending"));
            Ok(())
        });

        pacer
    }

    #[test]
    fn frame_sequence_order() {
        let device = Arc::new(FakeDevice::new());
        let pacer = recording_pacer(&device);

        run_frame(pacer.handle()).unwrap();
        run_frame(pacer.handle()).unwrap();

        let one = [
            Call::Notify("starting"),
            Call::BeginScene,
            Call::Notify("frame"),
            Call::EndScene,
            Call::Notify("ending"),
        ];
        assert_eq!(device.calls(), [one, one].concat());
        assert_eq!(pacer.frame_id(), FrameId(2));
    }

    #[test]
    fn open_scene_is_not_begun_again() {
        let device = Arc::new(FakeDevice::new());
        let pacer = recording_pacer(&device);

        device.force_drawing(true);
        run_frame(pacer.handle()).unwrap();

        assert_eq!(
            device.calls(),
            [
                Call::Notify("starting"),
                Call::Notify("frame"),
                Call::EndScene,
                Call::Notify("ending"),
            ]
        );
    }

    #[test]
    fn scene_closed_by_subscriber_is_not_ended_again() {
        let device = Arc::new(FakeDevice::new());
        let pacer = FramePacer::with_device(device.clone(), 0);

        pacer.on_frame(|_, device| device.end_scene());
        run_frame(pacer.handle()).unwrap();

        assert_eq!(device.calls(), [Call::BeginScene, Call::EndScene]);
        assert!(!device.is_drawing());
    }

    #[test]
    fn missing_device() {
        let device = Arc::new(FakeDevice::new());
        let pacer = recording_pacer(&device);
        pacer.set_device(None);

        let error = run_frame(pacer.handle()).unwrap_err();

        assert!(matches!(error, FrameError::NoDevice));
        assert!(device.calls().is_empty());
        assert_eq!(pacer.frame_id(), FrameId(0));
    }

    #[test]
    fn device_failure() {
        let device = Arc::new(FakeDevice::new());
        let pacer = recording_pacer(&device);
        device.fail_begin.store(true, Ordering::SeqCst);

        let error = run_frame(pacer.handle()).unwrap_err();

        assert!(matches!(error, FrameError::Device { .. }));
        assert_eq!(
            error.to_string(),
            "The render device could not begin a scene: device lost"
        );
        assert_eq!(device.calls(), [Call::Notify("starting")]);
    }

    #[test]
    fn frame_failure_skips_the_rest() {
        let device = Arc::new(FakeDevice::new());
        let pacer = recording_pacer(&device);
        pacer.on_frame(|_, _| Err("shader missing".into()));

        let error = run_frame(pacer.handle()).unwrap_err();

        assert!(matches!(
            error,
            FrameError::Subscriber {
                notification: Notification::Frame,
                ..
            }
        ));
        assert_eq!(
            device.calls(),
            [
                Call::Notify("starting"),
                Call::BeginScene,
                Call::Notify("frame"),
            ]
        );
        // No automatic recovery; the scene stays open.
        assert!(device.is_drawing());
    }

    #[test]
    fn interrupted_sleep() {
        let pacer = FramePacer::<FakeDevice>::new();

        pacer.handle().request_stop();
        let started = Instant::now();
        sleep_unless_interrupted(pacer.handle(), Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));

        let pacer = FramePacer::<FakeDevice>::new();
        let started = Instant::now();
        sleep_unless_interrupted(pacer.handle(), Duration::from_millis(30));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
