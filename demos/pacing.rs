//! Drives a console "device" at a few different rates, pausing in between.
//!
//! Run with `cargo run --example pacing`, or with `--features profile` to send
//! frame marks to Tracy instead of the terminal.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use plinth_pacer::{DeviceError, FramePacer, FramesPerSecond, RenderDevice};

#[cfg(feature = "profile")]
use tracing_subscriber::layer::SubscriberExt;

/// Counts scenes instead of drawing them.
#[derive(Default)]
struct ConsoleDevice {
    drawing: AtomicBool,
    scenes: AtomicU32,
}

impl ConsoleDevice {
    fn fill(&self, color: &str) {
        tracing::trace!(color, "fill");
    }
}

impl RenderDevice for ConsoleDevice {
    fn is_drawing(&self) -> bool {
        self.drawing.load(Ordering::Acquire)
    }

    fn begin_scene(&self) -> Result<(), DeviceError> {
        self.drawing.store(true, Ordering::Release);
        Ok(())
    }

    fn end_scene(&self) -> Result<(), DeviceError> {
        self.drawing.store(false, Ordering::Release);
        self.scenes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn measure(pacer: &FramePacer<ConsoleDevice>, device: &ConsoleDevice, window: Duration) {
    let before = device.scenes.load(Ordering::Relaxed);
    let started = Instant::now();
    std::thread::sleep(window);
    let frames = device.scenes.load(Ordering::Relaxed) - before;

    tracing::info!(
        "target: {:?}, observed: {:.1} fps",
        pacer.target_rate(),
        f64::from(frames) / started.elapsed().as_secs_f64()
    );
}

pub fn main() {
    #[cfg(feature = "profile")]
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(tracing_tracy::TracyLayer::new()),
    )
    .expect("set up the subscriber");

    #[cfg(not(feature = "profile"))]
    tracing_subscriber::fmt::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let device = Arc::new(ConsoleDevice::default());
    let pacer = FramePacer::with_device(device.clone(), 30);

    pacer.on_frame_starting(|pacer, _| {
        tracing::trace!(frame = pacer.frame_id().0, "frame starting");
        Ok(())
    });
    pacer.on_frame(|_, device| {
        device.fill("cornflower blue");
        Ok(())
    });

    pacer.start().unwrap();
    measure(&pacer, &device, Duration::from_secs(2));

    pacer.set_target_rate(FramesPerSecond(120));
    measure(&pacer, &device, Duration::from_secs(2));

    pacer.pause();
    measure(&pacer, &device, Duration::from_millis(500));
    pacer.resume();

    pacer.set_target_rate(FramesPerSecond::UNTHROTTLED);
    measure(&pacer, &device, Duration::from_secs(1));

    pacer.stop();
    pacer.dispose();
}
