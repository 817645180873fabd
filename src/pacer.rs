//! Lifecycle control for the frame thread.
//!
//! A [`FramePacer`] owns at most one frame thread at a time. Control calls
//! (`start`, `stop`, `pause`, `resume`, `dispose`) may come from any thread and
//! reach the frame thread only through shared atomics. The frame thread
//! itself only ever sees a [`PacerHandle`], so it can never join itself.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use parking_lot::{Mutex, RwLock};

use crate::{
    config::{FaultHandler, PacerConfig},
    device::{BoxError, RenderDevice},
    frame::{FrameError, Notification, SubscriptionId, Subscribers},
    pacing,
    time::{FrameId, FramesPerSecond},
};

#[derive(Debug, thiserror::Error)]
pub enum PacerError {
    #[error("The frame thread is already running. Stop it before starting it again.")]
    AlreadyRunning,
    #[error("The frame thread is being stopped.")]
    Stopping,
    #[error("The pacer has been disposed and cannot be restarted.")]
    Disposed,
    #[error("The frame thread could not be spawned: {0}")]
    Spawn(#[from] std::io::Error),
}

/// State shared between the controlling threads and the frame thread.
pub(crate) struct Shared<D> {
    target_rate: AtomicI32,
    paused: AtomicBool,
    stop_requested: AtomicBool,
    frame: AtomicU64,
    pub(crate) pause_tick: Duration,

    device: RwLock<Option<Arc<D>>>,
    pub(crate) subscribers: Subscribers<D>,

    last_error: Mutex<Option<FrameError>>,
    on_fault: Option<FaultHandler>,
}

/// A cheap, cloneable view of a pacer's state.
///
/// Subscribers receive one of these on every notification. It can adjust the
/// rate, pause, or ask the loop to exit, but it can't wait for the frame thread.
/// Only the owning [`FramePacer`] can do that.
pub struct PacerHandle<D> {
    pub(crate) shared: Arc<Shared<D>>,
}

impl<D> Clone for PacerHandle<D> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<D: RenderDevice> PacerHandle<D> {
    fn new(config: &PacerConfig, device: Option<Arc<D>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                target_rate: AtomicI32::new(config.target_rate.0),
                paused: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                frame: AtomicU64::new(0),
                pause_tick: config.pause_tick.max(Duration::from_millis(1)),
                device: RwLock::new(device),
                subscribers: Subscribers::new(),
                last_error: Mutex::new(None),
                on_fault: config.on_fault.clone(),
            }),
        }
    }

    #[must_use]
    pub fn target_rate(&self) -> FramesPerSecond {
        FramesPerSecond(self.shared.target_rate.load(Ordering::Acquire))
    }

    /// Changes the target rate. A running loop picks it up at the end of its
    /// current batch.
    pub fn set_target_rate(&self, rate: impl Into<FramesPerSecond>) {
        let rate = rate.into();
        self.shared.target_rate.store(rate.0, Ordering::Release);
        tracing::debug!(fps = rate.0, "target rate changed");
    }

    /// Pauses the frame loop. This has no lasting effect unless the frame
    /// thread is running.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Asks the frame loop to exit after the paced iteration in flight. Does
    /// not wait, and does not release the thread slot; the owner still has to
    /// call [`FramePacer::stop`] before starting again.
    pub fn request_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::Acquire)
    }

    /// The frame currently being run, or the next one if none is in flight.
    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        FrameId(self.shared.frame.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn device(&self) -> Option<Arc<D>> {
        self.shared.device.read().clone()
    }

    pub fn set_device(&self, device: Option<Arc<D>>) {
        *self.shared.device.write() = device;
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Release);
    }

    pub(crate) fn finish_frame(&self) {
        self.shared.frame.fetch_add(1, Ordering::AcqRel);
    }

    /// Records a failed run and tells whoever asked to be told.
    pub(crate) fn fault(&self, error: FrameError) {
        if let Some(on_fault) = &self.shared.on_fault {
            on_fault(&error);
        }

        *self.shared.last_error.lock() = Some(error);
    }
}

struct Lifecycle {
    thread: Option<JoinHandle<()>>,
    disposed: bool,
}

/// Drives a caller-supplied rendering pipeline on a dedicated thread.
///
/// Every paced iteration fires [`Notification::FrameStarting`], opens a scene
/// on the device, fires [`Notification::Frame`], closes the scene, and fires
/// [`Notification::FrameEnding`]. With a target rate of `R >= 1` the loop runs
/// batches of `R - 1` iterations, each padded out to `1000 / R` milliseconds;
/// below 1 it runs flat out.
///
/// Dropping the pacer stops the frame thread and waits for it to exit.
pub struct FramePacer<D: RenderDevice> {
    handle: PacerHandle<D>,
    lifecycle: Mutex<Lifecycle>,
    stopping: AtomicBool,
    thread_name: String,
}

impl<D: RenderDevice> FramePacer<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&PacerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &PacerConfig) -> Self {
        Self::build(config, None)
    }

    #[must_use]
    pub fn with_device(device: Arc<D>, target_rate: impl Into<FramesPerSecond>) -> Self {
        let config = PacerConfig {
            target_rate: target_rate.into(),
            ..Default::default()
        };

        Self::build(&config, Some(device))
    }

    #[must_use]
    pub fn with_config_and_device(config: &PacerConfig, device: Arc<D>) -> Self {
        Self::build(config, Some(device))
    }

    fn build(config: &PacerConfig, device: Option<Arc<D>>) -> Self {
        Self {
            handle: PacerHandle::new(config, device),
            lifecycle: Mutex::new(Lifecycle {
                thread: None,
                disposed: false,
            }),
            stopping: AtomicBool::new(false),
            thread_name: config.thread_name.clone(),
        }
    }

    #[must_use]
    pub fn handle(&self) -> &PacerHandle<D> {
        &self.handle
    }

    /// Spawns the frame thread and returns without waiting for a frame.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if the frame thread is already running
    /// (even if it has since died, until [`Self::stop`] clears it), if a stop is
    /// in progress, if the pacer was disposed, or if the thread could not be
    /// spawned.
    pub fn start(&self) -> Result<(), PacerError> {
        let mut lifecycle = self.lifecycle.lock();

        if lifecycle.disposed {
            return Err(PacerError::Disposed);
        }

        // Checked under the lock: a stop takes the thread out of the slot
        // before joining it, so an empty slot alone doesn't mean it's gone.
        if self.stopping.load(Ordering::Acquire) {
            return Err(PacerError::Stopping);
        }

        if lifecycle.thread.is_some() {
            return Err(PacerError::AlreadyRunning);
        }

        self.handle
            .shared
            .stop_requested
            .store(false, Ordering::Release);

        let handle = self.handle.clone();
        let thread = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || pacing::run(&handle))?;

        lifecycle.thread = Some(thread);

        tracing::info!(
            thread = %self.thread_name,
            fps = self.handle.target_rate().0,
            "frame thread started"
        );

        Ok(())
    }

    /// Stops the frame thread and waits for it to exit.
    ///
    /// This never fails. A frame thread that died is joined and cleared like
    /// one that exited normally, and the pacer can be started again afterwards.
    /// Calling this while another thread is stopping the pacer does nothing.
    pub fn stop(&self) {
        self.handle.set_paused(false);

        if self
            .stopping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("stop already in progress");
            return;
        }

        if self.halt() {
            self.handle.set_paused(true);
            tracing::info!("frame thread stopped");
        }

        self.stopping.store(false, Ordering::Release);
    }

    pub fn pause(&self) {
        self.handle.pause();
        tracing::debug!("pause requested");
    }

    pub fn resume(&self) {
        self.handle.resume();
        tracing::debug!("resume requested");
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.handle.is_paused()
    }

    /// Stops the frame thread, detaches the device, and drops every
    /// subscription. Calling it again does nothing.
    ///
    /// If a [`Self::stop`] is already in flight on another thread, that stop
    /// does the joining and this returns without waiting for it.
    pub fn dispose(&self) {
        let claimed = self
            .stopping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.disposed {
                if claimed {
                    self.stopping.store(false, Ordering::Release);
                }
                return;
            }
            lifecycle.disposed = true;
        }

        self.handle.set_paused(false);

        if claimed {
            self.halt();
            self.stopping.store(false, Ordering::Release);
        } else {
            self.handle.request_stop();
        }

        self.handle.set_device(None);
        self.handle.shared.subscribers.clear();

        tracing::info!("frame pacer disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lifecycle.lock().disposed
    }

    /// Whether the frame thread is alive. A thread that ended because of an
    /// error counts as not running, though it still occupies the slot until
    /// [`Self::stop`] is called. So does a thread that is being stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle
            .lock()
            .thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Takes the error that ended the most recent frame-thread run, if any.
    pub fn take_error(&self) -> Option<FrameError> {
        self.handle.shared.last_error.lock().take()
    }

    #[must_use]
    pub fn target_rate(&self) -> FramesPerSecond {
        self.handle.target_rate()
    }

    pub fn set_target_rate(&self, rate: impl Into<FramesPerSecond>) {
        self.handle.set_target_rate(rate);
    }

    #[must_use]
    pub fn device(&self) -> Option<Arc<D>> {
        self.handle.device()
    }

    pub fn set_device(&self, device: Option<Arc<D>>) {
        self.handle.set_device(device);
    }

    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.handle.frame_id()
    }

    /// Registers `callback` for `notification`. Callbacks run on the frame
    /// thread in the order they were registered. An error returned from a
    /// callback ends the current run.
    pub fn subscribe<F>(&self, notification: Notification, callback: F) -> SubscriptionId
    where
        F: Fn(&PacerHandle<D>, &D) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.handle
            .shared
            .subscribers
            .subscribe(notification, Arc::new(callback))
    }

    pub fn on_frame_starting<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PacerHandle<D>, &D) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe(Notification::FrameStarting, callback)
    }

    pub fn on_frame<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PacerHandle<D>, &D) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe(Notification::Frame, callback)
    }

    pub fn on_frame_ending<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PacerHandle<D>, &D) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe(Notification::FrameEnding, callback)
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handle.shared.subscribers.unsubscribe(id)
    }

    #[must_use]
    pub fn subscriber_count(&self, notification: Notification) -> usize {
        self.handle.shared.subscribers.len(notification)
    }

    /// Signals the frame thread to exit and joins it. Returns `true` if a
    /// thread was joined and the slot cleared.
    ///
    /// The caller must hold the `stopping` flag. The lifecycle lock is only
    /// held long enough to take the thread out of its slot, so the frame
    /// thread can still query the pacer while it winds down.
    fn halt(&self) -> bool {
        let thread = {
            let mut lifecycle = self.lifecycle.lock();
            let Some(thread) = lifecycle.thread.take() else {
                return false;
            };

            if thread.thread().id() == std::thread::current().id() {
                // Joining here would deadlock. The loop exits once this frame
                // returns; the slot stays taken until stopped from elsewhere.
                tracing::warn!("stop called from the frame thread; not waiting for it to exit");
                self.handle.request_stop();
                lifecycle.thread = Some(thread);
                return false;
            }

            thread
        };

        self.handle.request_stop();

        // The frame thread catches its own panics, so this only fails if the
        // fault handler panicked. Stopping succeeds regardless.
        if let Err(payload) = thread.join() {
            let error = FrameError::from_panic(&*payload);
            tracing::warn!(%error, "frame thread did not exit cleanly");
            *self.handle.shared.last_error.lock() = Some(error);
        }

        self.handle
            .shared
            .stop_requested
            .store(false, Ordering::Release);

        true
    }
}

impl<D: RenderDevice> Default for FramePacer<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: RenderDevice> Drop for FramePacer<D> {
    fn drop(&mut self) {
        self.dispose();

        // Left behind if the pacer was disposed from its own frame thread.
        if let Some(thread) = self.lifecycle.get_mut().thread.take() {
            if thread.thread().id() != std::thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}
