use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::{
    device::{BoxError, DeviceError},
    pacer::PacerHandle,
};

/// A subscriber callback. It runs on the frame thread and receives the pacer
/// that invoked it along with the attached device.
pub type Callback<D> = Arc<dyn Fn(&PacerHandle<D>, &D) -> Result<(), BoxError> + Send + Sync>;

/// The three points in a paced iteration that subscribers can observe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Notification {
    /// Fired before the scene is opened.
    FrameStarting,
    /// Fired with the scene open. Draw calls belong here.
    Frame,
    /// Fired after the scene is closed.
    FrameEnding,
}

impl Notification {
    pub const ALL: [Self; 3] = [Self::FrameStarting, Self::Frame, Self::FrameEnding];

    const fn index(self) -> usize {
        match self {
            Self::FrameStarting => 0,
            Self::Frame => 1,
            Self::FrameEnding => 2,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FrameStarting => "frame-starting",
            Self::Frame => "frame",
            Self::FrameEnding => "frame-ending",
        })
    }
}

/// Returned by `subscribe`. Pass it to `unsubscribe` to remove the callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    notification: Notification,
    serial: u64,
}

impl SubscriptionId {
    #[must_use]
    pub fn notification(&self) -> Notification {
        self.notification
    }
}

/// Why a frame-thread run ended early.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("No render device is attached to the pacer.")]
    NoDevice,
    #[error("A {notification} subscriber failed: {source}")]
    Subscriber {
        notification: Notification,
        source: BoxError,
    },
    #[error("The render device could not {operation}: {source}")]
    Device {
        operation: &'static str,
        source: DeviceError,
    },
    #[error("The frame thread panicked: {0}")]
    Panicked(String),
}

impl FrameError {
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };

        Self::Panicked(message)
    }
}

type Entries<D> = Arc<Vec<(SubscriptionId, Callback<D>)>>;

/// The subscriber lists for all three notifications.
///
/// Each list is copy-on-write: dispatch clones the `Arc` under a brief read
/// lock and iterates without holding it. Callbacks can therefore subscribe or
/// unsubscribe (even themselves) while a frame is in flight. Such changes are
/// seen from the next dispatch on.
pub(crate) struct Subscribers<D> {
    next_serial: AtomicU64,
    lists: [RwLock<Entries<D>>; 3],
}

impl<D> Subscribers<D> {
    pub fn new() -> Self {
        Self {
            next_serial: AtomicU64::new(0),
            lists: [
                RwLock::new(Arc::new(Vec::new())),
                RwLock::new(Arc::new(Vec::new())),
                RwLock::new(Arc::new(Vec::new())),
            ],
        }
    }

    pub fn subscribe(&self, notification: Notification, callback: Callback<D>) -> SubscriptionId {
        let id = SubscriptionId {
            notification,
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
        };

        let mut list = self.lists[notification.index()].write();
        Arc::make_mut(&mut *list).push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut list = self.lists[id.notification.index()].write();
        let Some(position) = list.iter().position(|(entry, _)| entry.serial == id.serial) else {
            return false;
        };

        Arc::make_mut(&mut *list).remove(position);
        true
    }

    pub fn len(&self, notification: Notification) -> usize {
        self.lists[notification.index()].read().len()
    }

    pub fn clear(&self) {
        for list in &self.lists {
            *list.write() = Arc::new(Vec::new());
        }
    }

    /// Invokes every subscriber of `notification` in registration order,
    /// stopping at the first failure.
    pub fn notify(
        &self,
        notification: Notification,
        pacer: &PacerHandle<D>,
        device: &D,
    ) -> Result<(), FrameError> {
        let snapshot = self.lists[notification.index()].read().clone();

        for (_, callback) in snapshot.iter() {
            callback(pacer, device).map_err(|source| FrameError::Subscriber {
                notification,
                source,
            })?;
        }

        Ok(())
    }
}
