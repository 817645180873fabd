use std::sync::Arc;

/// The error type used by fallible device and subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error reported by a [`RenderDevice`].
pub type DeviceError = BoxError;

/// The slice of a rendering device that the pacer drives.
///
/// The pacer never begins a scene on a device that is already drawing and
/// never ends a scene on a device that isn't, so implementations don't need to
/// guard against either. Everything else about the device (its draw calls,
/// resources, and presentation) is reached by subscribers through the concrete
/// type.
pub trait RenderDevice: Send + Sync + 'static {
    /// Whether a scene is currently open.
    fn is_drawing(&self) -> bool;

    fn begin_scene(&self) -> Result<(), DeviceError>;

    fn end_scene(&self) -> Result<(), DeviceError>;
}

impl<D: RenderDevice + ?Sized> RenderDevice for Arc<D> {
    fn is_drawing(&self) -> bool {
        (**self).is_drawing()
    }

    fn begin_scene(&self) -> Result<(), DeviceError> {
        (**self).begin_scene()
    }

    fn end_scene(&self) -> Result<(), DeviceError> {
        (**self).end_scene()
    }
}

impl<D: RenderDevice + ?Sized> RenderDevice for Box<D> {
    fn is_drawing(&self) -> bool {
        (**self).is_drawing()
    }

    fn begin_scene(&self) -> Result<(), DeviceError> {
        (**self).begin_scene()
    }

    fn end_scene(&self) -> Result<(), DeviceError> {
        (**self).end_scene()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use super::{DeviceError, RenderDevice};

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Call {
        BeginScene,
        EndScene,
        /// Pushed by test subscribers.
        Notify(&'static str),
    }

    /// A device that records every call made against it.
    #[derive(Default)]
    pub struct FakeDevice {
        drawing: AtomicBool,
        calls: Mutex<Vec<Call>>,
        pub fail_begin: AtomicBool,
    }

    impl FakeDevice {
        pub fn new() -> Self {
            Self::default()
        }

        /// Opens a scene without recording the call, as if someone else had.
        pub fn force_drawing(&self, drawing: bool) {
            self.drawing.store(drawing, Ordering::SeqCst);
        }

        pub fn record(&self, call: Call) {
            self.calls.lock().push(call);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    impl RenderDevice for FakeDevice {
        fn is_drawing(&self) -> bool {
            self.drawing.load(Ordering::SeqCst)
        }

        fn begin_scene(&self) -> Result<(), DeviceError> {
            if self.fail_begin.load(Ordering::SeqCst) {
                return Err("device lost".into());
            }

            assert!(!self.is_drawing(), "scene begun twice");
            self.drawing.store(true, Ordering::SeqCst);
            self.record(Call::BeginScene);
            Ok(())
        }

        fn end_scene(&self) -> Result<(), DeviceError> {
            assert!(self.is_drawing(), "scene ended twice");
            self.drawing.store(false, Ordering::SeqCst);
            self.record(Call::EndScene);
            Ok(())
        }
    }
}
