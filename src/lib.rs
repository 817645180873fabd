//! Frame pacing on a dedicated thread.
//!
//! A [`FramePacer`] repeatedly runs a rendering pipeline at a target rate. Each
//! paced iteration is bracketed by frame-starting and frame-ending
//! notifications, and the frame notification itself runs inside a scene opened
//! on a [`RenderDevice`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use plinth_pacer::{DeviceError, FramePacer, RenderDevice};
//!
//! struct Device;
//!
//! impl RenderDevice for Device {
//!     fn is_drawing(&self) -> bool {
//!         false
//!     }
//!
//!     fn begin_scene(&self) -> Result<(), DeviceError> {
//!         Ok(())
//!     }
//!
//!     fn end_scene(&self) -> Result<(), DeviceError> {
//!         Ok(())
//!     }
//! }
//!
//! let pacer = FramePacer::with_device(Arc::new(Device), 60);
//! pacer.on_frame(|_pacer, _device| Ok(()));
//! pacer.start().unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! pacer.stop();
//! ```

pub mod config;
pub mod device;
pub mod frame;
pub mod pacer;
mod pacing;
pub mod time;

pub use config::{FaultHandler, PacerConfig};
pub use device::{BoxError, DeviceError, RenderDevice};
pub use frame::{Callback, FrameError, Notification, SubscriptionId};
pub use pacer::{FramePacer, PacerError, PacerHandle};
pub use time::{FrameId, FramesPerSecond, Stopwatch};
