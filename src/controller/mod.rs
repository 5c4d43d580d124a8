//! Controller subsystem for flight stick input
//!
//! 1. [`event_collector`] - gilrs polling on a blocking thread
//! 2. [`input_router`] - bindings from device codes to attributes and commands
//! 3. [`calibration`] - dead band, centering and range scaling
//! 4. [`controller_handle`] - lifecycle management
//!
//! ```text
//! Device ──► Collector ──► Router ──► AttributeStore
//!            (raw codes)   (bound values)
//! ```

pub mod calibration;
pub mod controller_handle;
pub mod event_collector;
pub mod input_router;

pub use controller_handle::{ControllerError, ControllerHandle};
pub use event_collector::{list_devices, CollectorError, CollectorSettings, DeviceInfo};
pub use input_router::{AxisBinding, AxisMode, ButtonBinding, InputRouter};
