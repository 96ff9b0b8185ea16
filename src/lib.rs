pub mod error;
pub mod hardware;
pub mod uart;
pub mod arm;
pub mod ffi;

pub use error::{ArmError, Result};
pub use hardware::{
    HardwareInfo, JointInfo, InterfaceInfo, LifecycleState, SystemInterface,
    StateInterface, CommandInterface, HW_IF_POSITION,
};
pub use uart::{SerialConfig, SerialLink, CommandEncoding};
pub use arm::{ArmSystem, PLUGIN_NAME};
