//! ADB (Android Debug Bridge) module for device interaction.

mod connection;
mod device;
mod screenshot;

pub use connection::{
    AdbConnector, ConnectionType, DeviceError, DeviceInfo, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_LIST_TIMEOUT, DEFAULT_SCREENSHOT_TIMEOUT,
};
pub use device::{AdbDevice, DEFAULT_RESOLUTION};
pub use screenshot::Screenshot;
