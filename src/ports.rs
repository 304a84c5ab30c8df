//! Capability traits for the two unreliable collaborators: the device bridge
//! and the vision-language model.

use async_trait::async_trait;
use std::time::Duration;

use crate::adb::{DeviceError, Screenshot};
use crate::config::Position;

/// A connected device that can be observed and tapped.
///
/// Every call is a fallible remote operation with its own timeout.
#[async_trait]
pub trait ActuationPort: Send {
    fn device_id(&self) -> &str;

    async fn screenshot(&mut self) -> Result<Screenshot, DeviceError>;

    /// Tap and then wait `settle` before returning.
    async fn tap(&mut self, at: Position, settle: Duration) -> Result<(), DeviceError>;

    async fn press_back(&mut self, settle: Duration) -> Result<(), DeviceError>;

    /// Screen size in pixels, or a documented default when unavailable.
    async fn screen_resolution(&mut self) -> (u32, u32);
}

/// Opens device sessions. Failures here are the only errors that abort a
/// device's whole run.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    type Device: ActuationPort + 'static;

    async fn connect(&self, device_id: &str) -> Result<Self::Device, DeviceError>;
}

/// A vision-language model: image and instruction in, free text out.
///
/// Transport failures yield an empty string rather than an error; the
/// response parser turns that into "no decision".
#[async_trait]
pub trait PerceptionPort: Send + Sync {
    async fn query(&self, image: &Screenshot, prompt: &str) -> String;

    /// Short backend/model label for logs and summaries.
    fn describe(&self) -> String;
}
