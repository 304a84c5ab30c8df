//! Device control for a connected Android device.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

use super::connection::{AdbCommand, DeviceError};
use super::screenshot::{capture_screenshot, Screenshot};
use crate::config::Position;
use crate::ports::ActuationPort;

/// Resolution reported when `wm size` is unavailable.
pub const DEFAULT_RESOLUTION: (u32, u32) = (1080, 2400);

/// Android `KEYCODE_BACK`.
const KEYCODE_BACK: &str = "4";

/// An ADB session bound to one device id.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    cmd: AdbCommand,
    device_id: String,
}

impl AdbDevice {
    pub(crate) fn new(cmd: AdbCommand) -> Self {
        let device_id = cmd.prefix_args().pop().unwrap_or_default();
        Self { cmd, device_id }
    }
}

#[async_trait]
impl ActuationPort for AdbDevice {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn screenshot(&mut self) -> Result<Screenshot, DeviceError> {
        capture_screenshot(&self.cmd).await
    }

    async fn tap(&mut self, at: Position, settle: Duration) -> Result<(), DeviceError> {
        let x = at.x.to_string();
        let y = at.y.to_string();

        self.cmd
            .run(&["shell", "input", "tap", &x, &y])
            .await
            .map_err(|e| match e {
                DeviceError::Timeout { .. } => e,
                other => DeviceError::Actuation(other.to_string()),
            })?;

        sleep(settle).await;
        tracing::debug!("Tapped ({}, {})", at.x, at.y);
        Ok(())
    }

    async fn press_back(&mut self, settle: Duration) -> Result<(), DeviceError> {
        self.cmd
            .run(&["shell", "input", "keyevent", KEYCODE_BACK])
            .await
            .map_err(|e| DeviceError::Actuation(e.to_string()))?;

        sleep(settle).await;
        Ok(())
    }

    async fn screen_resolution(&mut self) -> (u32, u32) {
        match self.cmd.run(&["shell", "wm", "size"]).await {
            Ok(output) => parse_wm_size(&output).unwrap_or_else(|| {
                tracing::warn!(
                    "Unrecognised `wm size` output {:?}, using default {:?}",
                    output.trim(),
                    DEFAULT_RESOLUTION
                );
                DEFAULT_RESOLUTION
            }),
            Err(e) => {
                tracing::warn!(
                    "Cannot read screen resolution, using default {:?}: {}",
                    DEFAULT_RESOLUTION,
                    e
                );
                DEFAULT_RESOLUTION
            }
        }
    }
}

/// Parse `wm size` output; an override size wins over the physical size.
pub(crate) fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    output
        .lines()
        .filter(|line| line.contains("size:"))
        .last()
        .and_then(|line| line.rsplit(':').next())
        .and_then(|size| {
            let (w, h) = size.trim().split_once('x')?;
            Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wm_size() {
        assert_eq!(parse_wm_size("Physical size: 1080x2400\n"), Some((1080, 2400)));
        assert_eq!(
            parse_wm_size("Physical size: 1080x2400\nOverride size: 720x1280\n"),
            Some((720, 1280))
        );
        assert_eq!(parse_wm_size("error: no devices"), None);
    }

    #[test]
    fn test_device_id_from_command() {
        let device = AdbDevice::new(AdbCommand::new("adb", Some("emulator-5554".to_string())));
        assert_eq!(device.device_id(), "emulator-5554");
    }
}
