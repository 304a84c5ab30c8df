//! Screenshot capture for the Android device screen.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::fs;
use std::path::Path;

use super::connection::{AdbCommand, DeviceError};

/// PNG magic bytes.
const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// A captured screen, kept as the PNG bytes returned by `screencap -p`.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Screenshot {
    /// Validate PNG data and read its dimensions.
    pub fn from_png(png: Vec<u8>) -> Result<Self, DeviceError> {
        if png.len() < PNG_SIGNATURE.len() {
            return Err(DeviceError::Capture(format!(
                "screenshot data too small: {} bytes",
                png.len()
            )));
        }

        if &png[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
            return Err(DeviceError::Capture(format!(
                "invalid PNG header: {:?}",
                &png[..PNG_SIGNATURE.len()]
            )));
        }

        let img = image::load_from_memory(&png)
            .map_err(|e| DeviceError::Capture(format!("failed to parse screenshot image: {}", e)))?;

        Ok(Self {
            width: img.width(),
            height: img.height(),
            png,
        })
    }

    /// Base64 encoding of the PNG data, as sent to the model.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    /// Write the PNG to disk.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, &self.png)
    }
}

/// Capture a screenshot with `adb exec-out screencap -p`.
///
/// The image goes straight to stdout, avoiding disk I/O on both the device
/// and the host.
pub(crate) async fn capture_screenshot(cmd: &AdbCommand) -> Result<Screenshot, DeviceError> {
    let output = cmd
        .run_raw(&["exec-out", "screencap", "-p"], cmd.screenshot_timeout)
        .await
        .map_err(|e| match e {
            DeviceError::Timeout { .. } => e,
            other => DeviceError::Capture(other.to_string()),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeviceError::Capture(format!(
            "screencap exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Screenshot::from_png(output.stdout)
}
