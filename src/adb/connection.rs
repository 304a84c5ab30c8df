//! ADB connection management for local and remote devices.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use super::device::AdbDevice;
use crate::ports::DeviceConnector;

/// Timeout for `adb devices` / `adb connect`.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for ordinary `adb shell` commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for `screencap`; remote devices under concurrent load are slow.
pub const DEFAULT_SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(15);

/// Type of ADB connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionType {
    Usb,
    Wifi,
    Remote,
}

/// Information about a connected device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_id: String,
    pub status: String,
    pub connection_type: ConnectionType,
    pub model: Option<String>,
}

/// Device bridge errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("ADB executable not found: {0} (install Android SDK Platform-Tools and add it to PATH)")]
    ToolMissing(String),
    #[error("ADB command `{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Screenshot failed: {0}")]
    Capture(String),
    #[error("Input failed: {0}")]
    Actuation(String),
    #[error("Command execution failed: {0}")]
    CommandFailed(String),
}

impl DeviceError {
    /// Whether this error comes from connecting rather than from a single call.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            DeviceError::ToolMissing(_) | DeviceError::Timeout { .. } | DeviceError::Connection(_)
        )
    }
}

/// A prepared `adb [-s device]` invocation with timeouts.
#[derive(Debug, Clone)]
pub(crate) struct AdbCommand {
    adb_path: String,
    device_id: Option<String>,
    pub(crate) command_timeout: Duration,
    pub(crate) screenshot_timeout: Duration,
}

impl AdbCommand {
    pub(crate) fn new(adb_path: impl Into<String>, device_id: Option<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            device_id,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            screenshot_timeout: DEFAULT_SCREENSHOT_TIMEOUT,
        }
    }

    /// Arguments placed before every command.
    pub(crate) fn prefix_args(&self) -> Vec<String> {
        match &self.device_id {
            Some(id) => vec!["-s".to_string(), id.clone()],
            None => Vec::new(),
        }
    }

    /// Run and return the raw process output, whatever the exit status.
    pub(crate) async fn run_raw(
        &self,
        args: &[&str],
        limit: Duration,
    ) -> Result<Output, DeviceError> {
        let mut command = Command::new(&self.adb_path);
        command.args(self.prefix_args()).args(args).kill_on_drop(true);

        match timeout(limit, command.output()).await {
            Err(_) => Err(DeviceError::Timeout {
                command: args.join(" "),
                secs: limit.as_secs(),
            }),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                Err(DeviceError::ToolMissing(self.adb_path.clone()))
            }
            Ok(Err(e)) => Err(DeviceError::CommandFailed(e.to_string())),
            Ok(Ok(output)) => Ok(output),
        }
    }

    /// Run with the shell timeout and return stdout; a non-zero exit is an error.
    pub(crate) async fn run(&self, args: &[&str]) -> Result<String, DeviceError> {
        let output = self.run_raw(args, self.command_timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeviceError::CommandFailed(format!(
                "`adb {}` exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Opens ADB sessions to Android devices.
///
/// Supports USB, WiFi, and remote TCP/IP connections. Ids of the form
/// `host:port` are `adb connect`-ed before the device list is checked.
///
/// # Example
/// ```rust,no_run
/// use game_agent::adb::AdbConnector;
/// use game_agent::ports::DeviceConnector;
///
/// # async fn demo() -> Result<(), game_agent::adb::DeviceError> {
/// let connector = AdbConnector::new();
/// let device = connector.connect("192.168.1.100:5555").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AdbConnector {
    adb_path: String,
    list_timeout: Duration,
}

impl Default for AdbConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl AdbConnector {
    /// Create a connector using `adb` from PATH.
    pub fn new() -> Self {
        Self {
            adb_path: "adb".to_string(),
            list_timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    /// Create a connector with a custom ADB path.
    pub fn with_path(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            ..Self::new()
        }
    }

    fn global_command(&self) -> AdbCommand {
        AdbCommand::new(&self.adb_path, None)
    }

    /// Connect to a remote device via TCP/IP.
    pub async fn connect_remote(&self, address: &str) -> Result<String, DeviceError> {
        let address = if address.contains(':') {
            address.to_string()
        } else {
            format!("{}:5555", address)
        };

        let output = self
            .global_command()
            .run_raw(&["connect", &address], self.list_timeout)
            .await?;

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let lowered = combined.to_lowercase();

        if lowered.contains("connected")
            && !lowered.contains("unable")
            && !lowered.contains("failed")
        {
            Ok(format!("Connected to {}", address))
        } else {
            Err(DeviceError::Connection(combined.trim().to_string()))
        }
    }

    /// List all devices known to the ADB server.
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let output = self
            .global_command()
            .run_raw(&["devices", "-l"], self.list_timeout)
            .await?;
        Ok(parse_devices_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl DeviceConnector for AdbConnector {
    type Device = AdbDevice;

    async fn connect(&self, device_id: &str) -> Result<AdbDevice, DeviceError> {
        if device_id.contains(':') {
            match self.connect_remote(device_id).await {
                Ok(msg) => tracing::info!("{}", msg),
                Err(e) => tracing::warn!("adb connect {} failed: {}", device_id, e),
            }
        }

        let devices = self.list_devices().await?;
        let info = devices
            .iter()
            .find(|d| d.device_id == device_id)
            .ok_or_else(|| {
                DeviceError::Connection(format!(
                    "device {} is not connected (see `adb devices`)",
                    device_id
                ))
            })?;

        if info.status != "device" {
            return Err(DeviceError::Connection(format!(
                "device {} is {}",
                device_id, info.status
            )));
        }

        tracing::info!("Device {} connected ({:?})", device_id, info.connection_type);
        Ok(AdbDevice::new(AdbCommand::new(
            &self.adb_path,
            Some(device_id.to_string()),
        )))
    }
}

/// Parse the output of `adb devices -l`.
pub(crate) fn parse_devices_output(stdout: &str) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for line in stdout.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('*') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let device_id = parts[0].to_string();
        let connection_type = if device_id.contains(':') {
            ConnectionType::Remote
        } else if parts.iter().any(|p| p.starts_with("usb:")) {
            ConnectionType::Usb
        } else {
            ConnectionType::Wifi
        };

        let model = parts
            .iter()
            .find(|p| p.starts_with("model:"))
            .map(|m| m.trim_start_matches("model:").to_string());

        devices.push(DeviceInfo {
            device_id,
            status: parts[1].to_string(),
            connection_type,
            model,
        });
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adb_connector_new() {
        let connector = AdbConnector::new();
        assert_eq!(connector.adb_path, "adb");
        assert_eq!(AdbConnector::with_path("/opt/adb").adb_path, "/opt/adb");
    }

    #[test]
    fn test_prefix_args() {
        let cmd = AdbCommand::new("adb", None);
        assert!(cmd.prefix_args().is_empty());

        let cmd = AdbCommand::new("adb", Some("device123".to_string()));
        assert_eq!(cmd.prefix_args(), vec!["-s", "device123"]);
    }

    #[test]
    fn test_parse_devices_output() {
        let stdout = "List of devices attached\n\
            emulator-5554          device product:sdk model:Pixel_7 transport_id:1\n\
            101.43.137.83:5555     offline\n\
            R58M123ABC             device usb:1-1 model:SM_G973F\n\n";

        let devices = parse_devices_output(stdout);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].device_id, "emulator-5554");
        assert_eq!(devices[0].model.as_deref(), Some("Pixel_7"));
        assert_eq!(devices[1].connection_type, ConnectionType::Remote);
        assert_eq!(devices[1].status, "offline");
        assert_eq!(devices[2].connection_type, ConnectionType::Usb);
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let connector = AdbConnector::with_path("/nonexistent/bin/adb-missing");
        let err = connector.list_devices().await.unwrap_err();
        assert!(matches!(err, DeviceError::ToolMissing(_)));
        assert!(err.is_setup_error());
    }
}
