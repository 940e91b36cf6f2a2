//! ADB connection management for local and remote devices.

use std::process::Output;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::retry::{retry_with, Backoff};

/// Delay step while waiting for a device to come online.
pub const DEVICE_WAIT_STEP: Duration = Duration::from_millis(500);

/// Maximum number of retries while waiting for a device.
pub const DEVICE_WAIT_RETRIES: u32 = 10;

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

/// ADB errors.
#[derive(Error, Debug)]
pub enum AdbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Command execution failed: {0}")]
    CommandFailed(String),
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Unexpected output: {0}")]
    Parse(String),
}

/// Manages ADB connections to Android devices.
///
/// # Example
/// ```rust,no_run
/// use voice_agent::adb::ADBConnection;
///
/// # async fn demo() -> Result<(), voice_agent::adb::AdbError> {
/// let conn = ADBConnection::new();
/// conn.connect("192.168.1.100:5555").await?;
/// let devices = conn.list_devices().await?;
/// # Ok(())
/// # }
/// ```
pub struct ADBConnection {
    adb_path: String,
}

impl Default for ADBConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ADBConnection {
    /// Create a new ADB connection manager with default path.
    pub fn new() -> Self {
        Self {
            adb_path: "adb".to_string(),
        }
    }

    /// Create a new ADB connection manager with custom ADB path.
    pub fn with_path(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    /// Connect to a remote device via TCP/IP ("host" or "host:port").
    pub async fn connect(&self, address: &str) -> Result<String, AdbError> {
        let address = if !address.contains(':') {
            format!("{}:5555", address)
        } else {
            address.to_string()
        };

        let output = Command::new(&self.adb_path)
            .args(["connect", &address])
            .output()
            .await
            .map_err(|e| AdbError::Connection(e.to_string()))?;

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        let lower = combined.to_lowercase();
        if lower.contains("connected") && !lower.contains("cannot") {
            Ok(format!("Connected to {}", address))
        } else {
            Err(AdbError::Connection(combined.trim().to_string()))
        }
    }

    /// List all connected devices.
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, AdbError> {
        let output = Command::new(&self.adb_path)
            .args(["devices", "-l"])
            .output()
            .await
            .map_err(|e| AdbError::CommandFailed(e.to_string()))?;

        Ok(parse_device_list(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Wait until the device (or any device when `device_id` is `None`) is
    /// online, polling every 500ms with at most 10 retries.
    pub async fn wait_for_device(&self, device_id: Option<&str>) -> Result<DeviceInfo, AdbError> {
        let wanted = device_id.map(str::to_string);
        retry_with(
            DEVICE_WAIT_RETRIES + 1,
            Backoff::linear(DEVICE_WAIT_STEP).with_max_delay(DEVICE_WAIT_STEP),
            |e: &AdbError| matches!(e, AdbError::DeviceNotFound(_)),
            |attempt| {
                let wanted = wanted.clone();
                async move {
                    let devices = self.list_devices().await?;
                    let found = devices.into_iter().find(|d| {
                        d.status == "device"
                            && wanted.as_deref().map_or(true, |id| d.device_id == id)
                    });
                    found.ok_or_else(|| {
                        tracing::debug!(attempt, "Waiting for device");
                        AdbError::DeviceNotFound(wanted.unwrap_or_else(|| "any".to_string()))
                    })
                }
            },
        )
        .await
    }
}

fn parse_device_list(stdout: &str) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for line in stdout.lines().skip(1) {
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

/// Get ADB command prefix with optional device specifier.
pub(crate) fn get_adb_prefix(device_id: Option<&str>) -> Vec<String> {
    match device_id {
        Some(id) => vec!["adb".to_string(), "-s".to_string(), id.to_string()],
        None => vec!["adb".to_string()],
    }
}

/// Run `adb [-s id] <args>` and collect its output.
pub(crate) async fn run_adb<I, S>(device_id: Option<&str>, args: I) -> Result<Output, AdbError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let prefix = get_adb_prefix(device_id);
    Command::new(&prefix[0])
        .args(&prefix[1..])
        .args(args)
        .output()
        .await
        .map_err(|e| AdbError::CommandFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adb_connection_new() {
        let conn = ADBConnection::new();
        assert_eq!(conn.adb_path, "adb");
    }

    #[test]
    fn test_get_adb_prefix() {
        let prefix = get_adb_prefix(None);
        assert_eq!(prefix, vec!["adb"]);

        let prefix_with_device = get_adb_prefix(Some("device123"));
        assert_eq!(prefix_with_device, vec!["adb", "-s", "device123"]);
    }

    #[test]
    fn test_parse_device_list() {
        let stdout = "List of devices attached\n\
            emulator-5554          device product:sdk model:Pixel_7 transport_id:1\n\
            192.168.1.100:5555     offline\n\
            R58M12ABC              device usb:1-1 model:SM_G991B\n\n";
        let devices = parse_device_list(stdout);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].model.as_deref(), Some("Pixel_7"));
        assert_eq!(devices[1].connection_type, ConnectionType::Remote);
        assert_eq!(devices[1].status, "offline");
        assert_eq!(devices[2].connection_type, ConnectionType::Usb);
    }
}
