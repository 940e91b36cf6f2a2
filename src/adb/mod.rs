//! ADB (Android Debug Bridge) module for device interaction.

mod connection;
mod device;
pub mod input;
mod screenshot;
mod ui_dump;

use async_trait::async_trait;

pub use connection::{
    ADBConnection, AdbError, ConnectionType, DeviceInfo, DEVICE_WAIT_RETRIES, DEVICE_WAIT_STEP,
};
pub use device::{get_foreground_package, keycode_for, AdbInput};
pub use screenshot::{get_screenshot, Screenshot};
pub use ui_dump::{dump_ui_tree, parse_hierarchy};

use crate::device::{CaptureError, DeviceState, DeviceStateProvider};

/// `DeviceStateProvider` backed by screencap, uiautomator and dumpsys.
#[derive(Debug, Clone, Default)]
pub struct AdbStateProvider {
    device_id: Option<String>,
}

impl AdbStateProvider {
    pub fn new(device_id: Option<String>) -> Self {
        Self { device_id }
    }
}

#[async_trait]
impl DeviceStateProvider for AdbStateProvider {
    async fn capture_state(&self) -> Result<DeviceState, CaptureError> {
        let device = self.device_id.as_deref();

        let screenshot = get_screenshot(device).await;
        let tree = dump_ui_tree(device)
            .await
            .map_err(|e| CaptureError::Hierarchy(e.to_string()))?;
        let foreground = get_foreground_package(device).await;

        tracing::debug!(
            elements = tree.len(),
            foreground = %foreground,
            sensitive = screenshot.is_sensitive,
            "Captured device state"
        );

        Ok(DeviceState::new(tree, foreground).with_screenshot(
            screenshot.base64_data,
            screenshot.width,
            screenshot.height,
        ))
    }
}
