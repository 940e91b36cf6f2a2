//! Text input through the ADB Keyboard IME.
//!
//! Requires ADB Keyboard on the device.
//! See: https://github.com/senzhk/ADBKeyBoard

use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::Duration;
use tokio::time::sleep;

use super::connection::run_adb;

const ADB_KEYBOARD_IME: &str = "com.android.adbkeyboard/.AdbIME";

/// Pause between IME switch, clear and type so the keyboard keeps up.
const IME_SETTLE: Duration = Duration::from_millis(300);

/// Broadcast base64-encoded text to the focused field.
pub async fn type_text(text: &str, device_id: Option<&str>) -> bool {
    let encoded_text = STANDARD.encode(text.as_bytes());
    run_adb(
        device_id,
        ["shell", "am", "broadcast", "-a", "ADB_INPUT_B64", "--es", "msg", encoded_text.as_str()],
    )
    .await
    .map(|o| o.status.success())
    .unwrap_or(false)
}

/// Clear text in the currently focused input field.
pub async fn clear_text(device_id: Option<&str>) -> bool {
    run_adb(device_id, ["shell", "am", "broadcast", "-a", "ADB_CLEAR_TEXT"])
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Switch to ADB Keyboard if needed and return the previous IME.
pub async fn detect_and_set_adb_keyboard(device_id: Option<&str>) -> String {
    let current_ime = match run_adb(
        device_id,
        ["shell", "settings", "get", "secure", "default_input_method"],
    )
    .await
    {
        Ok(o) => format!(
            "{}{}",
            String::from_utf8_lossy(&o.stdout),
            String::from_utf8_lossy(&o.stderr)
        )
        .trim()
        .to_string(),
        Err(e) => {
            tracing::warn!("Could not read current IME: {}", e);
            String::new()
        }
    };

    if !current_ime.contains(ADB_KEYBOARD_IME) {
        if let Err(e) = run_adb(device_id, ["shell", "ime", "set", ADB_KEYBOARD_IME]).await {
            tracing::warn!("Could not switch to ADB Keyboard: {}", e);
        }
    }

    // Warm up the keyboard
    type_text("", device_id).await;

    current_ime
}

/// Restore the original keyboard IME.
pub async fn restore_keyboard(ime: &str, device_id: Option<&str>) {
    if ime.is_empty() || ime.contains(ADB_KEYBOARD_IME) {
        return;
    }
    if let Err(e) = run_adb(device_id, ["shell", "ime", "set", ime]).await {
        tracing::warn!("Could not restore IME {}: {}", ime, e);
    }
}

/// Type text with full keyboard handling (switch, clear, type, restore).
pub async fn type_text_with_keyboard_handling(text: &str, device_id: Option<&str>) -> bool {
    let original_ime = detect_and_set_adb_keyboard(device_id).await;
    sleep(IME_SETTLE).await;

    clear_text(device_id).await;
    sleep(IME_SETTLE).await;

    let typed = type_text(text, device_id).await;
    sleep(IME_SETTLE).await;

    restore_keyboard(&original_ime, device_id).await;
    typed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encoding_round_trips_unicode() {
        let text = "Hello, 世界!";
        let encoded = STANDARD.encode(text.as_bytes());
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }
}
