//! Device control over ADB: input injection and foreground app lookup.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::time::sleep;

use super::connection::run_adb;
use super::input::type_text_with_keyboard_handling;
use crate::actions::InputBackend;
use crate::device::UiNode;

static FOCUSED_PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:mCurrentFocus|mFocusedApp)=.*?\s([A-Za-z][\w.]*)/").expect("valid focus regex")
});

/// Get the package of the focused window, or an empty string when unknown.
pub async fn get_foreground_package(device_id: Option<&str>) -> String {
    match run_adb(device_id, ["shell", "dumpsys", "window"]).await {
        Ok(output) => parse_foreground_package(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            tracing::warn!("dumpsys window failed: {}", e);
            String::new()
        }
    }
}

fn parse_foreground_package(dumpsys: &str) -> String {
    dumpsys
        .lines()
        .find_map(|line| FOCUSED_PACKAGE.captures(line).map(|c| c[1].to_string()))
        .unwrap_or_default()
}

/// Map a friendly key name to an Android keycode.
pub fn keycode_for(key: &str) -> Option<String> {
    let code = match key.trim().to_lowercase().as_str() {
        "home" => "KEYCODE_HOME",
        "back" => "KEYCODE_BACK",
        "enter" | "return" => "KEYCODE_ENTER",
        "delete" | "backspace" | "del" => "KEYCODE_DEL",
        "recent_apps" | "recents" | "app_switch" => "KEYCODE_APP_SWITCH",
        "search" => "KEYCODE_SEARCH",
        "menu" => "KEYCODE_MENU",
        "volume_up" => "KEYCODE_VOLUME_UP",
        "volume_down" => "KEYCODE_VOLUME_DOWN",
        "tab" => "KEYCODE_TAB",
        _ => {
            let raw = key.trim();
            if raw.starts_with("KEYCODE_") || (!raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit())) {
                return Some(raw.to_string());
            }
            return None;
        }
    };
    Some(code.to_string())
}

/// `InputBackend` that injects input with `adb shell input`.
#[derive(Debug, Clone, Default)]
pub struct AdbInput {
    device_id: Option<String>,
    /// Delay after each gesture to let the UI react.
    settle: Duration,
}

impl AdbInput {
    pub fn new(device_id: Option<String>) -> Self {
        Self {
            device_id,
            settle: Duration::from_millis(300),
        }
    }

    /// Set the post-gesture delay.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn device(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    async fn shell(&self, args: &[&str]) -> bool {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        let ok = match run_adb(self.device(), &full).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::warn!("adb {:?} failed: {}", args, e);
                false
            }
        };
        if ok && !self.settle.is_zero() {
            sleep(self.settle).await;
        }
        ok
    }
}

#[async_trait]
impl InputBackend for AdbInput {
    async fn activate_node(&self, node: &UiNode) -> bool {
        // ADB has no node handles; target the resolved node's centre so the
        // tap lands on that node rather than an overlapping neighbour edge.
        let (x, y) = node.element.bounds.center();
        self.tap(x, y).await
    }

    async fn tap(&self, x: i32, y: i32) -> bool {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()]).await
    }

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> bool {
        // Duration scales with distance, clamped to a natural range.
        let dist_sq = ((x1 - x2) as i64).pow(2) + ((y1 - y2) as i64).pow(2);
        let duration = (dist_sq / 1000).clamp(300, 1500);
        self.shell(&[
            "input",
            "swipe",
            &x1.to_string(),
            &y1.to_string(),
            &x2.to_string(),
            &y2.to_string(),
            &duration.to_string(),
        ])
        .await
    }

    async fn type_text(&self, text: &str) -> bool {
        type_text_with_keyboard_handling(text, self.device()).await
    }

    async fn back(&self) -> bool {
        self.shell(&["input", "keyevent", "KEYCODE_BACK"]).await
    }

    async fn key_press(&self, key: &str) -> bool {
        match keycode_for(key) {
            Some(code) => self.shell(&["input", "keyevent", &code]).await,
            None => {
                tracing::warn!(key, "Unknown key");
                false
            }
        }
    }

    async fn launch_package(&self, package: &str) -> bool {
        self.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])
        .await
    }

    async fn list_packages(&self) -> Option<Vec<String>> {
        let output = run_adb(self.device(), ["shell", "pm", "list", "packages", "-3"])
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let mut packages: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|l| l.trim().strip_prefix("package:").map(str::to_string))
            .collect();
        packages.sort();
        Some(packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_foreground_package() {
        let dumpsys = "  mCurrentFocus=Window{1a2b3c u0 com.android.settings/com.android.settings.Settings}\n  mFocusedApp=ActivityRecord{...}";
        assert_eq!(parse_foreground_package(dumpsys), "com.android.settings");
        assert_eq!(parse_foreground_package("nothing here"), "");
    }

    #[test]
    fn test_keycode_for() {
        assert_eq!(keycode_for("Home").as_deref(), Some("KEYCODE_HOME"));
        assert_eq!(keycode_for("enter").as_deref(), Some("KEYCODE_ENTER"));
        assert_eq!(keycode_for("KEYCODE_CAMERA").as_deref(), Some("KEYCODE_CAMERA"));
        assert_eq!(keycode_for("66").as_deref(), Some("66"));
        assert_eq!(keycode_for("smile"), None);
    }
}
