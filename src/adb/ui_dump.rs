//! Parsing of `uiautomator dump` XML into a `UiTree` arena.

use once_cell::sync::Lazy;
use regex::Regex;

use super::connection::{run_adb, AdbError};
use crate::device::{Bounds, NodeId, UiElement, UiTree};

/// Where the dump is written on the device.
const DUMP_PATH: &str = "/sdcard/window_dump.xml";

static NODE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)node\b([^>]*?)(/?)>").expect("valid node tag regex"));

static ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([\w:-]+)="([^"]*)""#).expect("valid attribute regex"));

static BOUNDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").expect("valid bounds regex")
});

/// Dump the current UI hierarchy and parse it.
pub async fn dump_ui_tree(device_id: Option<&str>) -> Result<UiTree, AdbError> {
    let output = run_adb(device_id, ["exec-out", "uiautomator", "dump", DUMP_PATH]).await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.contains("ERROR") {
        return Err(AdbError::CommandFailed(stdout.trim().to_string()));
    }

    let output = run_adb(device_id, ["exec-out", "cat", DUMP_PATH]).await?;
    parse_hierarchy(&String::from_utf8_lossy(&output.stdout))
}

/// Parse uiautomator XML. Node ids follow document order.
pub fn parse_hierarchy(xml: &str) -> Result<UiTree, AdbError> {
    if !xml.contains("<hierarchy") {
        return Err(AdbError::Parse("missing <hierarchy> root".to_string()));
    }

    let mut tree = UiTree::new();
    let mut open: Vec<NodeId> = Vec::new();

    for caps in NODE_TAG.captures_iter(xml) {
        let closing = !caps[1].is_empty();
        let self_closing = !caps[3].is_empty();

        if closing {
            open.pop();
            continue;
        }

        let element = parse_element(&caps[2]);
        let id = tree.push(open.last().copied(), element);
        if !self_closing {
            open.push(id);
        }
    }

    Ok(tree)
}

fn parse_element(attrs: &str) -> UiElement {
    let mut element = UiElement::default();
    let mut content_desc = String::new();
    let mut long_clickable = false;

    for caps in ATTRIBUTE.captures_iter(attrs) {
        let value = unescape(&caps[2]);
        match &caps[1] {
            "class" => element.kind = value,
            "text" => element.text = value,
            "content-desc" => content_desc = value,
            "clickable" => element.clickable = value == "true",
            "long-clickable" => long_clickable = value == "true",
            "scrollable" => element.scrollable = value == "true",
            "bounds" => element.bounds = parse_bounds(&value).unwrap_or_default(),
            _ => {}
        }
    }

    if element.text.is_empty() {
        element.text = content_desc;
    }
    element.clickable |= long_clickable;
    element.editable = element.kind.contains("EditText") || element.kind.contains("AutoCompleteTextView");
    element
}

fn parse_bounds(raw: &str) -> Option<Bounds> {
    let caps = BOUNDS.captures(raw)?;
    let n = |i: usize| caps[i].parse::<i32>().ok();
    Some(Bounds::from_corners(n(1)?, n(2)?, n(3)?, n(4)?))
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" class="android.widget.FrameLayout" package="com.android.settings" content-desc="" clickable="false" scrollable="false" bounds="[0,0][1080,2400]">
    <node index="0" text="" class="androidx.recyclerview.widget.RecyclerView" package="com.android.settings" content-desc="" clickable="false" scrollable="true" bounds="[0,200][1080,2200]">
      <node index="0" text="Network &amp; internet" class="android.widget.TextView" package="com.android.settings" content-desc="" clickable="true" scrollable="false" bounds="[0,200][1080,400]" />
      <node index="1" text="" class="android.widget.ImageButton" package="com.android.settings" content-desc="Search settings" clickable="false" long-clickable="true" scrollable="false" bounds="[900,40][1040,160]" />
    </node>
    <node index="1" text="" class="android.widget.EditText" package="com.android.settings" content-desc="" clickable="true" scrollable="false" bounds="[0,2200][1080,2400]" />
  </node>
</hierarchy>"#;

    #[test]
    fn test_parse_hierarchy_structure() {
        let tree = parse_hierarchy(SAMPLE).unwrap();
        assert_eq!(tree.len(), 5);

        let list = tree.get(NodeId(1)).unwrap();
        assert_eq!(list.parent, Some(NodeId(0)));
        assert_eq!(list.children, vec![NodeId(2), NodeId(3)]);
        assert!(list.element.scrollable);

        let edit = tree.get(NodeId(4)).unwrap();
        assert_eq!(edit.parent, Some(NodeId(0)));
        assert!(edit.element.editable);
    }

    #[test]
    fn test_parse_element_attributes() {
        let tree = parse_hierarchy(SAMPLE).unwrap();
        let row = &tree.get(NodeId(2)).unwrap().element;
        assert_eq!(row.text, "Network & internet");
        assert_eq!(row.bounds, Bounds::new(0, 200, 1080, 200));

        let search = &tree.get(NodeId(3)).unwrap().element;
        assert_eq!(search.text, "Search settings");
        assert!(search.clickable);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_hierarchy("ERROR: could not get idle state.").is_err());
    }
}
