//! App name to package name mapping used by `start_app` and goal matching.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Mapping from lower-cased app display names to Android package names.
pub static APP_PACKAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // System
    m.insert("settings", "com.android.settings");
    m.insert("system settings", "com.android.settings");
    m.insert("calendar", "com.android.calendar");
    m.insert("clock", "com.android.deskclock");
    m.insert("alarm", "com.android.deskclock");
    m.insert("calculator", "com.android.calculator2");
    m.insert("camera", "com.android.camera");
    m.insert("gallery", "com.android.gallery3d");
    m.insert("contacts", "com.android.contacts");
    m.insert("messages", "com.android.mms");
    m.insert("phone", "com.android.dialer");
    m.insert("dialer", "com.android.dialer");
    m.insert("files", "com.android.fileexplorer");
    m.insert("file manager", "com.android.fileexplorer");
    m.insert("audio recorder", "com.android.soundrecorder");

    // Google
    m.insert("chrome", "com.android.chrome");
    m.insert("google chrome", "com.android.chrome");
    m.insert("gmail", "com.google.android.gm");
    m.insert("maps", "com.google.android.apps.maps");
    m.insert("google maps", "com.google.android.apps.maps");
    m.insert("youtube", "com.google.android.youtube");

    // Travel & tools
    m.insert("booking", "com.booking");
    m.insert("booking.com", "com.booking");
    m.insert("expedia", "com.expedia.bookings");
    m.insert("duolingo", "com.duolingo");
    m.insert("bluecoins", "com.rammigsoftware.bluecoins");
    m.insert("keep", "com.gotokeep.keep");

    // Social & messaging
    m.insert("微信", "com.tencent.mm");
    m.insert("wechat", "com.tencent.mm");
    m.insert("qq", "com.tencent.mobileqq");
    m.insert("微博", "com.sina.weibo");
    m.insert("小红书", "com.xingin.xhs");
    m.insert("知乎", "com.zhihu.android");

    // Shopping & services
    m.insert("淘宝", "com.taobao.taobao");
    m.insert("京东", "com.jingdong.app.mall");
    m.insert("美团", "com.sankuai.meituan");
    m.insert("高德地图", "com.autonavi.minimap");

    // Video & music
    m.insert("bilibili", "tv.danmaku.bili");
    m.insert("抖音", "com.ss.android.ugc.aweme");
    m.insert("网易云音乐", "com.netease.cloudmusic");

    m
});

/// Get the package name for an app by its display name (case-insensitive).
pub fn get_package(app_name: &str) -> Option<&'static str> {
    APP_PACKAGES.get(app_name.trim().to_lowercase().as_str()).copied()
}

/// Find an app named in a free-form goal, e.g. "open the calendar app".
///
/// Longest matching name wins so "google maps" beats "maps". Names are
/// matched on word boundaries for ASCII names and as substrings otherwise.
pub fn find_app_in_goal(goal: &str) -> Option<(&'static str, &'static str)> {
    let goal = goal.to_lowercase();
    APP_PACKAGES
        .iter()
        .filter(|(name, _)| mentions(&goal, name))
        .max_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| b.0.cmp(a.0)))
        .map(|(name, package)| (*name, *package))
}

fn mentions(goal: &str, name: &str) -> bool {
    if !name.is_ascii() {
        return goal.contains(name);
    }
    goal.match_indices(name).any(|(start, _)| {
        let end = start + name.len();
        let before_ok = goal[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = goal[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
