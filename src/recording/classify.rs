use crate::models::action::ElementHints;
use crate::models::event::TargetInfo;

/// Class-name fragments of well-known video player chrome. Clicks on these
/// are transport noise (scrubbers, volume, fullscreen) and are never
/// recorded; media intent comes from the media events themselves.
const MEDIA_CHROME_CLASSES: &[&str] = &[
    "ytp-",
    "vjs-",
    "jw-",
    "plyr",
    "video-control",
    "media-control",
    "player-control",
    "control-bar",
];

/// Whether an event target is part of a media element or its control chrome.
pub fn is_media_chrome(target: &TargetInfo) -> bool {
    if matches!(target.tag_name.as_deref(), Some("video") | Some("audio")) {
        return true;
    }
    target.class_name.as_deref().is_some_and(|class| {
        let class = class.to_lowercase();
        MEDIA_CHROME_CLASSES.iter().any(|k| class.contains(k))
    })
}

/// Fallback metadata an action keeps from its capture target.
pub fn hints_from(target: &TargetInfo) -> ElementHints {
    ElementHints {
        display_name: target.display_name.clone(),
        text: target.text.clone(),
        aria_label: target.aria_label.clone(),
        data_test_id: target.data_test_id.clone(),
        role: target.role.clone(),
        tag_name: target.tag_name.clone(),
        name: target.name.clone(),
    }
}

/// Map key for scroll debouncing: one pending slot per scrolled thing.
pub fn scroll_key(target: Option<&TargetInfo>) -> String {
    target
        .and_then(|t| t.path.clone())
        .unwrap_or_else(|| "window".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_elements_and_player_chrome_are_media() {
        let video = TargetInfo {
            tag_name: Some("video".to_string()),
            ..Default::default()
        };
        assert!(is_media_chrome(&video));

        let scrubber = TargetInfo {
            tag_name: Some("div".to_string()),
            class_name: Some("ytp-progress-bar-container".to_string()),
            ..Default::default()
        };
        assert!(is_media_chrome(&scrubber));

        let button = TargetInfo {
            tag_name: Some("button".to_string()),
            class_name: Some("btn btn-primary".to_string()),
            ..Default::default()
        };
        assert!(!is_media_chrome(&button));
    }

    #[test]
    fn hints_carry_over_capture_metadata() {
        let target = TargetInfo {
            path: Some("/html/body/button".to_string()),
            tag_name: Some("button".to_string()),
            text: Some("Send".to_string()),
            aria_label: Some("Send message".to_string()),
            data_test_id: Some("send".to_string()),
            display_name: Some("Send message".to_string()),
            ..Default::default()
        };
        let hints = hints_from(&target);
        assert_eq!(hints.tag_name.as_deref(), Some("button"));
        assert_eq!(hints.data_test_id.as_deref(), Some("send"));
        assert_eq!(hints.display_name.as_deref(), Some("Send message"));
    }
}
