//! MQTT-style topic filters
//!
//! `+` matches exactly one level, a trailing `#` matches the remaining levels
//! (including none). Everything else must match level by level.

/// Whether `topic` is selected by `filter`
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
