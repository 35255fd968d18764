//! Log topic naming.

/// Prefix carried by every topic derived from an ingestion target.
pub const TOPIC_PREFIX: &str = "bz.";

/// Prefix for topics derived from MQTT subscriptions.
pub const MQTT_TOPIC_PREFIX: &str = "mq.";

fn topic_chars(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '/' { '.' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// Turn an ingestion target (usually a request path) into a Log topic.
///
/// Strips one leading `/`, maps `/` to `.`, drops characters outside
/// `[A-Za-z0-9._-]` and ensures the `bz.` prefix. Idempotent.
pub fn sanitize_topic(target: &str) -> String {
    let trimmed = target.strip_prefix('/').unwrap_or(target);
    let cleaned = topic_chars(trimmed);
    if cleaned.starts_with(TOPIC_PREFIX) {
        cleaned
    } else {
        format!("{}{}", TOPIC_PREFIX, cleaned)
    }
}

/// Log topic for a message received on MQTT topic `topic`.
pub fn mqtt_topic(topic: &str) -> String {
    format!("{}{}", MQTT_TOPIC_PREFIX, topic_chars(topic))
}

/// Log topic for an SNMP result set.
pub fn snmp_topic(operation: &str, source: &str) -> String {
    format!("snmp.{}.{}", operation, sanitize_topic(source))
}
