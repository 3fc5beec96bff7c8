//! Display helpers for incident ages and chat timestamps.

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::ChatMessage;

fn plural(n: i64, unit: &str) -> String {
    format!("{n} {unit}{} ago", if n == 1 { "" } else { "s" })
}

/// "N mins ago", "N hours ago", "N days ago". Future times read as 0 mins.
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - then).num_minutes().max(0);
    if diff < 60 {
        return plural(diff, "min");
    }
    let hours = diff / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(hours / 24, "day")
}

/// Chat timestamp label in the zone of `now`.
///
/// Pending timestamps render as an empty string.
pub fn format_message_time<Tz: TimeZone>(timestamp_ms: Option<i64>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let Some(ms) = timestamp_ms else {
        return String::new();
    };
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(ms) else {
        return String::new();
    };
    let at = utc.with_timezone(&now.timezone());
    let clock = at.format("%H:%M");
    let days = now.date_naive().num_days_from_ce() - at.date_naive().num_days_from_ce();
    match days {
        0 => clock.to_string(),
        1 => format!("Yesterday {clock}"),
        2..=6 => format!("{} {clock}", at.format("%a")),
        _ => format!("{} {clock}", at.format("%b %-d")),
    }
}

/// "You" for own messages, else the sender's display name or key.
pub fn author_label<'a>(msg: &'a ChatMessage, me: Option<&str>) -> &'a str {
    if me == Some(msg.author_key.as_str()) {
        return "You";
    }
    let name = msg.display_name.trim();
    if name.is_empty() {
        &msg.author_key
    } else {
        name
    }
}
