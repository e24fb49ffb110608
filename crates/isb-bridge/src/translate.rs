//! Slack message payload -> what the IRC side should see
//!
//! Pure functions over the raw payload; the actor does the lookups and the
//! writing.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@(U[0-9A-Z]*)(?:\|[^>]*)?>").unwrap());
static HERE_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<!here(?:\|[^>]*)?>").unwrap());
static ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&(amp|lt|gt);").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Show `text` from `user` in conversation `channel`
    Display {
        channel: String,
        user: String,
        text: String,
    },
    /// Known, deliberately not shown
    Suppress,
    /// Shape not understood
    Unexpected,
}

fn str_field<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// Only `type == "message"` payloads are interpreted.
pub fn is_message(payload: &Value) -> bool {
    str_field(payload, "type") == Some("message")
}

/// Conversation and timestamp to feed the read-marker, if the payload has both
pub fn mark_target(payload: &Value) -> Option<(&str, &str)> {
    Some((str_field(payload, "channel")?, str_field(payload, "ts")?))
}

/// Apply the display rules in precedence order.
pub fn classify(payload: &Value, relay_bot_ids: &[String]) -> Translation {
    if let Some(display) = relayed_bot_post(payload, relay_bot_ids) {
        return display;
    }

    if let (Some(channel), Some(user), Some(text)) = (
        str_field(payload, "channel"),
        str_field(payload, "user"),
        str_field(payload, "text"),
    ) {
        return display(channel, user, text.to_string());
    }

    match str_field(payload, "subtype") {
        Some("message_deleted") => deleted(payload).unwrap_or(Translation::Unexpected),
        Some("message_changed") => changed(payload).unwrap_or(Translation::Unexpected),
        Some("message_replied") | Some("bot_message") | Some("file_comment") => Translation::Suppress,
        _ => Translation::Unexpected,
    }
}

fn display(channel: &str, user: &str, text: String) -> Translation {
    Translation::Display {
        channel: channel.to_string(),
        user: user.to_string(),
        text,
    }
}

/// An empty post from a relay bot with a single attachment shows the
/// attachment's fallback text.
fn relayed_bot_post(payload: &Value, relay_bot_ids: &[String]) -> Option<Translation> {
    let bot_id = str_field(payload, "bot_id")?;
    if !relay_bot_ids.iter().any(|id| id == bot_id) {
        return None;
    }

    let channel = str_field(payload, "channel")?;
    let user = str_field(payload, "user")?;
    if !str_field(payload, "text")?.is_empty() {
        return None;
    }

    match payload.get("attachments")?.as_array()?.as_slice() {
        [attachment] => {
            let fallback = str_field(attachment, "fallback")?;
            Some(display(channel, user, fallback.to_string()))
        }
        _ => None,
    }
}

fn deleted(payload: &Value) -> Option<Translation> {
    let previous = payload.get("previous_message")?;
    if matches!(str_field(previous, "subtype"), Some("file_share") | Some("file_comment")) {
        return Some(Translation::Suppress);
    }
    Some(display(
        str_field(payload, "channel")?,
        str_field(previous, "user")?,
        format!("[deleted] {}", str_field(previous, "text")?),
    ))
}

fn changed(payload: &Value) -> Option<Translation> {
    let message = payload.get("message")?;
    let new_text = str_field(message, "text")?;
    let old_text = str_field(payload.get("previous_message")?, "text")?;
    if new_text == old_text {
        // attachments or other invisible parts changed
        return Some(Translation::Suppress);
    }
    Some(display(
        str_field(payload, "channel")?,
        str_field(message, "user")?,
        format!("[edited] {}", new_text),
    ))
}

/// Distinct user ids mentioned in `text`
pub fn mentioned_user_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = USER_MENTION
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Split on newlines (`\n` or `\r\n`) and rewrite Slack markup into plain text.
///
/// Unknown user ids are left as the raw id.
pub fn mangle<F>(text: &str, name_of: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    text.split('\n')
        .map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let line = USER_MENTION.replace_all(line, |caps: &Captures| {
                let id = &caps[1];
                format!("<@{}>", name_of(id).unwrap_or_else(|| id.to_string()))
            });
            let line = HERE_MENTION.replace_all(&line, "<@here>");
            ENTITY
                .replace_all(&line, |caps: &Captures| match &caps[1] {
                    "amp" => "&",
                    "lt" => "<",
                    _ => ">",
                })
                .into_owned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shown(channel: &str, user: &str, text: &str) -> Translation {
        display(channel, user, text.to_string())
    }

    #[test]
    fn test_plain_message_is_displayed() {
        let payload = json!({
            "type": "message", "channel": "C1", "user": "U1", "text": "hi", "ts": "1.000001"
        });
        assert!(is_message(&payload));
        assert_eq!(mark_target(&payload), Some(("C1", "1.000001")));
        assert_eq!(classify(&payload, &[]), shown("C1", "U1", "hi"));
    }

    #[test]
    fn test_message_changed_only_when_text_differs() {
        let same = json!({
            "type": "message", "subtype": "message_changed", "channel": "C1",
            "message": { "user": "U1", "text": "hello" },
            "previous_message": { "user": "U1", "text": "hello" }
        });
        assert_eq!(classify(&same, &[]), Translation::Suppress);

        let edited = json!({
            "type": "message", "subtype": "message_changed", "channel": "C1",
            "message": { "user": "U1", "text": "hello!" },
            "previous_message": { "user": "U1", "text": "hello" }
        });
        assert_eq!(classify(&edited, &[]), shown("C1", "U1", "[edited] hello!"));
    }

    #[test]
    fn test_message_deleted() {
        let deleted = json!({
            "type": "message", "subtype": "message_deleted", "channel": "C1",
            "previous_message": { "user": "U1", "text": "oops" }
        });
        assert_eq!(classify(&deleted, &[]), shown("C1", "U1", "[deleted] oops"));

        let file = json!({
            "type": "message", "subtype": "message_deleted", "channel": "C1",
            "previous_message": { "user": "U1", "text": "", "subtype": "file_share" }
        });
        assert_eq!(classify(&file, &[]), Translation::Suppress);
    }

    #[test]
    fn test_suppressed_and_unexpected_subtypes() {
        for subtype in ["message_replied", "bot_message", "file_comment"] {
            let payload = json!({ "type": "message", "subtype": subtype, "channel": "C1" });
            assert_eq!(classify(&payload, &[]), Translation::Suppress, "{}", subtype);
        }
        let odd = json!({ "type": "message", "subtype": "channel_topic", "channel": "C1" });
        assert_eq!(classify(&odd, &[]), Translation::Unexpected);
        assert_eq!(classify(&json!({ "type": "message" }), &[]), Translation::Unexpected);
    }

    #[test]
    fn test_relay_bot_fallback() {
        let payload = json!({
            "type": "message", "bot_id": "B1", "channel": "C1", "user": "U9", "text": "",
            "attachments": [{ "fallback": "build #12 passed" }]
        });
        let relays = vec!["B1".to_string()];
        assert_eq!(classify(&payload, &relays), shown("C1", "U9", "build #12 passed"));

        // an unlisted bot falls through to the plain rule
        assert_eq!(classify(&payload, &[]), shown("C1", "U9", ""));
    }

    #[test]
    fn test_mangle_rewrites_markup() {
        let text = "hey <@U1|alice> and <@U2>, <!here|here> &lt;3 &amp; &gt;\nsecond line";
        let lines = mangle(text, |id| (id == "U1").then(|| "alice".to_string()));
        assert_eq!(lines, vec!["hey <@alice> and <@U2>, <@here> <3 & >", "second line"]);
    }

    #[test]
    fn test_mangle_splits_crlf() {
        assert_eq!(mangle("one\r\ntwo\r\n", |_| None), vec!["one", "two", ""]);
    }

    #[test]
    fn test_mentioned_user_ids_are_distinct() {
        assert_eq!(mentioned_user_ids("<@U2> <@U1|a> <@U2>"), vec!["U1", "U2"]);
    }
}
