use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};

/// Escape user-supplied text for HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Best-effort deletion of the sibling messages of a product listing.
/// Deletion failures are collected and logged, never surfaced; a message
/// the user already deleted is not an error worth a turn.
pub async fn cleanup_messages(bot: &Bot, chat_id: ChatId, message_ids: &[i32]) {
    let mut failed = 0usize;
    for id in message_ids {
        if bot.delete_message(chat_id, MessageId(*id)).await.is_err() {
            failed += 1;
        }
    }
    if failed > 0 {
        tracing::debug!(
            "listing cleanup in {}: {}/{} deletions failed",
            chat_id,
            failed,
            message_ids.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escaping() {
        assert_eq!(escape_html("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(escape_html("plain"), "plain");
    }
}
