//! User-facing message texts and report formatting.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::transport::{Embed, EmbedFooter, OutboundMessage};

pub const ACKNOWLEDGEMENT: &str = "Đang tìm kiếm tin tức, vui lòng chờ...";
pub const REPORT_HEADING: &str = "📰 **Dạ dưới đây là thông tin anh cần**";
pub const TIMER_HEADING: &str = "📰 **Automatic Tech News Update** 🕐";
pub const IN_FLIGHT_NOTICE: &str = "Yêu cầu cho chủ đề này đang được xử lý, vui lòng chờ.";
pub const ERROR_TITLE: &str = "❌ Error";
pub const ERROR_DESCRIPTION: &str = "Sorry, something went wrong while fetching the news.";

pub const REPORT_COLOR: u32 = 0x0099ff;
pub const TIMER_COLOR: u32 = 0x00ff88;
pub const ERROR_COLOR: u32 = 0xff0000;

/// Keep at most `max` characters of `text`.
pub fn truncate_report(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

pub fn acknowledgement() -> OutboundMessage {
    OutboundMessage::text(ACKNOWLEDGEMENT)
}

pub fn in_flight_notice() -> OutboundMessage {
    OutboundMessage::text(IN_FLIGHT_NOTICE)
}

/// Answer to a chat message or command.
pub fn report_message(report: &str, max_chars: usize) -> OutboundMessage {
    OutboundMessage::text(REPORT_HEADING).with_embed(Embed {
        description: Some(truncate_report(report, max_chars).to_string()),
        color: Some(REPORT_COLOR),
        ..Embed::default()
    })
}

/// Unprompted report posted by the recurring timer.
pub fn timer_message(
    topic: &str,
    report: &str,
    max_chars: usize,
    next_update: Duration,
    now: DateTime<Utc>,
) -> OutboundMessage {
    OutboundMessage::text(TIMER_HEADING).with_embed(Embed {
        title: Some(format!("🤖 Automatic Tech News Update - {topic}")),
        description: Some(truncate_report(report, max_chars).to_string()),
        color: Some(TIMER_COLOR),
        timestamp: Some(now.to_rfc3339()),
        footer: Some(EmbedFooter {
            text: format!("Next update in {}", describe_interval(next_update)),
        }),
    })
}

/// Whole hours when the interval is a multiple of an hour, otherwise minutes rounded up.
pub fn describe_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        return format!("{} hours", secs / 3600);
    }
    let minutes = secs.div_ceil(60).max(1);
    if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{minutes} minutes")
    }
}

/// Generic failure card; never carries error details.
pub fn error_message(ephemeral: bool) -> OutboundMessage {
    OutboundMessage {
        content: String::new(),
        embeds: vec![Embed {
            title: Some(ERROR_TITLE.to_string()),
            description: Some(ERROR_DESCRIPTION.to_string()),
            color: Some(ERROR_COLOR),
            ..Embed::default()
        }],
        ephemeral,
    }
}
