use async_trait::async_trait;
use serde::Serialize;

use crate::error::DeliveryError;

/// Telegram's per-message text limit, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Escapes characters that Telegram's legacy Markdown treats as markup.
///
/// Escapes are only honoured outside entities, so escaped text must never be
/// wrapped in `*...*`, `_..._` or backticks.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `*text*` when that is valid markup, otherwise the escaped text unstyled.
pub fn bold(s: &str) -> String {
    if s.contains(['_', '*', '`', '[']) {
        escape_markdown(s)
    } else {
        format!("*{s}*")
    }
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// A reply or notification, independent of the chat service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub text: String,
    /// `text` uses `*bold*` / `_italic_` / `` `code` `` markup.
    pub markdown: bool,
    /// Rows of command buttons shown as a persistent keyboard.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<Vec<String>>,
    /// One button per row, each opening a URL.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkButton>,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        OutboundMessage {
            text: text.into(),
            ..OutboundMessage::default()
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        OutboundMessage {
            text: text.into(),
            markdown: true,
            ..OutboundMessage::default()
        }
    }

    pub fn with_quick_replies(mut self, rows: &[&[&str]]) -> Self {
        self.quick_replies = rows
            .iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect();
        self
    }

    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.push(LinkButton {
            label: label.into(),
            url: url.into(),
        });
        self
    }

    /// Splits the text on line boundaries into parts of at most `limit` UTF-16
    /// units. A single line longer than `limit` is cut at char boundaries.
    /// Buttons and keyboards ride on the last part.
    pub fn chunks(&self, limit: usize) -> Vec<OutboundMessage> {
        if utf16_len(&self.text) <= limit {
            return vec![self.clone()];
        }
        let mut parts: Vec<String> = Vec::new();
        let mut cur = String::new();
        let mut cur_len = 0;
        for line in self.text.split('\n') {
            let len = utf16_len(line);
            if len > limit {
                if !cur.is_empty() {
                    parts.push(std::mem::take(&mut cur));
                    cur_len = 0;
                }
                let mut piece = String::new();
                let mut piece_len = 0;
                for c in line.chars() {
                    let w = c.len_utf16();
                    if piece_len + w > limit {
                        parts.push(std::mem::take(&mut piece));
                        piece_len = 0;
                    }
                    piece.push(c);
                    piece_len += w;
                }
                cur = piece;
                cur_len = piece_len;
                continue;
            }
            if !cur.is_empty() && cur_len + 1 + len > limit {
                parts.push(std::mem::take(&mut cur));
                cur_len = 0;
            }
            if !cur.is_empty() {
                cur.push('\n');
                cur_len += 1;
            }
            cur.push_str(line);
            cur_len += len;
        }
        if !cur.is_empty() {
            parts.push(cur);
        }

        let last = parts.len().saturating_sub(1);
        parts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                if i == last {
                    OutboundMessage {
                        text,
                        ..self.clone()
                    }
                } else {
                    OutboundMessage {
                        text,
                        markdown: self.markdown,
                        ..OutboundMessage::default()
                    }
                }
            })
            .collect()
    }
}

/// Outbound side of the chat service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, chat_id: i64, message: &OutboundMessage) -> Result<(), DeliveryError>;
}
