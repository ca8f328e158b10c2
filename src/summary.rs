use crate::db::MessageRecord;
use poise::serenity_prelude as serenity;

pub const DEFAULT_HISTORY_COUNT: usize = 20;
pub const MAX_HISTORY_COUNT: usize = 100;

const SUMMARY_PROMPT: &str = "總結以下 {history_count} 則消息：
{chat_history}
請將總結的部分以發送者當作主要分類，並將他在這段期間內發送的內容總結。
例如:

Wei:
- 他表示了對於某件事情表示了擔憂
- 同時他也發送了一個相關的新聞連結佐證
- 另外，他提到了一個他認為的解決方案

Toudou:
- 他分享了一個 TikTok 影片
- 並分享了他對於那位男性的看法

這樣的總結方式可以幫助你更好地理解這段對話。";

/// The parts of a channel message that matter for a summary.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    pub author: String,
    pub is_bot: bool,
    pub content: String,
    pub embed_descriptions: Vec<String>,
    pub attachment_urls: Vec<String>,
}

impl From<&serenity::Message> for HistoryEntry {
    fn from(message: &serenity::Message) -> Self {
        Self {
            author: message.author.name.clone(),
            is_bot: message.author.bot,
            content: message.content.clone(),
            embed_descriptions: message
                .embeds
                .iter()
                .filter_map(|e| e.description.clone())
                .filter(|d| !d.is_empty())
                .collect(),
            attachment_urls: message.attachments.iter().map(|a| a.url.clone()).collect(),
        }
    }
}

/// Archived rows only ever come from human authors.
impl From<&MessageRecord> for HistoryEntry {
    fn from(record: &MessageRecord) -> Self {
        Self {
            author: record.author.clone(),
            is_bot: false,
            content: record.content.clone(),
            embed_descriptions: Vec::new(),
            attachment_urls: record.attachments.clone(),
        }
    }
}

/// Archive rows (oldest first) as history entries (newest first).
pub fn archived_history(records: &[MessageRecord]) -> Vec<HistoryEntry> {
    records.iter().rev().map(HistoryEntry::from).collect()
}

/// Requested message count; falls back to the default on bad input.
pub fn parse_history_count(arg: Option<&str>) -> usize {
    arg.and_then(|a| a.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .map(|n| n.min(MAX_HISTORY_COUNT))
        .unwrap_or(DEFAULT_HISTORY_COUNT)
}

/// One `author: content` line per message, oldest first. `entries` is
/// newest first, as Discord returns channel history.
pub fn format_history(entries: &[HistoryEntry], command_prefix: &str) -> String {
    let summary_command = format!("{}sum", command_prefix);

    entries
        .iter()
        .rev()
        .filter(|e| !e.is_bot && !e.content.starts_with(&summary_command))
        .map(|e| {
            let content = if !e.embed_descriptions.is_empty() {
                format!("嵌入內容: {}", e.embed_descriptions.join(", "))
            } else if !e.attachment_urls.is_empty() {
                format!("附件: {}", e.attachment_urls.join(", "))
            } else {
                e.content.clone()
            };
            format!("{}: {}", e.author, content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary_prompt(history_count: usize, chat_history: &str) -> String {
    SUMMARY_PROMPT
        .replace("{history_count}", &history_count.to_string())
        .replace("{chat_history}", chat_history)
}
