/// Telegram MarkdownV2 escaping.
use once_cell::sync::Lazy;
use regex::Regex;

/// Every character MarkdownV2 treats as markup outside of code entities.
static SPECIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([_*\[\]()~`>#+\-=|{}.!\\])").unwrap()
});

/// Characters that must be escaped inside `pre` and `code` entities.
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([`\\])").unwrap());

/// Characters that must be escaped inside the `(...)` part of an inline link.
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([)\\])").unwrap());

/// Escape plain text for MarkdownV2.
pub fn escape(text: &str) -> String {
    SPECIAL_RE.replace_all(text, r"\$1").into_owned()
}

/// Escape text placed inside a ``` block.
pub fn escape_code(text: &str) -> String {
    CODE_RE.replace_all(text, r"\$1").into_owned()
}

/// Escape a URL used as an inline link target.
pub fn escape_link_url(url: &str) -> String {
    LINK_RE.replace_all(url, r"\$1").into_owned()
}

/// Wrap text in a pre-formatted block.
pub fn code_block(text: &str) -> String {
    format!("```\n{}\n```", escape_code(text))
}

/// Inline link with escaped label and target.
pub fn link(label: &str, url: &str) -> String {
    format!("[{}]({})", escape(label), escape_link_url(url))
}
