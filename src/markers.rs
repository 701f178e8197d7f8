//! Recognizers for conversational and log structure.
//!
//! Shared by the classification heuristics and the rule-based section
//! extractor. All patterns are compiled once per process.

use regex::Regex;
use std::sync::OnceLock;

/// A blank line between paragraphs. Tolerates CRLF line endings and
/// separator lines holding only spaces or tabs.
pub fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("paragraph break pattern is valid"))
}

/// A line that starts a chat message, e.g. `[alice] [10:42] restarted it`
/// or `2024-03-01 10:42, bob : done`.
pub fn chat_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*(?:\[[^\]\n]{1,40}\]\s*\[[^\]\n]{1,20}\]\s|\d{4}[-./]\s?\d{1,2}[-./]\s?\d{1,2}\.?\s+\d{1,2}:\d{2}(?::\d{2})?\s*,\s*[^:\n]{1,40}\s:\s)",
        )
        .expect("chat line pattern is valid")
    })
}

/// Export headers and day separators that carry no content,
/// e.g. `--------------- Monday, March 4, 2024 ---------------`.
pub fn chat_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*(?:-{3,}[^\n]*\d{4}[^\n]*-{3,}|(?:talk with|chat with|saved on|conversation with|exported on)\b[^\n]*)\s*$",
        )
        .expect("chat header pattern is valid")
    })
}

/// A line that begins with a timestamp (ISO-8601 or syslog style).
pub fn timestamp_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*\[?(?:\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2})?|[A-Z][a-z]{2}\s+\d{1,2}\s\d{2}:\d{2}:\d{2})",
        )
        .expect("timestamp pattern is valid")
    })
}

/// A shell command or fenced code block.
pub fn shell_command() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)```|^\s{0,4}(?:\$\s|(?:sudo|systemctl|service|msiexec|mysql|psql|curl|kubectl|helm|terraform|docker|journalctl)\b)",
        )
        .expect("shell command pattern is valid")
    })
}

/// Error vocabulary common to logs and incident notes.
pub fn error_signature() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:err(?:or)?|fail(?:ed|ure)?|exception|traceback|timeout|timed out|denied|panic(?:ked)?|refused)\b",
        )
        .expect("error signature pattern is valid")
    })
}

/// Operational guidance vocabulary: thresholds, alerting, monitoring.
pub fn guidance() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:recommend|caution|monitor|periodic|threshold|alert|권장|주의|모니터링|주기|임계치)")
            .expect("guidance pattern is valid")
    })
}

/// True when the text contains at least `min` lines matching `re`.
pub fn has_lines(re: &Regex, text: &str, min: usize) -> bool {
    re.find_iter(text).take(min).count() >= min
}
