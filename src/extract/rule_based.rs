//! Heuristic section extraction with no external dependency.
//!
//! The text is cut into segments (blank-line paragraphs, or message/log
//! turns for chat exports and timestamped logs). The first two segments
//! seed the summary; every other segment is scored against per-section
//! signal words plus a few structural heuristics and appended to the best
//! scoring section. Sections that end up shorter than
//! [`MIN_SECTION_CHARS`] are emptied.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{ExtractionInput, SectionExtractor};

use crate::error::{ExtractionError, RuleError};
use crate::markers;
use crate::models::ExtractedRecord;

/// Sections shorter than this are treated as "no evidence found".
pub const MIN_SECTION_CHARS: usize = 20;
const SUMMARY_SEED_SEGMENTS: usize = 2;
const MAX_TITLE_CHARS: usize = 120;
const MIN_TITLE_CHARS: usize = 3;
const MAX_TLDR_CHARS: usize = 200;

/// Signal words per section. Each entry is a case-insensitive regex.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SectionSignalSpec {
    pub summary: Vec<String>,
    pub root_cause: Vec<String>,
    pub actions: Vec<String>,
    pub prevention: Vec<String>,
}

impl Default for SectionSignalSpec {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            summary: words(&[
                "symptom", "issue", "problem", "error", "outage", "incident", "occurred",
                "environment", "version", "증상", "현상", "문제", "오류", "에러", "장애", "발생",
                "환경", "버전",
            ]),
            root_cause: words(&[
                "cause", "root cause", "analysis", "reproduc", "because", "due to",
                "policy conflict", "session", "timeout", "DHCP", "DNS", "ARP", "TTL",
                "false positive", "원인", "근본 원인", "분석", "재현", "정책 충돌", "세션",
                "타임아웃", "오탐",
            ]),
            actions: words(&[
                "fix", "resolv", "workaround", "changed", "applied", "restart", "reboot",
                "command", "query", "script", "setting", "patch", "조치", "해결", "수정", "변경",
                "적용", "재기동", "재시작", "명령어", "쿼리", "스크립트", "설정값", "패치",
            ]),
            prevention: words(&[
                "prevent", "recurrence", "SOP", "monitoring", "alarm", "checklist", "automat",
                "recommended value", "tuning", "limitation", "재발 방지", "모니터링", "알람",
                "운영 기준", "체크리스트", "자동화", "권장값", "튜닝", "한계", "주의",
            ]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    RootCause,
    Actions,
    Prevention,
}

const SECTIONS: [Section; 4] = [
    Section::Summary,
    Section::RootCause,
    Section::Actions,
    Section::Prevention,
];

impl Section {
    fn index(self) -> usize {
        match self {
            Section::Summary => 0,
            Section::RootCause => 1,
            Section::Actions => 2,
            Section::Prevention => 3,
        }
    }
}

/// Always-available extraction strategy.
#[derive(Debug, Clone)]
pub struct RuleBasedExtractor {
    signals: [Vec<Regex>; 4],
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::new(&SectionSignalSpec::default()).expect("default section signals are valid")
    }
}

impl RuleBasedExtractor {
    pub fn new(spec: &SectionSignalSpec) -> Result<Self, RuleError> {
        Ok(Self {
            signals: [
                compile_signals("summary", &spec.summary)?,
                compile_signals("root_cause", &spec.root_cause)?,
                compile_signals("actions", &spec.actions)?,
                compile_signals("prevention", &spec.prevention)?,
            ],
        })
    }

    /// Synchronous core of the strategy.
    pub fn extract_sync(&self, input: &ExtractionInput<'_>) -> Result<ExtractedRecord, ExtractionError> {
        let text = input.text.trim();
        if text.is_empty() {
            return Err(ExtractionError::EmptyInput);
        }

        let segments = segment(text);
        let mut buckets: [Vec<&str>; 4] = Default::default();
        for (i, seg) in segments.iter().enumerate() {
            let section = if i < SUMMARY_SEED_SEGMENTS {
                Section::Summary
            } else {
                self.score(seg)
            };
            buckets[section.index()].push(seg.as_str());
        }

        let [summary, root_cause, actions, prevention] = buckets.map(|parts| {
            let joined = parts.join("\n\n");
            if joined.chars().count() < MIN_SECTION_CHARS {
                String::new()
            } else {
                joined
            }
        });

        Ok(ExtractedRecord {
            title: infer_title(text, input.fallback_title),
            summary_tldr: first_sentence(&summary),
            summary,
            root_cause,
            actions,
            prevention,
            tags: Vec::new(),
            category: Vec::new(),
        })
    }

    fn score(&self, segment: &str) -> Section {
        let mut scores = [0usize; 4];
        for section in SECTIONS {
            scores[section.index()] = self.signals[section.index()]
                .iter()
                .filter(|re| re.is_match(segment))
                .count();
        }
        if markers::shell_command().is_match(segment) {
            scores[Section::Actions.index()] += 2;
        }
        if markers::error_signature().is_match(segment) {
            scores[Section::RootCause.index()] += 1;
        }
        if markers::guidance().is_match(segment) {
            scores[Section::Prevention.index()] += 1;
        }

        // First maximum wins, so ties favour the summary.
        let mut best = Section::Summary;
        for section in SECTIONS {
            if scores[section.index()] > scores[best.index()] {
                best = section;
            }
        }
        best
    }
}

#[async_trait]
impl SectionExtractor for RuleBasedExtractor {
    fn name(&self) -> &str {
        "rule-based"
    }

    async fn extract(
        &self,
        input: &ExtractionInput<'_>,
        _cancel: &CancellationToken,
    ) -> Result<ExtractedRecord, ExtractionError> {
        self.extract_sync(input)
    }
}

fn compile_signals(section: &str, words: &[String]) -> Result<Vec<Regex>, RuleError> {
    words
        .iter()
        .filter(|w| !w.trim().is_empty())
        .map(|w| {
            RegexBuilder::new(w)
                .case_insensitive(true)
                .build()
                .map_err(|source| RuleError::Pattern {
                    rule: format!("section_signals.{section}"),
                    source,
                })
        })
        .collect()
}

/// Split text into content segments.
///
/// Chat exports and timestamped logs rarely use blank lines, so when the
/// paragraph split yields a single block that contains several message or
/// log lines, each such line starts a new segment. Export headers and day
/// separators are dropped.
fn segment(text: &str) -> Vec<String> {
    let paragraphs: Vec<String> = markers::paragraph_break()
        .split(text)
        .map(strip_headers)
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.len() > 1 {
        return paragraphs;
    }
    let Some(block) = paragraphs.into_iter().next() else {
        return Vec::new();
    };

    let is_turn = |line: &str| {
        markers::chat_line().is_match(line) || markers::timestamp_line().is_match(line)
    };
    if block.lines().filter(|l| is_turn(l)).count() < 2 {
        return vec![block];
    }

    let mut turns: Vec<String> = Vec::new();
    for line in block.lines() {
        match turns.last_mut() {
            Some(current) if !is_turn(line) => {
                current.push('\n');
                current.push_str(line);
            }
            _ => turns.push(line.to_string()),
        }
    }
    turns
}

fn strip_headers(paragraph: &str) -> String {
    paragraph
        .lines()
        .filter(|l| !markers::chat_header().is_match(l))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// First content line if it looks like a title, else the fallback.
pub fn infer_title(text: &str, fallback: &str) -> String {
    let first = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !markers::chat_header().is_match(l))
        .unwrap_or("");
    let candidate = first.trim_start_matches('#').trim();
    let len = candidate.chars().count();
    if (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) {
        return candidate.to_string();
    }
    fallback.chars().take(MAX_TITLE_CHARS).collect()
}

/// First sentence of `text`, capped at [`MAX_TLDR_CHARS`] characters.
fn first_sentence(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.trim().chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            break;
        }
        out.push(c);
        let at_boundary = chars.peek().map_or(true, |n| n.is_whitespace());
        if matches!(c, '.' | '!' | '?' | '。') && at_boundary {
            break;
        }
        if out.chars().count() >= MAX_TLDR_CHARS {
            break;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(text: &'a str) -> ExtractionInput<'a> {
        ExtractionInput {
            source_id: "ops/db-failover.txt",
            text,
            fallback_title: "db-failover",
        }
    }

    const INCIDENT: &str = "# Primary database failover\n\n\
The orders service returned HTTP 500 for twelve minutes after the nightly backup.\n\n\
Root cause analysis: the backup job held a table lock, because the timeout was raised to 30 minutes.\n\n\
$ sudo systemctl restart orders-db\nRestarted the primary and applied the lock timeout patch.\n\n\
To prevent recurrence add monitoring on lock wait time with an alert threshold of 60 seconds.";

    #[test]
    fn test_sections_are_assigned() {
        let ex = RuleBasedExtractor::default();
        let rec = ex.extract_sync(&input(INCIDENT)).unwrap();

        assert_eq!(rec.title, "Primary database failover");
        assert!(rec.summary.contains("HTTP 500"));
        assert!(rec.root_cause.contains("table lock"));
        assert!(rec.actions.contains("systemctl restart"));
        assert!(rec.prevention.contains("lock wait time"));
        assert!(rec.tags.is_empty());
        assert!(rec.category.is_empty());
    }

    #[test]
    fn test_crlf_and_padded_blank_lines_split_paragraphs() {
        let crlf = INCIDENT.replace('\n', "\r\n");
        let padded = INCIDENT.replace("\n\n", "\n  \t\n");
        assert_eq!(segment(INCIDENT).len(), 5);
        assert_eq!(segment(&crlf).len(), 5);
        assert_eq!(segment(&padded).len(), 5);
        assert!(segment(&crlf).iter().all(|s| !s.contains('\r')));

        let ex = RuleBasedExtractor::default();
        for text in [crlf.as_str(), padded.as_str()] {
            let rec = ex.extract_sync(&input(text)).unwrap();
            assert_eq!(rec.title, "Primary database failover");
            assert!(rec.root_cause.contains("table lock"));
            assert!(rec.actions.contains("systemctl restart"));
            assert!(rec.prevention.contains("lock wait time"));
        }
    }

    #[test]
    fn test_tldr_is_first_sentence() {
        let ex = RuleBasedExtractor::default();
        let rec = ex
            .extract_sync(&input(
                "Disk full on the log volume. Rotation had stopped.\n\nsecond paragraph here with text",
            ))
            .unwrap();
        assert_eq!(rec.summary_tldr, "Disk full on the log volume.");
    }

    #[test]
    fn test_short_sections_are_emptied() {
        let ex = RuleBasedExtractor::default();
        let rec = ex.extract_sync(&input("tiny")).unwrap();
        assert_eq!(rec.summary, "");
        assert_eq!(rec.root_cause, "");
        assert_eq!(rec.summary_tldr, "");
        assert_eq!(rec.title, "tiny");
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        let long_line = "x".repeat(300);
        assert_eq!(infer_title(&long_line, "db-failover"), "db-failover");
        assert_eq!(infer_title("ab\nrest", "stem"), "stem");
        assert_eq!(infer_title("## Lease storm  \nbody", "stem"), "Lease storm");
    }

    #[test]
    fn test_blank_input_fails() {
        let ex = RuleBasedExtractor::default();
        assert!(matches!(
            ex.extract_sync(&input("  \n\n  ")),
            Err(ExtractionError::EmptyInput)
        ));
    }

    #[test]
    fn test_chat_export_is_split_into_turns() {
        let chat = "Talk with infra-team\n\
--------------- Monday, March 4, 2024 ---------------\n\
[kim] [10:01] sensor keeps dropping clients since this morning\n\
[lee] [10:03] which site?\n\
[kim] [10:04] HQ, the DHCP lease table looks wrong\n\
[lee] [10:20] $ sudo systemctl restart dhcpd fixed it, applied the patch too";
        let segs = segment(chat);
        assert_eq!(segs.len(), 4);
        assert!(segs.iter().all(|s| !s.contains("Talk with")));

        let ex = RuleBasedExtractor::default();
        let rec = ex.extract_sync(&input(chat)).unwrap();
        assert!(rec.summary.contains("sensor keeps dropping"));
        assert!(rec.actions.contains("restart dhcpd"));
        assert!(rec.title.starts_with("[kim]"));
    }

    #[test]
    fn test_custom_signals() {
        let spec = SectionSignalSpec {
            summary: vec![],
            root_cause: vec![],
            actions: vec![],
            prevention: vec!["widget".into()],
        };
        let ex = RuleBasedExtractor::new(&spec).unwrap();
        let text = "head one paragraph\n\nhead two paragraph\n\nthe widget must be checked weekly by ops";
        let rec = ex.extract_sync(&input(text)).unwrap();
        assert!(rec.prevention.contains("widget"));
    }

    #[test]
    fn test_invalid_signal_is_rejected() {
        let spec = SectionSignalSpec {
            actions: vec!["(".into()],
            ..Default::default()
        };
        assert!(RuleBasedExtractor::new(&spec).is_err());
    }
}
