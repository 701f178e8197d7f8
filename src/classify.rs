//! Rule-driven tag and category classification.
//!
//! Each rule pairs one matcher (keywords, a regex, or a named heuristic)
//! with the tag and/or category it contributes. Classification is a pure
//! function of the masked text (preceded by the file name, see
//! [`classify_document`]) and the rule set: no network, no
//! randomness, identical input gives identical output.
//!
//! # Ranking
//!
//! Labels are ranked by the highest priority of any rule that contributed
//! them (higher first), then by the declaration order of the first such
//! rule. When more labels match than the configured maximum, the top-N by
//! rank are kept. Match counts play no part.
//!
//! ```toml
//! [[rules]]
//! id = "nac"
//! keywords = ["NAC", "802.1x", "captive portal"]
//! tag = "NAC"
//! category = "Network Access Control"
//! priority = 10
//!
//! [[rules]]
//! id = "errors"
//! heuristic = "error-signature"
//! tag = "troubleshooting"
//! ```

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::cmp::Ordering;

use crate::error::RuleError;
use crate::markers;

/// Default cap on tags and categories per record.
pub const DEFAULT_MAX_LABELS: usize = 5;

/// Built-in structural matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Heuristic {
    /// Shell commands or fenced code blocks.
    ShellCommand,
    /// Error vocabulary: `error`, `failed`, `exception`, `timeout`, ...
    ErrorSignature,
    /// At least two chat-message lines.
    ChatTranscript,
    /// At least two timestamp-prefixed lines.
    TimestampedLog,
}

impl Heuristic {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Heuristic::ShellCommand => markers::shell_command().is_match(text),
            Heuristic::ErrorSignature => markers::error_signature().is_match(text),
            Heuristic::ChatTranscript => markers::has_lines(markers::chat_line(), text, 2),
            Heuristic::TimestampedLog => markers::has_lines(markers::timestamp_line(), text, 2),
        }
    }
}

/// One tagging rule as written in the rule file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagRuleSpec {
    pub id: String,
    /// Case-insensitive substrings; any one matching is enough.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Case-insensitive regex.
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub heuristic: Option<Heuristic>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone)]
enum Matcher {
    Pattern(Regex),
    Heuristic(Heuristic),
}

impl Matcher {
    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::Heuristic(h) => h.matches(text),
        }
    }
}

/// A compiled tagging rule.
#[derive(Debug, Clone)]
pub struct TagRule {
    pub id: String,
    pub tag: Option<String>,
    pub category: Option<String>,
    pub priority: i32,
    matcher: Matcher,
}

impl TagRule {
    pub fn compile(spec: &TagRuleSpec) -> Result<Self, RuleError> {
        let invalid = |reason: &str| RuleError::Invalid {
            rule: spec.id.clone(),
            reason: reason.to_string(),
        };

        if spec.id.trim().is_empty() {
            return Err(invalid("id is empty"));
        }
        let tag = non_empty(spec.tag.as_deref());
        let category = non_empty(spec.category.as_deref());
        if tag.is_none() && category.is_none() {
            return Err(invalid("rule must set a tag or a category"));
        }

        let keywords: Vec<&str> = spec
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        let matchers = [
            !keywords.is_empty(),
            spec.regex.is_some(),
            spec.heuristic.is_some(),
        ];
        if matchers.iter().filter(|m| **m).count() != 1 {
            return Err(invalid(
                "exactly one of `keywords`, `regex` or `heuristic` must be set",
            ));
        }

        let matcher = if let Some(h) = spec.heuristic {
            Matcher::Heuristic(h)
        } else {
            let pattern = match &spec.regex {
                Some(re) => re.clone(),
                None => keywords
                    .iter()
                    .map(|k| regex::escape(k))
                    .collect::<Vec<_>>()
                    .join("|"),
            };
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| RuleError::Pattern {
                    rule: spec.id.clone(),
                    source,
                })?;
            Matcher::Pattern(re)
        };

        Ok(Self {
            id: spec.id.clone(),
            tag,
            category,
            priority: spec.priority,
            matcher,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    /// Short description of the matcher for listings.
    pub fn matcher_summary(&self) -> String {
        match &self.matcher {
            Matcher::Pattern(re) => format!("/{}/i", re.as_str()),
            Matcher::Heuristic(h) => format!("heuristic:{:?}", h),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Which output list a label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Tag,
    Category,
}

/// Ordered, immutable tagging rules plus output caps, shared across a run.
#[derive(Debug, Clone)]
pub struct TaggingRuleSet {
    rules: Vec<TagRule>,
    max_tags: usize,
    max_categories: usize,
}

impl Default for TaggingRuleSet {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            max_tags: DEFAULT_MAX_LABELS,
            max_categories: DEFAULT_MAX_LABELS,
        }
    }
}

impl TaggingRuleSet {
    pub fn compile(
        specs: &[TagRuleSpec],
        max_tags: usize,
        max_categories: usize,
    ) -> Result<Self, RuleError> {
        let mut rules: Vec<TagRule> = Vec::with_capacity(specs.len());
        for spec in specs {
            if rules.iter().any(|r| r.id == spec.id) {
                return Err(RuleError::Invalid {
                    rule: spec.id.clone(),
                    reason: "duplicate rule id".to_string(),
                });
            }
            rules.push(TagRule::compile(spec)?);
        }
        Ok(Self {
            rules,
            max_tags,
            max_categories,
        })
    }

    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }

    pub fn max_for(&self, kind: LabelKind) -> usize {
        match kind {
            LabelKind::Tag => self.max_tags,
            LabelKind::Category => self.max_categories,
        }
    }

    /// Rank of a label declared by some rule: (best priority, first declaring index).
    fn declared_rank(&self, label: &str, kind: LabelKind) -> Option<(i32, usize)> {
        let mut rank: Option<(i32, usize)> = None;
        for (idx, rule) in self.rules.iter().enumerate() {
            let declared = match kind {
                LabelKind::Tag => rule.tag.as_deref(),
                LabelKind::Category => rule.category.as_deref(),
            };
            if declared.is_some_and(|d| d.eq_ignore_ascii_case(label)) {
                rank = Some(match rank {
                    Some((p, first)) => (p.max(rule.priority), first),
                    None => (rule.priority, idx),
                });
            }
        }
        rank
    }
}

/// Result of [`classify`]. Both lists may be empty; that is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub tags: Vec<String>,
    pub category: Vec<String>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.category.is_empty()
    }
}

#[derive(Debug)]
struct Ranked {
    label: String,
    declared: bool,
    priority: i32,
    order: usize,
}

impl Ranked {
    fn cmp_rank(&self, other: &Self) -> Ordering {
        other
            .declared
            .cmp(&self.declared)
            .then(other.priority.cmp(&self.priority))
            .then(self.order.cmp(&other.order))
    }
}

/// Insert with set semantics; a duplicate keeps the best priority and the
/// earliest order seen for that label.
fn push_ranked(list: &mut Vec<Ranked>, label: &str, declared: bool, priority: i32, order: usize) {
    if let Some(existing) = list.iter_mut().find(|r| r.label.eq_ignore_ascii_case(label)) {
        if declared && !existing.declared {
            existing.declared = true;
            existing.priority = priority;
            existing.order = order;
        } else if declared == existing.declared {
            existing.priority = existing.priority.max(priority);
            existing.order = existing.order.min(order);
        }
        return;
    }
    list.push(Ranked {
        label: label.to_string(),
        declared,
        priority,
        order,
    });
}

fn select_top(mut list: Vec<Ranked>, max: usize) -> Vec<String> {
    list.sort_by(Ranked::cmp_rank);
    list.truncate(max);
    list.into_iter().map(|r| r.label).collect()
}

/// Classify a document by its file name and masked body.
///
/// The name goes on its own line ahead of the body, so a file called
/// `nac-sensor-down.txt` matches a `NAC` keyword rule even when the body
/// never says it.
pub fn classify_document(file_name: &str, text: &str, ruleset: &TaggingRuleSet) -> Classification {
    classify(&format!("{file_name}\n{text}"), ruleset)
}

/// Evaluate every rule against `text` and return the capped, ranked labels.
pub fn classify(text: &str, ruleset: &TaggingRuleSet) -> Classification {
    let mut tags = Vec::new();
    let mut category = Vec::new();

    for (idx, rule) in ruleset.rules.iter().enumerate() {
        if !rule.is_match(text) {
            continue;
        }
        if let Some(tag) = &rule.tag {
            push_ranked(&mut tags, tag, true, rule.priority, idx);
        }
        if let Some(cat) = &rule.category {
            push_ranked(&mut category, cat, true, rule.priority, idx);
        }
    }

    Classification {
        tags: select_top(tags, ruleset.max_tags),
        category: select_top(category, ruleset.max_categories),
    }
}

/// Merge rule labels with labels proposed by another source (the LLM).
///
/// Proposed labels that some rule declares take that rule's rank; the rest
/// rank after every declared label, in their proposed order. The result is
/// de-duplicated case-insensitively and capped at the configured maximum.
pub fn merge_labels(
    rule_labels: &[String],
    proposed: &[String],
    ruleset: &TaggingRuleSet,
    kind: LabelKind,
) -> Vec<String> {
    let undeclared_base = ruleset.rules.len();
    let mut list = Vec::new();

    for (pos, label) in rule_labels.iter().chain(proposed.iter()).enumerate() {
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        match ruleset.declared_rank(label, kind) {
            Some((priority, order)) => push_ranked(&mut list, label, true, priority, order),
            None => push_ranked(&mut list, label, false, 0, undeclared_base + pos),
        }
    }

    select_top(list, ruleset.max_for(kind))
}
