//! Sensitive-data masking.
//!
//! Replaces every match of a sensitivity pattern with a fixed token of the
//! same kind (`[IP_REDACTED]`, `[MAC_REDACTED]`, ...). Tokens identify the
//! kind of value that was removed, never the value itself, and repeated
//! occurrences of one value are not correlated.
//!
//! # Ordering
//!
//! Rules run in declared order. Text already replaced by an earlier rule,
//! and redaction tokens already present in the input, are protected: a
//! later match that overlaps one is dropped. Each rule still matches
//! against the whole text, so `^` and `\b` only fire at real boundaries. Passes repeat until one makes no replacement, so
//! the output is a fixed point and masking is idempotent.
//!
//! # Case sensitivity
//!
//! IP and MAC literals are matched case-sensitively (their patterns spell
//! out both hex cases); names, hostnames, products and e-mail addresses are
//! matched case-insensitively.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use crate::error::{MaskingError, RuleError};
use crate::models::Document;

const IPV4_PATTERN: &str =
    r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\b";
const MAC_PATTERN: &str = r"\b(?:[0-9A-Fa-f]{2}[:\-]){5}[0-9A-Fa-f]{2}\b";

/// The kind of sensitive value a rule removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    Ip,
    Mac,
    Customer,
    Hostname,
    Os,
    Product,
    Email,
}

impl TokenKind {
    pub const ALL: [TokenKind; 7] = [
        TokenKind::Ip,
        TokenKind::Mac,
        TokenKind::Customer,
        TokenKind::Hostname,
        TokenKind::Os,
        TokenKind::Product,
        TokenKind::Email,
    ];

    /// The replacement token written into masked text.
    pub fn token(&self) -> &'static str {
        match self {
            TokenKind::Ip => "[IP_REDACTED]",
            TokenKind::Mac => "[MAC_REDACTED]",
            TokenKind::Customer => "[CUSTOMER_REDACTED]",
            TokenKind::Hostname => "[HOST_REDACTED]",
            TokenKind::Os => "[OS_REDACTED]",
            TokenKind::Product => "[PRODUCT_REDACTED]",
            TokenKind::Email => "[EMAIL_REDACTED]",
        }
    }

    /// Literal formats are matched exactly; name-like kinds ignore case.
    pub fn case_sensitive(&self) -> bool {
        matches!(self, TokenKind::Ip | TokenKind::Mac)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Ip => "ip",
            TokenKind::Mac => "mac",
            TokenKind::Customer => "customer",
            TokenKind::Hostname => "hostname",
            TokenKind::Os => "os",
            TokenKind::Product => "product",
            TokenKind::Email => "email",
        };
        f.pad(name)
    }
}

/// One masking rule as written in the rule file.
///
/// ```toml
/// [[rules]]
/// kind = "customer"
/// pattern = "ACME ?Corp"
///
/// [[rules]]
/// kind = "product"
/// pattern = "Widget++"
/// literal = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MaskRuleSpec {
    pub kind: TokenKind,
    pub pattern: String,
    /// Treat `pattern` as plain text rather than a regex.
    #[serde(default)]
    pub literal: bool,
    /// Display name for `txt2kb rules`; defaults to the pattern.
    #[serde(default)]
    pub name: Option<String>,
}

/// A compiled masking rule.
#[derive(Debug, Clone)]
pub struct MaskRule {
    pub name: String,
    pub kind: TokenKind,
    regex: Regex,
}

impl MaskRule {
    pub fn compile(spec: &MaskRuleSpec) -> Result<Self, RuleError> {
        let name = spec.name.clone().unwrap_or_else(|| spec.pattern.clone());
        if spec.pattern.trim().is_empty() {
            return Err(RuleError::Invalid {
                rule: name,
                reason: "pattern is empty".to_string(),
            });
        }
        let pattern = if spec.literal {
            regex::escape(&spec.pattern)
        } else {
            spec.pattern.clone()
        };
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!spec.kind.case_sensitive())
            .build()
            .map_err(|source| RuleError::Pattern {
                rule: name.clone(),
                source,
            })?;
        Ok(Self {
            name,
            kind: spec.kind,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// Ordered, immutable set of masking rules shared across a run.
#[derive(Debug, Clone, Default)]
pub struct MaskingRuleSet {
    rules: Vec<MaskRule>,
}

impl MaskingRuleSet {
    /// The always-on literal rules: IPv4 addresses, then MAC addresses.
    pub fn builtin() -> Self {
        let specs = [
            MaskRuleSpec {
                kind: TokenKind::Ip,
                pattern: IPV4_PATTERN.to_string(),
                literal: false,
                name: Some("builtin:ipv4".to_string()),
            },
            MaskRuleSpec {
                kind: TokenKind::Mac,
                pattern: MAC_PATTERN.to_string(),
                literal: false,
                name: Some("builtin:mac".to_string()),
            },
        ];
        let rules = specs
            .iter()
            .map(|s| MaskRule::compile(s).expect("builtin masking patterns are valid"))
            .collect();
        Self { rules }
    }

    /// Built-in rules followed by user rules in declaration order.
    pub fn with_builtins(specs: &[MaskRuleSpec]) -> Result<Self, RuleError> {
        let mut set = Self::builtin();
        for spec in specs {
            set.rules.push(MaskRule::compile(spec)?);
        }
        Ok(set)
    }

    /// User rules only, without the built-in literals.
    pub fn from_specs(specs: &[MaskRuleSpec]) -> Result<Self, RuleError> {
        let rules = specs
            .iter()
            .map(MaskRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[MaskRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Output of [`mask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Masked {
    pub text: String,
    pub replacements: usize,
}

impl Masked {
    /// Text that went through no masking at all.
    pub fn unchanged(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            replacements: 0,
        }
    }

    pub fn altered(&self) -> bool {
        self.replacements > 0
    }
}

/// Per-document safety limits checked before masking.
#[derive(Debug, Clone, Copy)]
pub struct MaskingLimits {
    pub max_document_bytes: usize,
}

impl Default for MaskingLimits {
    fn default() -> Self {
        Self {
            max_document_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug)]
struct Segment {
    text: String,
    masked: bool,
}

fn existing_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let kinds: Vec<String> = TokenKind::ALL
            .iter()
            .map(|k| regex::escape(k.token()))
            .collect();
        Regex::new(&kinds.join("|")).expect("token pattern is valid")
    })
}

/// Mask `text` with `ruleset`. Never fails; unmatched text passes through.
pub fn mask(text: &str, ruleset: &MaskingRuleSet) -> Masked {
    let mut segments = split_on(text, existing_token());
    let mut replacements = 0;

    loop {
        let mut pass = 0;
        for rule in &ruleset.rules {
            let (next, n) = apply_rule(segments, rule);
            segments = next;
            pass += n;
        }
        replacements += pass;
        if pass == 0 {
            break;
        }
    }

    let text = segments.into_iter().map(|s| s.text).collect::<String>();
    Masked { text, replacements }
}

/// Masking stage for one document: safety checks, then [`mask`].
pub fn mask_document(
    doc: &Document,
    ruleset: &MaskingRuleSet,
    limits: &MaskingLimits,
) -> Result<Masked, MaskingError> {
    let size = doc.body.len();
    if size > limits.max_document_bytes {
        return Err(MaskingError::TooLarge {
            size,
            limit: limits.max_document_bytes,
        });
    }
    if doc.body.contains('\0') {
        return Err(MaskingError::BinaryContent);
    }
    Ok(mask(&doc.body, ruleset))
}

fn apply_rule(segments: Vec<Segment>, rule: &MaskRule) -> (Vec<Segment>, usize) {
    // Match against the whole text so anchors and word boundaries see the
    // real neighbours of earlier tokens, not segment edges.
    let mut text = String::new();
    let mut protected: Vec<Range<usize>> = Vec::new();
    for seg in &segments {
        let start = text.len();
        text.push_str(&seg.text);
        if seg.masked {
            protected.push(start..text.len());
        }
    }

    let hits = unprotected_matches(&text, &rule.regex, &protected);
    if hits.is_empty() {
        return (segments, 0);
    }
    let count = hits.len();

    let token = rule.kind.token();
    let mut cuts: Vec<(Range<usize>, bool)> = protected
        .into_iter()
        .map(|r| (r, false))
        .chain(hits.into_iter().map(|r| (r, true)))
        .collect();
    cuts.sort_by_key(|(r, _)| r.start);

    let mut out = Vec::with_capacity(cuts.len() * 2 + 1);
    let mut last = 0;
    for (range, replace) in cuts {
        if range.start > last {
            out.push(Segment {
                text: text[last..range.start].to_string(),
                masked: false,
            });
        }
        out.push(Segment {
            text: if replace { token.to_string() } else { text[range.clone()].to_string() },
            masked: true,
        });
        last = range.end;
    }
    if last < text.len() {
        out.push(Segment {
            text: text[last..].to_string(),
            masked: false,
        });
    }
    (out, count)
}

/// Non-empty matches of `re` in `text` that overlap no protected range.
/// `protected` is sorted and disjoint.
fn unprotected_matches(text: &str, re: &Regex, protected: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut hits = Vec::new();
    let mut pos = 0;
    while pos <= text.len() {
        let Some(m) = re.find_at(text, pos) else {
            break;
        };
        let next = protected.partition_point(|p| p.end <= m.start());
        let overlaps = protected.get(next).is_some_and(|p| p.start < m.end());
        if m.is_empty() || overlaps {
            // Retry one character later; a shorter match may start there.
            pos = text[m.start()..]
                .chars()
                .next()
                .map_or(text.len() + 1, |c| m.start() + c.len_utf8());
            continue;
        }
        hits.push(m.range());
        pos = m.end();
    }
    hits
}

/// Split `text` at non-empty matches of `re`, keeping each match as a
/// masked segment.
fn split_on(text: &str, re: &Regex) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in re.find_iter(text) {
        if m.is_empty() {
            continue;
        }
        if m.start() > last {
            out.push(Segment {
                text: text[last..m.start()].to_string(),
                masked: false,
            });
        }
        out.push(Segment {
            text: m.as_str().to_string(),
            masked: true,
        });
        last = m.end();
    }
    if last < text.len() {
        out.push(Segment {
            text: text[last..].to_string(),
            masked: false,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: TokenKind, pattern: &str) -> MaskRuleSpec {
        MaskRuleSpec {
            kind,
            pattern: pattern.to_string(),
            literal: false,
            name: None,
        }
    }

    fn customer_rules() -> MaskingRuleSet {
        MaskingRuleSet::with_builtins(&[
            spec(TokenKind::Customer, "acme ?corp"),
            spec(TokenKind::Hostname, r"\bdb-prod-\d+\b"),
            spec(TokenKind::Os, r"\bubuntu(?: \d+\.\d+)?\b"),
        ])
        .unwrap()
    }

    #[test]
    fn test_masks_ip_and_mac_literals() {
        let out = mask(
            "sensor at 192.168.1.5 reported AA:BB:CC:DD:EE:FF twice",
            &MaskingRuleSet::builtin(),
        );
        assert!(!out.text.contains("192.168.1.5"));
        assert!(!out.text.contains("AA:BB:CC:DD:EE:FF"));
        assert!(out.text.contains("[IP_REDACTED]"));
        assert!(out.text.contains("[MAC_REDACTED]"));
        assert_eq!(out.replacements, 2);
    }

    #[test]
    fn test_repeated_values_all_masked() {
        let out = mask("10.0.0.1 -> 10.0.0.1 -> 10.0.0.2", &MaskingRuleSet::builtin());
        assert_eq!(out.text, "[IP_REDACTED] -> [IP_REDACTED] -> [IP_REDACTED]");
        assert_eq!(out.replacements, 3);
    }

    #[test]
    fn test_mac_with_dashes_and_lowercase() {
        let out = mask("nic aa-bb-cc-dd-ee-0f up", &MaskingRuleSet::builtin());
        assert_eq!(out.text, "nic [MAC_REDACTED] up");
    }

    #[test]
    fn test_invalid_octets_pass_through() {
        let out = mask("version 999.1.2.3 released", &MaskingRuleSet::builtin());
        assert_eq!(out.text, "version 999.1.2.3 released");
        assert!(!out.altered());
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let out = mask("Call ACME Corp and acmecorp about Ubuntu 22.04", &customer_rules());
        assert_eq!(
            out.text,
            "Call [CUSTOMER_REDACTED] and [CUSTOMER_REDACTED] about [OS_REDACTED]"
        );
    }

    #[test]
    fn test_idempotent() {
        let rules = customer_rules();
        let inputs = [
            "",
            "nothing sensitive here",
            "db-prod-01 at 10.1.2.3 (MAC 00:11:22:33:44:55) for acme corp",
            "already [IP_REDACTED] and [CUSTOMER_REDACTED] plus 172.16.0.9",
            "ubuntu ubuntu 20.04 UBUNTU",
        ];
        for input in inputs {
            let once = mask(input, &rules);
            let twice = mask(&once.text, &rules);
            assert_eq!(once.text, twice.text, "input: {input}");
            assert_eq!(twice.replacements, 0, "input: {input}");
        }
    }

    #[test]
    fn test_existing_tokens_are_not_rescanned() {
        // A rule that would match inside a token must leave the token alone.
        let rules = MaskingRuleSet::from_specs(&[spec(TokenKind::Product, "redacted|IP")]).unwrap();
        let out = mask("[IP_REDACTED] and IP", &rules);
        assert_eq!(out.text, "[IP_REDACTED] and [PRODUCT_REDACTED]");
        assert_eq!(out.replacements, 1);
    }

    #[test]
    fn test_replaced_spans_are_not_rescanned() {
        // The hostname rule runs first; the customer rule must not touch its token.
        let rules = MaskingRuleSet::from_specs(&[
            spec(TokenKind::Hostname, r"acme-gw\d"),
            spec(TokenKind::Customer, "host|acme"),
        ])
        .unwrap();
        let out = mask("acme-gw1 belongs to acme", &rules);
        assert_eq!(out.text, "[HOST_REDACTED] belongs to [CUSTOMER_REDACTED]");
    }

    #[test]
    fn test_anchors_see_real_text_around_tokens() {
        let rules = MaskingRuleSet::from_specs(&[
            spec(TokenKind::Hostname, r"db\d"),
            spec(TokenKind::Customer, "^acme"),
        ])
        .unwrap();
        let out = mask("x db1acme", &rules);
        assert_eq!(out.text, "x [HOST_REDACTED]acme");
        assert_eq!(out.replacements, 1);

        let out = mask("acme db1", &rules);
        assert_eq!(out.text, "[CUSTOMER_REDACTED] [HOST_REDACTED]");
        assert_eq!(mask(&out.text, &rules).replacements, 0);
    }

    #[test]
    fn test_match_inside_token_does_not_hide_later_text() {
        // `ip\w*` first hits `IP_REDACTED` inside the token, then must still
        // find the plain occurrence that follows it.
        let rules = MaskingRuleSet::from_specs(&[spec(TokenKind::Product, r"ip\w*")]).unwrap();
        let out = mask("[IP_REDACTED]iptables", &rules);
        assert_eq!(out.text, "[IP_REDACTED][PRODUCT_REDACTED]");
    }

    #[test]
    fn test_declared_order_resolves_overlap() {
        let host_first = MaskingRuleSet::from_specs(&[
            spec(TokenKind::Hostname, r"acme-gw\d"),
            spec(TokenKind::Customer, "acme"),
        ])
        .unwrap();
        let customer_first = MaskingRuleSet::from_specs(&[
            spec(TokenKind::Customer, "acme"),
            spec(TokenKind::Hostname, r"acme-gw\d"),
        ])
        .unwrap();
        assert_eq!(mask("acme-gw1", &host_first).text, "[HOST_REDACTED]");
        assert_eq!(mask("acme-gw1", &customer_first).text, "[CUSTOMER_REDACTED]-gw1");
    }

    #[test]
    fn test_literal_rule_escapes_pattern() {
        let rules = MaskingRuleSet::from_specs(&[MaskRuleSpec {
            kind: TokenKind::Product,
            pattern: "Widget++".to_string(),
            literal: true,
            name: None,
        }])
        .unwrap();
        assert_eq!(mask("upgrade widget++ now", &rules).text, "upgrade [PRODUCT_REDACTED] now");
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = MaskingRuleSet::from_specs(&[spec(TokenKind::Customer, "acme(")]).unwrap_err();
        assert!(matches!(err, RuleError::Pattern { .. }));
    }

    #[test]
    fn test_multibyte_text_survives() {
        let rules = MaskingRuleSet::with_builtins(&[spec(TokenKind::Customer, "케피코")]).unwrap();
        let out = mask("케피코 센서 192.168.0.10 점검", &rules);
        assert_eq!(out.text, "[CUSTOMER_REDACTED] 센서 [IP_REDACTED] 점검");
    }

    #[test]
    fn test_mask_document_limits() {
        let rules = MaskingRuleSet::builtin();
        let binary = Document::new("blob.txt", "abc\0def");
        assert!(matches!(
            mask_document(&binary, &rules, &MaskingLimits::default()),
            Err(MaskingError::BinaryContent)
        ));

        let big = Document::new("big.txt", "x".repeat(32));
        let limits = MaskingLimits {
            max_document_bytes: 16,
        };
        assert!(matches!(
            mask_document(&big, &rules, &limits),
            Err(MaskingError::TooLarge { size: 32, limit: 16 })
        ));
    }
}
