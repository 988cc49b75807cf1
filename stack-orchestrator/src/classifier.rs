//! Startup failure classification.
//!
//! Raw compose output is reduced to one [`FailureKind`] by an ordered list
//! of rules; the first rule that matches wins. Progress chatter is filtered
//! out first so a successful start never classifies as a failure.

use std::sync::OnceLock;

use regex::Regex;
use stack_core::FailureKind;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NoError,
    Failure {
        kind: FailureKind,
        remediation: &'static str,
    },
}

impl Classification {
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Classification::NoError => None,
            Classification::Failure { kind, .. } => Some(*kind),
        }
    }
}

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// One `(predicate, kind)` pair.
pub struct Rule {
    kind: FailureKind,
    predicate: Predicate,
}

impl Rule {
    pub fn new<F>(kind: FailureKind, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            kind,
            predicate: Box::new(predicate),
        }
    }

    /// A rule matching any of `patterns` (case-insensitive). Patterns that
    /// fail to compile are dropped with a warning.
    pub fn matching(kind: FailureKind, patterns: &[&str]) -> Self {
        let regexes: Vec<Regex> = patterns
            .iter()
            .filter_map(|p| match Regex::new(&format!("(?i){}", p)) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Ignoring invalid classifier pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();
        Self::new(kind, move |text| regexes.iter().any(|re| re.is_match(text)))
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    fn matches(&self, text: &str) -> bool {
        (self.predicate)(text)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("kind", &self.kind).finish()
    }
}

#[derive(Debug)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// The built-in rule list, most specific first.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Rule::matching(
                    FailureKind::DatabaseAuth,
                    &[
                        r"password authentication failed",
                        r"authentication failed for user",
                        r#"role "?[\w.-]+"? does not exist"#,
                    ],
                ),
                Rule::matching(
                    FailureKind::ImageNotFound,
                    &[
                        r"manifest (for \S+ )?(unknown|not found)",
                        r"manifest unknown",
                        r"pull access denied",
                        r"repository does not exist",
                        r"no matching manifest",
                    ],
                ),
                Rule::matching(
                    FailureKind::RegistryAuth,
                    &[
                        r"unauthorized",
                        r"authentication required",
                        r"no basic auth credentials",
                        r"denied: (requested access|permission)",
                    ],
                ),
                Rule::matching(
                    FailureKind::Network,
                    &[
                        r"connection (refused|reset|timed out)",
                        r"i/o timeout",
                        r"tls handshake timeout",
                        r"no such host",
                        r"temporary failure in name resolution",
                        r"network is unreachable",
                        r"context deadline exceeded",
                        r"dial tcp",
                    ],
                ),
                Rule::matching(
                    FailureKind::PortConflict,
                    &[
                        r"port is already allocated",
                        r"address already in use",
                        r"ports are not available",
                        r"bind: .*(in use|permission denied)",
                    ],
                ),
                Rule::matching(
                    FailureKind::NetworkConflict,
                    &[
                        r"pool overlaps with other one",
                        r"overlaps with (other|existing)",
                        r"non-overlapping ipv4 address pool",
                        r"invalid pool request",
                    ],
                ),
                Rule::matching(
                    FailureKind::DiskSpace,
                    &[
                        r"no space left on device",
                        r"disk quota exceeded",
                        r"not enough (free )?space",
                    ],
                ),
            ],
        }
    }

    /// Append a rule. It is consulted after every existing rule and before
    /// the generic fallback.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn classify(&self, raw_output: &str) -> Classification {
        let relevant = significant_lines(raw_output);
        if relevant.is_empty() {
            return Classification::NoError;
        }

        let kind = self
            .rules
            .iter()
            .find(|rule| rule.matches(&relevant))
            .map(Rule::kind)
            .unwrap_or(FailureKind::GenericStartup);
        debug!("Classified runtime output as {}", kind);
        Classification::Failure {
            kind,
            remediation: kind.remediation(),
        }
    }
}

fn benign_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^\[\+\]",
            r"^(Creating|Created|Starting|Started|Stopping|Stopped|Removing|Removed|Recreating|Recreated|Pulling|Pulled|Waiting|Running|Healthy|Building|Built)\b",
            r"^(Network|Container|Volume|Image)\s+\S+\s+(Creating|Created|Starting|Started|Stopping|Stopped|Removing|Removed|Recreate|Recreated|Running|Healthy|Waiting|Pulling|Pulled)\b",
            r"^\S+\s+(Pulling|Pulled|Waiting|Downloading|Extracting|Verifying Checksum|Download complete|Pull complete|Already exists)\b",
            r"^(Digest|Status): ",
            r"^[0-9a-f]{12}:? (Pull complete|Download complete|Already exists|Waiting|Downloading|Extracting)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn error_keyword() -> Option<&'static Regex> {
    static KEYWORD: OnceLock<Option<Regex>> = OnceLock::new();
    KEYWORD
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(error|failed|failure|fatal|denied|unauthorized|cannot|unable|refused|timeout|timed out|no such|not found|in use|overlaps)\b",
            )
            .ok()
        })
        .as_ref()
}

/// A line is benign when it is progress chatter and mentions no error.
pub fn is_benign_line(line: &str) -> bool {
    // Compose prefixes progress lines with status glyphs (✔, ⠿, ...).
    let trimmed = line
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric() && c != '[')
        .trim();
    if trimmed.is_empty() {
        return true;
    }
    if error_keyword().is_some_and(|re| re.is_match(trimmed)) {
        return false;
    }
    benign_patterns().iter().any(|re| re.is_match(trimmed))
}

/// The lines of `raw` that survive benign filtering, rejoined.
fn significant_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| !is_benign_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}
