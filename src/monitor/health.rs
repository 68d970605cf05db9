// Health classification from lifecycle state and journal evidence

use crate::systemd::LifecycleState;

/// Health verdict for one tunnel in one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy { reason: String },
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }
}

/// A set of case-folded substrings.
///
/// Substring containment is the only matching primitive: tunnel log formats
/// are not standardized, so the evaluator does no semantic parsing. Patterns
/// are stored lowercased; inputs are folded before matching, so all matching
/// is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<String>,
}

impl PatternSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Remove every occurrence of every pattern from `text`.
    /// Returns the case-folded remainder.
    pub fn strip(&self, text: &str) -> String {
        let mut out = text.to_lowercase();
        for pattern in &self.patterns {
            while let Some(idx) = out.find(pattern.as_str()) {
                out.replace_range(idx..idx + pattern.len(), "");
            }
        }
        out
    }

    /// First pattern contained in `text`, if any
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let folded = text.to_lowercase();
        self.patterns
            .iter()
            .find(|pattern| folded.contains(pattern.as_str()))
            .map(|pattern| pattern.as_str())
    }
}

/// Classify a tunnel from current evidence. Pure function of its inputs;
/// repeated calls with the same state and evidence return the same verdict.
///
/// Ignore patterns model known benign noise and are removed from the evidence
/// before the critical scan, so noise can never trigger a false positive. An
/// empty critical set means log evidence can never downgrade an active unit;
/// that conservative default is intentional.
pub fn classify(
    state: LifecycleState,
    evidence: &str,
    ignore: &PatternSet,
    critical: &PatternSet,
) -> Health {
    if !state.is_active() {
        return Health::Unhealthy {
            reason: format!("not active ({})", state),
        };
    }

    let remainder = ignore.strip(evidence);

    if let Some(pattern) = critical.first_match(&remainder) {
        return Health::Unhealthy {
            reason: format!("critical pattern matched: {}", pattern),
        };
    }

    Health::Healthy
}
