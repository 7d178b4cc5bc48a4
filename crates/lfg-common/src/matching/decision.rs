use serde::Serialize;

/// Outcome of a single predicate for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FilterDecision {
    /// The candidate satisfies the predicate.
    Pass,
    /// The candidate fails the predicate and is excluded.
    Reject { reason: String },
    /// The criterion was not supplied, so the predicate imposes nothing.
    Skipped,
}

impl FilterDecision {
    pub fn reject(reason: impl Into<String>) -> Self {
        FilterDecision::Reject {
            reason: reason.into(),
        }
    }

    /// Turn a boolean check into a decision, building the reason lazily.
    pub fn check(passed: bool, reason: impl FnOnce() -> String) -> Self {
        if passed {
            FilterDecision::Pass
        } else {
            FilterDecision::Reject { reason: reason() }
        }
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, FilterDecision::Reject { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            FilterDecision::Reject { reason } => Some(reason),
            FilterDecision::Pass | FilterDecision::Skipped => None,
        }
    }
}

/// Every decision taken for one candidate, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    /// True when no predicate rejected the candidate.
    pub is_match: bool,
    pub decisions: Vec<(&'static str, FilterDecision)>,
}

impl FilterOutcome {
    pub fn new(decisions: Vec<(&'static str, FilterDecision)>) -> Self {
        let is_match = !decisions.iter().any(|(_, d)| d.is_reject());
        Self { is_match, decisions }
    }

    /// AND two outcomes together, keeping both decision lists.
    pub fn and(mut self, other: FilterOutcome) -> Self {
        self.is_match &= other.is_match;
        self.decisions.extend(other.decisions);
        self
    }

    /// `check: reason` for each rejection, joined with `; `.
    pub fn rejection_summary(&self) -> Option<String> {
        let reasons: Vec<_> = self
            .decisions
            .iter()
            .filter_map(|(name, d)| d.reason().map(|r| format!("{name}: {r}")))
            .collect();

        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("; "))
        }
    }
}
