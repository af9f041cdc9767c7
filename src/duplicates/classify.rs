//! Mapping similarity scores onto severity tiers.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Four ascending cut points, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    exact: f32,
    high: f32,
    medium: f32,
    low: f32,
}

impl Thresholds {
    /// Requires every value in [0, 1] and `low < medium < high < exact`.
    pub fn new(exact: f32, high: f32, medium: f32, low: f32) -> Result<Self, ConfigError> {
        for (name, value) in [("exact", exact), ("high", high), ("medium", medium), ("low", low)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThresholds {
                    reason: format!("{name} = {value} is outside [0, 1]"),
                });
            }
        }
        if !(low < medium && medium < high && high < exact) {
            return Err(ConfigError::InvalidThresholds {
                reason: format!(
                    "expected low < medium < high < exact, got {low} / {medium} / {high} / {exact}"
                ),
            });
        }
        Ok(Self {
            exact,
            high,
            medium,
            low,
        })
    }

    pub fn exact(&self) -> f32 {
        self.exact
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn medium(&self) -> f32 {
        self.medium
    }

    pub fn low(&self) -> f32 {
        self.low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    IdenticalImplementation,
    CopyPaste,
    SimilarFunctionality,
    RefactorCandidate,
}

impl DuplicateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateReason::IdenticalImplementation => "identical_implementation",
            DuplicateReason::CopyPaste => "copy_paste",
            DuplicateReason::SimilarFunctionality => "similar_functionality",
            DuplicateReason::RefactorCandidate => "refactor_candidate",
        }
    }
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    Exact,
    Semantic,
    Structural,
}

impl ComparisonType {
    /// Phrase used in report descriptions.
    pub fn describe(&self) -> &'static str {
        match self {
            ComparisonType::Exact => "exact match",
            ComparisonType::Semantic => "semantic similarity",
            ComparisonType::Structural => "structural similarity",
        }
    }
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComparisonType::Exact => "exact",
            ComparisonType::Semantic => "semantic",
            ComparisonType::Structural => "structural",
        };
        f.write_str(name)
    }
}

/// Outcome of classifying one scored pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    pub reason: Option<DuplicateReason>,
    pub comparison_type: ComparisonType,
}

/// Classify a pair by score; `None` below the low threshold.
///
/// `same_file` separates copy-paste (different files) from similar
/// functionality inside one file at the high tier.
pub fn classify(score: f32, same_file: bool, thresholds: &Thresholds) -> Option<Classification> {
    let classification = if score >= thresholds.exact {
        Classification {
            severity: Severity::Critical,
            reason: Some(DuplicateReason::IdenticalImplementation),
            comparison_type: ComparisonType::Exact,
        }
    } else if score >= thresholds.high {
        Classification {
            severity: Severity::High,
            reason: Some(if same_file {
                DuplicateReason::SimilarFunctionality
            } else {
                DuplicateReason::CopyPaste
            }),
            comparison_type: ComparisonType::Semantic,
        }
    } else if score >= thresholds.medium {
        Classification {
            severity: Severity::Medium,
            reason: Some(DuplicateReason::RefactorCandidate),
            comparison_type: ComparisonType::Structural,
        }
    } else if score >= thresholds.low {
        Classification {
            severity: Severity::Low,
            reason: None,
            comparison_type: ComparisonType::Structural,
        }
    } else {
        return None;
    };
    Some(classification)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds::new(0.95, 0.85, 0.75, 0.65).unwrap()
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        assert!(Thresholds::new(0.95, 0.85, 0.75, 0.65).is_ok());
        assert!(Thresholds::new(0.95, 0.85, 0.85, 0.65).is_err());
        assert!(Thresholds::new(0.85, 0.95, 0.75, 0.65).is_err());
        assert!(Thresholds::new(1.2, 0.85, 0.75, 0.65).is_err());
        assert!(Thresholds::new(0.95, 0.85, 0.75, -0.1).is_err());
        assert!(Thresholds::new(0.95, 0.85, 0.75, f32::NAN).is_err());
    }

    #[test]
    fn test_tiers() {
        let t = thresholds();

        let exact = classify(0.99, true, &t).unwrap();
        assert_eq!(exact.severity, Severity::Critical);
        assert_eq!(exact.reason, Some(DuplicateReason::IdenticalImplementation));
        assert_eq!(exact.comparison_type, ComparisonType::Exact);

        let cross_file = classify(0.9, false, &t).unwrap();
        assert_eq!(cross_file.severity, Severity::High);
        assert_eq!(cross_file.reason, Some(DuplicateReason::CopyPaste));
        assert_eq!(cross_file.comparison_type, ComparisonType::Semantic);

        let same_file = classify(0.9, true, &t).unwrap();
        assert_eq!(same_file.reason, Some(DuplicateReason::SimilarFunctionality));

        let refactor = classify(0.80, false, &t).unwrap();
        assert_eq!(refactor.severity, Severity::Medium);
        assert_eq!(refactor.reason, Some(DuplicateReason::RefactorCandidate));
        assert_eq!(refactor.comparison_type, ComparisonType::Structural);

        let low = classify(0.70, false, &t).unwrap();
        assert_eq!(low.severity, Severity::Low);
        assert_eq!(low.reason, None);

        assert!(classify(0.5, false, &t).is_none());
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let t = thresholds();
        assert_eq!(classify(0.95, false, &t).unwrap().severity, Severity::Critical);
        assert_eq!(classify(0.85, false, &t).unwrap().severity, Severity::High);
        assert_eq!(classify(0.75, false, &t).unwrap().severity, Severity::Medium);
        assert_eq!(classify(0.65, false, &t).unwrap().severity, Severity::Low);
    }
}
