//! Activity-code scoring against the service taxonomy.
//!
//! AFIP taxpayers declare business activities as 6-digit codes. The
//! matcher scores the declared set against a configured target taxonomy
//! and maps the score to one of three recommendations. Weights and
//! thresholds are configuration; only the three-tier contract is fixed.
//! Pure and synchronous.

use serde::{Deserialize, Serialize};

/// A declared business activity code (6 digits in the AFIP taxonomy,
/// stored as text because leading zeros are significant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityCode(pub String);

impl ActivityCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One target in the taxonomy: any declared code starting with `prefix`
/// contributes `weight` to the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetActivity {
    pub prefix: String,
    /// 0-100; the score is the maximum weight over all matches.
    pub weight: u8,
}

/// Matcher configuration. Thresholds come from deployment config, not
/// code; the defaults exist so tests and dev setups can boot.
#[derive(Debug, Clone)]
pub struct ActivityMatcherConfig {
    pub targets: Vec<TargetActivity>,
    /// Scores at or above this auto-approve.
    pub approve_at: u8,
    /// Scores at or above this (but below `approve_at`) go to review;
    /// anything lower is rejected.
    pub review_at: u8,
}

impl Default for ActivityMatcherConfig {
    fn default() -> Self {
        Self {
            targets: vec![
                // Construction installation trades (gas, electrical,
                // plumbing) and repair services.
                TargetActivity {
                    prefix: "432".to_string(),
                    weight: 100,
                },
                TargetActivity {
                    prefix: "433".to_string(),
                    weight: 80,
                },
                TargetActivity {
                    prefix: "952".to_string(),
                    weight: 70,
                },
                // General construction: related but not a direct match.
                TargetActivity {
                    prefix: "41".to_string(),
                    weight: 50,
                },
            ],
            approve_at: 70,
            review_at: 40,
        }
    }
}

/// The stable three-tier contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approved,
    Review,
    Rejected,
}

/// Score plus its recommendation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityScore {
    /// 0-100.
    pub score: u8,
    pub recommendation: Recommendation,
}

pub struct ActivityMatcher {
    config: ActivityMatcherConfig,
}

impl ActivityMatcher {
    pub fn new(config: ActivityMatcherConfig) -> Self {
        Self { config }
    }

    /// Score a declared activity set: the maximum weight over all
    /// prefix-matched targets, 0 when nothing matches.
    pub fn score(&self, codes: &[ActivityCode]) -> ActivityScore {
        let score = codes
            .iter()
            .flat_map(|code| {
                self.config
                    .targets
                    .iter()
                    .filter(|t| code.as_str().starts_with(&t.prefix))
                    .map(|t| t.weight)
            })
            .max()
            .unwrap_or(0)
            .min(100);

        let recommendation = if score >= self.config.approve_at {
            Recommendation::Approved
        } else if score >= self.config.review_at {
            Recommendation::Review
        } else {
            Recommendation::Rejected
        };

        ActivityScore {
            score,
            recommendation,
        }
    }
}

impl Default for ActivityMatcher {
    fn default() -> Self {
        Self::new(ActivityMatcherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(raw: &[&str]) -> Vec<ActivityCode> {
        raw.iter().map(|c| ActivityCode::new(*c)).collect()
    }

    #[test]
    fn direct_trade_code_approves() {
        let matcher = ActivityMatcher::default();
        let result = matcher.score(&codes(&["432200"]));
        assert_eq!(result.score, 100);
        assert_eq!(result.recommendation, Recommendation::Approved);
    }

    #[test]
    fn related_code_goes_to_review() {
        let matcher = ActivityMatcher::default();
        let result = matcher.score(&codes(&["410011"]));
        assert_eq!(result.score, 50);
        assert_eq!(result.recommendation, Recommendation::Review);
    }

    #[test]
    fn unrelated_codes_reject() {
        let matcher = ActivityMatcher::default();
        let result = matcher.score(&codes(&["620100", "691001"]));
        assert_eq!(result.score, 0);
        assert_eq!(result.recommendation, Recommendation::Rejected);
    }

    #[test]
    fn best_match_wins() {
        let matcher = ActivityMatcher::default();
        // Repair service (70) plus a direct installation code (100).
        let result = matcher.score(&codes(&["952200", "432110"]));
        assert_eq!(result.score, 100);
        assert_eq!(result.recommendation, Recommendation::Approved);
    }

    #[test]
    fn empty_declaration_rejects() {
        let matcher = ActivityMatcher::default();
        let result = matcher.score(&[]);
        assert_eq!(result.score, 0);
        assert_eq!(result.recommendation, Recommendation::Rejected);
    }

    #[test]
    fn thresholds_are_configuration() {
        let matcher = ActivityMatcher::new(ActivityMatcherConfig {
            targets: vec![TargetActivity {
                prefix: "43".to_string(),
                weight: 60,
            }],
            approve_at: 60,
            review_at: 30,
        });
        let result = matcher.score(&codes(&["432200"]));
        assert_eq!(result.recommendation, Recommendation::Approved);
    }
}
