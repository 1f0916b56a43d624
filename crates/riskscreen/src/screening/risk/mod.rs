//! Risk scoring over the answer set.

mod config;
mod rules;

pub use config::{
    RiskConfig, ALCOHOL_BEFORE_SEX_POINTS, HIGH_THRESHOLD, INJECTED_DRUGS_POINTS, LOW_THRESHOLD,
    MEDIUM_THRESHOLD, PARTNERS_FOUR_TO_FIVE_POINTS, PARTNERS_SIX_OR_MORE_POINTS,
    PARTNERS_TWO_TO_THREE_POINTS, SCORE_CEILING, SEX_WITHOUT_CONDOM_POINTS,
    SEX_WITH_HIV_PARTNER_POINTS, SEX_WORKER_POINTS, STI_SYMPTOMS_POINTS, USED_DRUGS_POINTS,
    VERY_HIGH_THRESHOLD,
};

use serde::{Deserialize, Serialize};

use crate::screening::domain::{FieldKey, ScreeningRecord};
use crate::screening::sync::normalize::is_affirmative;

/// Categorical risk level, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::VeryLow => "Very Low",
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::VeryHigh => "Very High",
        }
    }
}

/// Derived scoring output; recomputed on demand and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Stateless evaluator applying a [`RiskConfig`] to a record.
///
/// Pure: no I/O, no mutation, safe to call on every answer change.
#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn score(&self, record: &ScreeningRecord) -> RiskProfile {
        let (raw_total, factors) = rules::score_answers(record, &self.config);
        let score = match self.config.score_ceiling {
            Some(ceiling) => raw_total.min(ceiling),
            None => raw_total,
        };

        RiskProfile {
            score,
            level: self.level_for(score),
            recommendations: self.recommendations_for(record, score),
            factors,
        }
    }

    fn level_for(&self, score: u32) -> RiskLevel {
        if score >= self.config.very_high_threshold {
            RiskLevel::VeryHigh
        } else if score >= self.config.high_threshold {
            RiskLevel::High
        } else if score >= self.config.medium_threshold {
            RiskLevel::Medium
        } else if score >= self.config.low_threshold {
            RiskLevel::Low
        } else {
            RiskLevel::VeryLow
        }
    }

    /// Independent triggers, evaluated in a fixed order so the output list
    /// is stable.
    fn recommendations_for(&self, record: &ScreeningRecord, score: u32) -> Vec<String> {
        let mut recommendations = Vec::new();

        if record
            .answer(FieldKey::SexWithoutCondom)
            .is_some_and(is_affirmative)
        {
            recommendations.push("Provide condom education and distribution.".to_string());
        }

        if hiv_status_unknown(record.answer(FieldKey::HivTestResult)) {
            recommendations.push("Refer for HIV testing.".to_string());
        }

        if score >= self.config.high_threshold {
            recommendations.push("Assess eligibility for PrEP.".to_string());
        }

        if record
            .answer(FieldKey::InjectedDrugs)
            .is_some_and(is_affirmative)
        {
            recommendations.push("Refer to harm reduction services.".to_string());
        }

        if record
            .answer(FieldKey::StiSymptoms)
            .is_some_and(is_affirmative)
        {
            recommendations.push("Refer for STI screening and treatment.".to_string());
        }

        recommendations
    }
}

fn hiv_status_unknown(answer: Option<&str>) -> bool {
    match answer {
        None => true,
        Some(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            normalized.is_empty() || matches!(normalized.as_str(), "unknown" | "never tested" | "no")
        }
    }
}
