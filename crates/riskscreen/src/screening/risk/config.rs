use serde::{Deserialize, Serialize};

// The source material carried two divergent scoring tables; this one is the
// pinned default. Deployments that need the alternate weights override the
// config rather than the code.
pub const SEX_WITH_HIV_PARTNER_POINTS: u32 = 10;
pub const SEX_WITHOUT_CONDOM_POINTS: u32 = 10;
pub const SEX_WORKER_POINTS: u32 = 10;
pub const INJECTED_DRUGS_POINTS: u32 = 15;
pub const USED_DRUGS_POINTS: u32 = 5;
pub const ALCOHOL_BEFORE_SEX_POINTS: u32 = 5;
pub const STI_SYMPTOMS_POINTS: u32 = 10;

pub const PARTNERS_TWO_TO_THREE_POINTS: u32 = 5;
pub const PARTNERS_FOUR_TO_FIVE_POINTS: u32 = 10;
pub const PARTNERS_SIX_OR_MORE_POINTS: u32 = 15;

pub const SCORE_CEILING: u32 = 100;

pub const VERY_HIGH_THRESHOLD: u32 = 50;
pub const HIGH_THRESHOLD: u32 = 35;
pub const MEDIUM_THRESHOLD: u32 = 20;
pub const LOW_THRESHOLD: u32 = 10;

/// Point values and thresholds for the scoring engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub sex_with_hiv_partner_points: u32,
    pub sex_without_condom_points: u32,
    pub sex_worker_points: u32,
    pub injected_drugs_points: u32,
    pub used_drugs_points: u32,
    pub alcohol_before_sex_points: u32,
    pub sti_symptoms_points: u32,
    pub partners_two_to_three_points: u32,
    pub partners_four_to_five_points: u32,
    pub partners_six_or_more_points: u32,
    /// `None` disables capping entirely.
    pub score_ceiling: Option<u32>,
    pub very_high_threshold: u32,
    pub high_threshold: u32,
    pub medium_threshold: u32,
    pub low_threshold: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sex_with_hiv_partner_points: SEX_WITH_HIV_PARTNER_POINTS,
            sex_without_condom_points: SEX_WITHOUT_CONDOM_POINTS,
            sex_worker_points: SEX_WORKER_POINTS,
            injected_drugs_points: INJECTED_DRUGS_POINTS,
            used_drugs_points: USED_DRUGS_POINTS,
            alcohol_before_sex_points: ALCOHOL_BEFORE_SEX_POINTS,
            sti_symptoms_points: STI_SYMPTOMS_POINTS,
            partners_two_to_three_points: PARTNERS_TWO_TO_THREE_POINTS,
            partners_four_to_five_points: PARTNERS_FOUR_TO_FIVE_POINTS,
            partners_six_or_more_points: PARTNERS_SIX_OR_MORE_POINTS,
            score_ceiling: Some(SCORE_CEILING),
            very_high_threshold: VERY_HIGH_THRESHOLD,
            high_threshold: HIGH_THRESHOLD,
            medium_threshold: MEDIUM_THRESHOLD,
            low_threshold: LOW_THRESHOLD,
        }
    }
}
