use super::config::RiskConfig;
use crate::screening::domain::{FieldKey, ScreeningRecord};
use crate::screening::sync::normalize::is_affirmative;

/// Sums the per-answer contributions and records which answers fired.
///
/// Contributions are additive and never negative, so flipping any single
/// answer from "No" to "Yes" can only raise the total.
pub(crate) fn score_answers(record: &ScreeningRecord, config: &RiskConfig) -> (u32, Vec<String>) {
    let mut total: u32 = 0;
    let mut factors = Vec::new();

    let yes_no_points: &[(FieldKey, u32, &str)] = &[
        (
            FieldKey::SexWithHivPartner,
            config.sex_with_hiv_partner_points,
            "sex with an HIV-positive partner",
        ),
        (
            FieldKey::SexWithoutCondom,
            config.sex_without_condom_points,
            "sex without a condom",
        ),
        (
            FieldKey::SexWorker,
            config.sex_worker_points,
            "engaged in sex work",
        ),
        (
            FieldKey::InjectedDrugs,
            config.injected_drugs_points,
            "injecting drug use",
        ),
        (
            FieldKey::UsedDrugs,
            config.used_drugs_points,
            "non-injecting drug use",
        ),
        (
            FieldKey::AlcoholBeforeSex,
            config.alcohol_before_sex_points,
            "alcohol before sex",
        ),
        (
            FieldKey::StiSymptoms,
            config.sti_symptoms_points,
            "reported STI symptoms",
        ),
    ];

    for (key, points, label) in yes_no_points {
        if record.answer(*key).is_some_and(is_affirmative) {
            total += points;
            factors.push(format!("{label} (+{points})"));
        }
    }

    if let Some(raw) = record.answer(FieldKey::NumberOfSexualPartners) {
        if let Some((points, label)) = partner_tier(raw, config) {
            if points > 0 {
                total += points;
                factors.push(format!("{label} (+{points})"));
            }
        }
    }

    (total, factors)
}

/// Tiered contribution for the partner count. "6+" and "6 or more" land in
/// the ceiling tier.
pub(crate) fn partner_tier(raw: &str, config: &RiskConfig) -> Option<(u32, &'static str)> {
    let count = parse_partner_count(raw)?;
    let tier = match count {
        0..=1 => (0, "one partner or fewer"),
        2..=3 => (config.partners_two_to_three_points, "2-3 sexual partners"),
        4..=5 => (config.partners_four_to_five_points, "4-5 sexual partners"),
        _ => (
            config.partners_six_or_more_points,
            "6 or more sexual partners",
        ),
    };
    Some(tier)
}

fn parse_partner_count(raw: &str) -> Option<u32> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(prefix) = trimmed.strip_suffix('+') {
        return prefix.trim().parse().ok();
    }
    if let Some(prefix) = trimmed.strip_suffix("or more") {
        return prefix.trim().parse().ok();
    }

    trimmed.parse().ok()
}
