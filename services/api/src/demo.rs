use std::path::PathBuf;

use clap::Args;
use riskscreen::error::AppError;
use riskscreen::screening::{RecordPatch, RiskConfig, RiskEngine, ScreeningRecord};

use crate::infra::sample_patch;

#[derive(Args, Debug, Default)]
pub(crate) struct ScoreArgs {
    /// Path to a JSON record patch; a built-in sample is scored when omitted
    #[arg(long)]
    pub(crate) file: Option<PathBuf>,
}

/// Scores a record entirely offline and prints the resulting profile.
pub(crate) fn run_score_demo(args: ScoreArgs) -> Result<(), AppError> {
    let patch = match args.file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<RecordPatch>(&raw).map_err(|err| {
                AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
            })?
        }
        None => sample_patch(),
    };

    let mut record = ScreeningRecord::default();
    record.merge(patch);

    let profile = RiskEngine::new(RiskConfig::default()).score(&record);

    println!("Risk score: {} ({})", profile.score, profile.level.label());
    if profile.factors.is_empty() {
        println!("No contributing factors.");
    } else {
        println!("Contributing factors:");
        for factor in &profile.factors {
            println!("  - {factor}");
        }
    }
    if !profile.recommendations.is_empty() {
        println!("Recommendations:");
        for recommendation in &profile.recommendations {
            println!("  - {recommendation}");
        }
    }

    Ok(())
}
