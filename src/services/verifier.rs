//! Default result verifier.

use std::collections::BTreeSet;

use crate::domain::models::report::ArtifactRecord;
use crate::domain::models::{Task, TaskResult};
use crate::domain::ports::{ResultVerifier, Verification};

const FAILURE_QUALITY: f64 = 0.2;
const BASE_QUALITY: f64 = 0.6;
const OUTPUT_BONUS: f64 = 0.3;
const MESSAGE_BONUS: f64 = 0.1;
const MIN_KEYWORD_LEN: usize = 4;

/// Scores results by shape and judges goal coverage by keyword overlap.
#[derive(Debug, Clone)]
pub struct DefaultVerifier {
    consensus_threshold: f64,
}

impl DefaultVerifier {
    pub const fn new(consensus_threshold: f64) -> Self {
        Self {
            consensus_threshold,
        }
    }

    fn quality(result: &TaskResult) -> f64 {
        if !result.success {
            return FAILURE_QUALITY;
        }
        let mut quality = BASE_QUALITY;
        if result.has_output() {
            quality += OUTPUT_BONUS;
        }
        if !result.messages.is_empty() {
            quality += MESSAGE_BONUS;
        }
        quality.min(1.0)
    }
}

impl Default for DefaultVerifier {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl ResultVerifier for DefaultVerifier {
    fn verify(&self, _task: &Task, result: &TaskResult) -> Verification {
        if !result.is_well_formed() {
            return Verification {
                accepted: false,
                quality: 0.0,
                reason: "failed result carried no error".to_string(),
            };
        }

        let quality = Self::quality(result);
        let (accepted, reason) = if !result.success {
            (
                false,
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "handler reported failure".to_string()),
            )
        } else if !result.has_output() {
            (false, "result produced no artifacts or subtasks".to_string())
        } else if quality < self.consensus_threshold {
            (
                false,
                format!(
                    "quality {quality:.2} below threshold {:.2}",
                    self.consensus_threshold
                ),
            )
        } else {
            (true, "accepted".to_string())
        };

        Verification {
            accepted,
            quality,
            reason,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn goal_satisfaction(&self, goal: &Task, artifacts: &[ArtifactRecord]) -> f64 {
        if artifacts.is_empty() {
            return 0.0;
        }
        let wanted: BTreeSet<String> = keywords(&goal.objective).collect();
        if wanted.is_empty() {
            return 0.0;
        }

        let corpus: BTreeSet<String> = artifacts
            .iter()
            .flat_map(|record| {
                let text = match &record.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                keywords(&text).collect::<Vec<_>>()
            })
            .collect();

        let covered = wanted.iter().filter(|k| corpus.contains(*k)).count();
        covered as f64 / wanted.len() as f64
    }
}

fn keywords(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
}
