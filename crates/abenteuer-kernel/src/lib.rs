pub mod backoff;
pub mod library;
pub mod moderation;
pub mod offline;
pub mod pipeline;
pub mod ports;
pub mod prompt;
pub mod recommender;
pub mod redact;
pub mod safety;
pub mod scorer;
pub mod weather;

use abenteuer_contracts::ActivityPlan;
use chrono::NaiveDate;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub use backoff::{BackoffError, BackoffPolicy, CancelHandle, CancelSignal, Failure};
pub use library::{CatalogLoadError, LibraryStore, NotFound};
pub use moderation::{ModerationGate, Screening, Stage};
pub use pipeline::{Pipeline, PipelineSettings, PlanOutcome, PlanRequest, Recommendations};
pub use ports::{
    CallError, GenerationRequest, ModerationVerdict, Moderator, PlanGenerator, ReportSink,
    WeatherSource,
};
pub use recommender::{RecommendError, Recommender};
pub use redact::Redactor;
pub use safety::{ApprovedPlan, SafetyValidator, Verdict};
pub use scorer::ScoringWeights;

pub fn jcs_sha256_hex(value: &Value) -> Result<String, String> {
    let canonical = serde_jcs::to_string(value)
        .map_err(|err| format!("failed to canonicalize JSON via JCS: {err}"))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// SHA-256 over the canonical JSON form of a plan; identifies a plan in reports.
pub fn plan_hash(plan: &ActivityPlan) -> Result<String, String> {
    let value = serde_json::to_value(plan).map_err(|err| format!("serialize plan: {err}"))?;
    jcs_sha256_hex(&value)
}

/// [`plan_hash`] that is never empty: falls back to a digest of the plan's debug form.
pub fn stable_plan_hash(plan: &ActivityPlan) -> String {
    or_debug_digest(plan_hash(plan), plan)
}

fn or_debug_digest(canonical: Result<String, String>, plan: &ActivityPlan) -> String {
    canonical.unwrap_or_else(|err| {
        tracing::error!(%err, "canonical plan hash failed; using debug digest");
        sha256_hex(format!("{plan:?}").as_bytes())
    })
}

/// Seed for per-day selection: stable for a date and a criteria fingerprint.
pub fn daily_seed(date: NaiveDate, fingerprint: &str) -> u64 {
    let date = date.format("%Y-%m-%d").to_string();
    let digest = digest_parts(&[date.as_str(), fingerprint]);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn digest_parts(parts: &[&str]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0]);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
