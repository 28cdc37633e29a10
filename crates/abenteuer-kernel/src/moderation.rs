use std::sync::Arc;

use crate::backoff::{execute, BackoffError, BackoffPolicy, CancelSignal, Failure};
use crate::ports::Moderator;

pub const SAFE_BLOCK_MESSAGE_DE_EN: &str = "Diese Anfrage kann aus Sicherheitsgründen nicht bearbeitet werden. Wir zeigen stattdessen einen sicheren Ersatzplan. / This request cannot be processed for safety reasons. Showing a safe fallback plan instead.";

const UNAVAILABLE_CATEGORY: &str = "moderation_unavailable";
const UNCONFIGURED_CATEGORY: &str = "moderation_unconfigured";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Input,
    Output,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Output => "output",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    Passed,
    Blocked { categories: Vec<String> },
}

impl Screening {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Screening::Blocked { .. })
    }
}

/// Screens text on both sides of the generator call. Fails closed.
#[derive(Clone)]
pub struct ModerationGate {
    moderator: Option<Arc<dyn Moderator>>,
    policy: BackoffPolicy,
}

impl ModerationGate {
    pub fn new(moderator: Option<Arc<dyn Moderator>>, policy: BackoffPolicy) -> Self {
        Self { moderator, policy }
    }

    pub fn is_enabled(&self) -> bool {
        self.moderator.is_some()
    }

    pub async fn screen(&self, stage: Stage, text: &str, cancel: &CancelSignal) -> Screening {
        let Some(moderator) = &self.moderator else {
            tracing::warn!(stage = stage.as_str(), "no moderator configured; blocking");
            return Screening::Blocked {
                categories: vec![UNCONFIGURED_CATEGORY.to_string()],
            };
        };

        let result = execute(&self.policy, cancel, move |_| async move {
            moderator.check(text).await.map_err(Failure::from)
        })
        .await;

        match result {
            Ok(verdict) if !verdict.flagged => Screening::Passed,
            Ok(verdict) => {
                tracing::warn!(stage = stage.as_str(), categories = ?verdict.categories, "moderation flagged text");
                Screening::Blocked {
                    categories: verdict.categories,
                }
            }
            Err(err) => {
                let reason = match err {
                    BackoffError::Exhausted { attempts, .. } => format!("exhausted after {attempts} attempts"),
                    BackoffError::Permanent(_) => "permanent failure".to_string(),
                    BackoffError::Canceled => "canceled".to_string(),
                };
                tracing::warn!(stage = stage.as_str(), %reason, "moderation unavailable; blocking");
                Screening::Blocked {
                    categories: vec![UNAVAILABLE_CATEGORY.to_string()],
                }
            }
        }
    }
}
