//! Collaborator seams. The server provides network adapters; tests provide fakes.

use abenteuer_contracts::{ActivityPlan, PlanReport, WeatherSummary};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::backoff::is_transient_status;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    #[error("upstream returned http {status}")]
    Status { status: u16 },
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl CallError {
    pub fn is_transient(&self) -> bool {
        match self {
            CallError::Status { status } => is_transient_status(*status),
            CallError::Timeout | CallError::Connect(_) => true,
            CallError::InvalidResponse(_) | CallError::NotConfigured(_) => false,
        }
    }
}

/// Text handed to the plan generator. Already redacted and screened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub flagged: bool,
    pub categories: Vec<String>,
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn get_weather(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<WeatherSummary, CallError>;
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate_plan(&self, request: &GenerationRequest) -> Result<ActivityPlan, CallError>;
}

#[async_trait]
pub trait Moderator: Send + Sync {
    async fn check(&self, text: &str) -> Result<ModerationVerdict, CallError>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn append(&self, report: &PlanReport) -> Result<(), String>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<PlanReport>, String>;
}
