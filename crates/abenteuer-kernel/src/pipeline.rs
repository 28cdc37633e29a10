//! One request end to end: weather, ranking, plan building and the safety veto.
//!
//! [`Pipeline::plan`] never fails. Every collaborator failure degrades into a safer plan
//! plus a bilingual [`Notice`] explaining what happened.

use std::sync::Arc;

use abenteuer_contracts::{
    Activity, ActivityPlan, Context, Notice, Provenance, SafetyFlag, ScoredCandidate,
    WeatherSummary, PLAN_VARIANTS_MAX, PLAN_VARIANTS_MIN,
};
use serde::Serialize;

use crate::backoff::{execute, BackoffError, BackoffPolicy, CancelSignal, Failure};
use crate::library::LibraryStore;
use crate::moderation::{ModerationGate, Stage, SAFE_BLOCK_MESSAGE_DE_EN};
use crate::offline::build_offline_plan;
use crate::ports::{CallError, GenerationRequest, Moderator, PlanGenerator, WeatherSource};
use crate::prompt::{build_prompt, truncate, SYSTEM_PROMPT, TRUNCATED_NOTICE_DE_EN};
use crate::recommender::{RecommendError, Recommender};
use crate::redact::Redactor;
use crate::safety::{fallback_plan, ApprovedPlan, SafetyValidator, Verdict};
use crate::scorer::ScoringWeights;

const WEATHER_UNAVAILABLE_DE_EN: &str = "Wetterdaten waren vorübergehend nicht verfügbar; die Auswahl erfolgt ohne Wetter. / Weather data was temporarily unavailable; the pick ignores the weather.";
const GENERATOR_UNAVAILABLE_DE_EN: &str = "Der Planassistent war vorübergehend nicht verfügbar; wir zeigen einen Plan aus der Bibliothek. / The plan assistant was temporarily unavailable; showing a library plan instead.";
const NO_CANDIDATES_DE_EN: &str = "Keine Aktivität passt zu diesen Angaben; hier ist ein sicherer Ersatzplan. / No activity matches these criteria; here is a safe fallback plan.";
const SAFETY_FALLBACK_DE_EN: &str = "Der Plan hat eine Sicherheitsprüfung nicht bestanden und wurde ersetzt. / The plan failed a safety check and was replaced.";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub weights: ScoringWeights,
    pub daily_rotation_margin: f64,
    pub alternatives: usize,
    pub backoff: BackoffPolicy,
    pub latitude: f64,
    pub longitude: f64,
    pub max_input_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            daily_rotation_margin: 0.0,
            alternatives: 3,
            backoff: BackoffPolicy::default(),
            latitude: 51.2277,
            longitude: 6.7735,
            max_input_chars: 4000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// A weather snapshot already on the context is used as is; otherwise it is fetched.
    pub context: Context,
    /// Free text from the caregiver. Redacted before it leaves the process.
    pub notes: Option<String>,
}

impl PlanRequest {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub plan: ApprovedPlan,
    pub plan_hash: String,
    pub candidate: Option<ScoredCandidate>,
    pub alternatives: Vec<ScoredCandidate>,
    pub weather: Option<WeatherSummary>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
    pub candidates: Vec<ScoredCandidate>,
    pub weather: Option<WeatherSummary>,
    pub notices: Vec<Notice>,
}

pub struct Pipeline {
    recommender: Recommender,
    redactor: Redactor,
    weather: Option<Arc<dyn WeatherSource>>,
    generator: Option<Arc<dyn PlanGenerator>>,
    moderation: ModerationGate,
    validator: SafetyValidator,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(library: Arc<LibraryStore>, redactor: Redactor, settings: PipelineSettings) -> Self {
        let recommender = Recommender::new(library, settings.weights.clone())
            .with_daily_rotation_margin(settings.daily_rotation_margin);
        let moderation = ModerationGate::new(None, settings.backoff.clone());
        Self {
            recommender,
            redactor,
            weather: None,
            generator: None,
            moderation,
            validator: SafetyValidator::default(),
            settings,
        }
    }

    pub fn with_weather_source(mut self, source: Arc<dyn WeatherSource>) -> Self {
        self.weather = Some(source);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn PlanGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_moderator(mut self, moderator: Arc<dyn Moderator>) -> Self {
        self.moderation = ModerationGate::new(Some(moderator), self.settings.backoff.clone());
        self
    }

    pub fn library(&self) -> &Arc<LibraryStore> {
        self.recommender.library()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn recommend(
        &self,
        request: &PlanRequest,
        count: usize,
        cancel: &CancelSignal,
    ) -> Result<Recommendations, RecommendError> {
        let mut notices = Vec::new();
        let ctx = self.resolve_weather(&request.context, cancel, &mut notices).await;
        let candidates = self.recommender.recommend(&ctx, count)?;
        Ok(Recommendations {
            candidates,
            weather: ctx.weather().cloned(),
            notices,
        })
    }

    pub async fn plan(&self, request: &PlanRequest, cancel: &CancelSignal) -> PlanOutcome {
        let mut notices = Vec::new();
        let ctx = self.resolve_weather(&request.context, cancel, &mut notices).await;
        let age_months = ctx.criteria().age_months();

        let picked = self
            .recommender
            .recommend_for_date(&ctx)
            .and_then(|candidate| {
                self.library()
                    .by_id(&candidate.activity_id)
                    .map(|activity| (candidate, activity))
                    .map_err(|_| RecommendError::EmptyResult)
            });
        let (candidate, activity) = match picked {
            Ok(found) => found,
            Err(RecommendError::EmptyResult) => {
                tracing::info!("no eligible candidates; using fallback plan");
                notices.push(Notice::new("no_candidates", NO_CANDIDATES_DE_EN));
                return self.finish(fallback_plan(), age_months, &[], None, Vec::new(), &ctx, notices);
            }
        };
        tracing::info!(activity_id = %candidate.activity_id, score = candidate.score, "candidate selected");

        let alternatives: Vec<ScoredCandidate> = self
            .recommender
            .rank(&ctx)
            .into_iter()
            .filter(|c| c.activity_id != candidate.activity_id)
            .take(self.settings.alternatives)
            .collect();

        let plan = match &self.generator {
            None => build_offline_plan(activity, &ctx),
            Some(generator) => {
                self.generate(generator.as_ref(), activity, &ctx, request.notes.as_deref(), cancel, &mut notices)
                    .await
            }
        };

        let flags: &[SafetyFlag] = if plan.provenance == Provenance::Fallback {
            &[]
        } else {
            &activity.safety_flags
        };
        self.finish(plan, age_months, flags, Some(candidate), alternatives, &ctx, notices)
    }

    async fn resolve_weather(
        &self,
        ctx: &Context,
        cancel: &CancelSignal,
        notices: &mut Vec<Notice>,
    ) -> Context {
        if ctx.weather().is_some() {
            return ctx.clone();
        }
        let Some(source) = &self.weather else {
            return ctx.clone();
        };

        let source = source.as_ref();
        let (latitude, longitude, date) = (self.settings.latitude, self.settings.longitude, ctx.date());
        let result = execute(&self.settings.backoff, cancel, move |attempt| async move {
            tracing::debug!(attempt, "weather lookup");
            source
                .get_weather(latitude, longitude, date)
                .await
                .map_err(Failure::from)
        })
        .await;

        match result {
            Ok(weather) => ctx.clone().with_weather(Some(weather)),
            Err(err) => {
                tracing::warn!(reason = %describe(&err), "weather unavailable; scoring without weather");
                notices.push(Notice::new("weather_unavailable", WEATHER_UNAVAILABLE_DE_EN));
                ctx.clone()
            }
        }
    }

    async fn generate(
        &self,
        generator: &dyn PlanGenerator,
        activity: &Activity,
        ctx: &Context,
        notes: Option<&str>,
        cancel: &CancelSignal,
        notices: &mut Vec<Notice>,
    ) -> ActivityPlan {
        // Nothing leaves the process without moderation on both sides of the call.
        if !self.moderation.is_enabled() || cancel.is_canceled() {
            tracing::warn!(
                activity_id = %activity.id,
                moderated = self.moderation.is_enabled(),
                canceled = cancel.is_canceled(),
                "generator skipped; using library plan"
            );
            notices.push(Notice::new("generator_unavailable", GENERATOR_UNAVAILABLE_DE_EN));
            return build_offline_plan(activity, ctx);
        }

        let (prompt, truncated) = truncate(
            &build_prompt(activity, ctx, notes),
            self.settings.max_input_chars,
        );
        if truncated {
            notices.push(Notice::new("input_truncated", TRUNCATED_NOTICE_DE_EN));
        }
        let request = GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: self.redactor.redact(&prompt),
        };

        if self.moderation.screen(Stage::Input, &request.prompt, cancel).await.is_blocked() {
            notices.push(Notice::new("moderation_blocked", SAFE_BLOCK_MESSAGE_DE_EN));
            return fallback_plan();
        }

        let request = &request;
        let result = execute(&self.settings.backoff, cancel, move |attempt| async move {
            tracing::debug!(attempt, "generator call");
            generator.generate_plan(request).await.map_err(Failure::from)
        })
        .await
        .and_then(|plan| {
            if plan.steps.is_empty()
                || !(PLAN_VARIANTS_MIN..=PLAN_VARIANTS_MAX).contains(&plan.variants.len())
            {
                Err(BackoffError::Permanent(CallError::InvalidResponse(
                    "plan shape out of bounds".to_string(),
                )))
            } else {
                Ok(plan)
            }
        });

        let mut plan = match result {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(activity_id = %activity.id, reason = %describe(&err), "generator unavailable; using library plan");
                notices.push(Notice::new("generator_unavailable", GENERATOR_UNAVAILABLE_DE_EN));
                return build_offline_plan(activity, ctx);
            }
        };
        plan.provenance = Provenance::Generated;
        plan.activity_id = Some(activity.id.clone());

        if self.moderation.screen(Stage::Output, &plan.text(), cancel).await.is_blocked() {
            notices.push(Notice::new("moderation_blocked", SAFE_BLOCK_MESSAGE_DE_EN));
            return fallback_plan();
        }
        plan
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        plan: ActivityPlan,
        age_months: u32,
        flags: &[SafetyFlag],
        candidate: Option<ScoredCandidate>,
        alternatives: Vec<ScoredCandidate>,
        ctx: &Context,
        mut notices: Vec<Notice>,
    ) -> PlanOutcome {
        let (plan, verdict) = self.validator.validate(plan, age_months, flags);
        if let Verdict::Rejected { .. } = verdict {
            notices.push(Notice::new("safety_fallback", SAFETY_FALLBACK_DE_EN));
        }
        let plan_hash = crate::stable_plan_hash(plan.plan());
        tracing::info!(
            activity_id = plan.plan().activity_id.as_deref().unwrap_or("-"),
            provenance = ?plan.plan().provenance,
            notices = notices.len(),
            "plan ready"
        );
        PlanOutcome {
            plan,
            plan_hash,
            candidate,
            alternatives,
            weather: ctx.weather().cloned(),
            notices,
        }
    }
}

fn describe<E: std::fmt::Display>(err: &BackoffError<E>) -> String {
    match err {
        BackoffError::Exhausted { attempts, last } => format!("exhausted after {attempts} attempts: {last}"),
        BackoffError::Permanent(err) => format!("permanent: {err}"),
        BackoffError::Canceled => "canceled".to_string(),
    }
}
