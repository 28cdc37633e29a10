use std::sync::Arc;

use abenteuer_contracts::{Activity, Context, ScoredCandidate};
use thiserror::Error;

use crate::library::LibraryStore;
use crate::scorer::{rank_order, score, ScoringWeights};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecommendError {
    #[error("no activity matches the given criteria")]
    EmptyResult,
}

#[derive(Debug, Clone)]
pub struct Recommender {
    library: Arc<LibraryStore>,
    weights: ScoringWeights,
    daily_rotation_margin: f64,
}

impl Recommender {
    pub fn new(library: Arc<LibraryStore>, weights: ScoringWeights) -> Self {
        Self {
            library,
            weights,
            daily_rotation_margin: 0.0,
        }
    }

    /// Candidates within `margin` of the top score share the daily rotation.
    pub fn with_daily_rotation_margin(mut self, margin: f64) -> Self {
        self.daily_rotation_margin = margin.max(0.0);
        self
    }

    pub fn library(&self) -> &Arc<LibraryStore> {
        &self.library
    }

    /// Every eligible candidate in total order.
    pub fn rank(&self, ctx: &Context) -> Vec<ScoredCandidate> {
        let mut ranked: Vec<ScoredCandidate> = self
            .library
            .all()
            .iter()
            .filter(|activity| passes_hard_filters(activity, ctx))
            .map(|activity| score(activity, ctx, &self.weights))
            .filter(|candidate| !candidate.is_excluded())
            .collect();
        ranked.sort_by(rank_order);
        ranked
    }

    /// At least one candidate is returned; a `count` of zero is read as one.
    pub fn recommend(
        &self,
        ctx: &Context,
        count: usize,
    ) -> Result<Vec<ScoredCandidate>, RecommendError> {
        let mut ranked = self.rank(ctx);
        if ranked.is_empty() {
            return Err(RecommendError::EmptyResult);
        }
        ranked.truncate(count.max(1));
        Ok(ranked)
    }

    /// The candidate of the day. Stable for a fixed library, context and date.
    pub fn recommend_for_date(&self, ctx: &Context) -> Result<ScoredCandidate, RecommendError> {
        let ranked = self.rank(ctx);
        let top = ranked.first().ok_or(RecommendError::EmptyResult)?;
        if self.daily_rotation_margin <= 0.0 {
            return Ok(top.clone());
        }

        let floor = top.score - self.daily_rotation_margin;
        let pool = ranked.iter().take_while(|c| c.score >= floor).count();
        let seed = crate::daily_seed(ctx.date(), &ctx.criteria().fingerprint());
        let index = (seed % pool as u64) as usize;
        tracing::debug!(pool, index, "daily rotation pick");
        Ok(ranked[index].clone())
    }
}

fn passes_hard_filters(activity: &Activity, ctx: &Context) -> bool {
    let criteria = ctx.criteria();
    if criteria.strict_age() && !activity.age_range.contains(criteria.age_months()) {
        return false;
    }
    if activity
        .safety_flags
        .iter()
        .any(|flag| criteria.excluded_safety_flags().contains(flag))
    {
        return false;
    }
    activity
        .materials
        .required
        .iter()
        .all(|m| criteria.has_material(m))
}
