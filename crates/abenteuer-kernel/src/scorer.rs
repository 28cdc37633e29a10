use std::cmp::Ordering;

use abenteuer_contracts::{
    normalize_token, Activity, Context, EnergyLevel, Location, ScoreDimension, ScoreReason,
    ScoredCandidate, WeatherCondition,
};

/// Tunable weights for every scoring dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub age_weight: f64,
    pub duration_penalty_per_minute: f64,
    pub season_bonus: f64,
    pub weather_bonus: f64,
    pub outdoor_precipitation_penalty: f64,
    pub optional_material_bonus: f64,
    pub mood_bonus: f64,
    pub topic_bonus: f64,
    pub topic_bonus_cap: f64,
    pub location_bonus: f64,
    pub effort_bonus: f64,
    pub over_budget_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            age_weight: 3.0,
            duration_penalty_per_minute: 0.1,
            season_bonus: 1.0,
            weather_bonus: 1.25,
            outdoor_precipitation_penalty: 2.0,
            optional_material_bonus: 0.5,
            mood_bonus: 1.0,
            topic_bonus: 0.6,
            topic_bonus_cap: 2.0,
            location_bonus: 1.0,
            effort_bonus: 0.5,
            over_budget_penalty: 2.0,
        }
    }
}

/// Scores one activity against a context. Pure; a missing required material yields `-inf`.
pub fn score(activity: &Activity, ctx: &Context, weights: &ScoringWeights) -> ScoredCandidate {
    let criteria = ctx.criteria();
    let mut reasons = Vec::new();

    if let Some(missing) = activity
        .materials
        .required
        .iter()
        .find(|m| !criteria.has_material(m))
    {
        tracing::trace!(activity_id = %activity.id, material = %missing, "required material missing");
        return ScoredCandidate {
            activity_id: activity.id.clone(),
            score: f64::NEG_INFINITY,
            reasons: vec![ScoreReason {
                dimension: ScoreDimension::Materials,
                delta: f64::NEG_INFINITY,
            }],
        };
    }

    let mut push = |dimension, delta: f64| {
        if delta != 0.0 {
            reasons.push(ScoreReason { dimension, delta });
        }
    };

    push(ScoreDimension::Age, age_fit(activity, ctx, weights));

    let mismatch = activity.duration_range.mismatch(ctx.available_minutes());
    push(
        ScoreDimension::Duration,
        -weights.duration_penalty_per_minute * f64::from(mismatch),
    );

    if activity.season_tags.contains(&ctx.season()) {
        push(ScoreDimension::Season, weights.season_bonus);
    }

    if let Some(weather) = ctx.weather() {
        let tags = weather.tags();
        let mut delta = 0.0;
        if activity.weather_tags.iter().any(|t| tags.contains(t)) {
            delta += weights.weather_bonus;
        }
        let rough = weather.precipitation || weather.condition == WeatherCondition::Stormy;
        if rough && activity.location == Location::Outdoor {
            delta -= weights.outdoor_precipitation_penalty;
        }
        push(ScoreDimension::Weather, delta);
    }

    let optional_hits = activity
        .materials
        .optional
        .iter()
        .filter(|m| criteria.has_material(m))
        .count();
    push(
        ScoreDimension::Materials,
        weights.optional_material_bonus * optional_hits as f64,
    );

    if let Some(mood) = criteria.mood() {
        if activity.mood_tags.contains(&mood) {
            push(ScoreDimension::Mood, weights.mood_bonus);
        }
    }

    let topic_hits = activity
        .topic_tags
        .iter()
        .map(|t| normalize_token(t))
        .filter(|t| criteria.topics().contains(t))
        .count();
    push(
        ScoreDimension::Topics,
        (weights.topic_bonus * topic_hits as f64).min(weights.topic_bonus_cap),
    );

    push(
        ScoreDimension::Location,
        location_fit(activity.location, criteria.location_preference(), weights),
    );

    if let Some(effort) = criteria.effort() {
        push(
            ScoreDimension::Effort,
            effort_fit(activity.energy_level, effort, weights),
        );
    }

    if activity.estimated_cost_eur > criteria.budget_eur_max() {
        push(ScoreDimension::Budget, -weights.over_budget_penalty);
    }

    let total = reasons.iter().map(|r| r.delta).sum();
    ScoredCandidate {
        activity_id: activity.id.clone(),
        score: total,
        reasons,
    }
}

/// Score descending, then id ascending.
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.activity_id.cmp(&b.activity_id))
}

fn age_fit(activity: &Activity, ctx: &Context, weights: &ScoringWeights) -> f64 {
    let months = ctx.criteria().age_months();
    let range = activity.age_range;
    if !range.contains(months) {
        return 0.0;
    }
    let half_span = f64::from(range.max_months - range.min_months) / 2.0;
    if half_span == 0.0 {
        return weights.age_weight;
    }
    let midpoint = f64::from(range.min_months) + half_span;
    let distance = (f64::from(months) - midpoint).abs();
    weights.age_weight * (1.0 - 0.5 * distance / half_span)
}

fn location_fit(activity: Location, preference: Location, weights: &ScoringWeights) -> f64 {
    match (preference, activity) {
        (Location::Mixed, _) => 0.0,
        (wanted, got) if wanted == got => weights.location_bonus,
        (_, Location::Mixed) => weights.location_bonus * 0.5,
        _ => 0.0,
    }
}

fn effort_fit(activity: EnergyLevel, wanted: EnergyLevel, weights: &ScoringWeights) -> f64 {
    let rank = |level: EnergyLevel| match level {
        EnergyLevel::Low => 0i8,
        EnergyLevel::Medium => 1,
        EnergyLevel::High => 2,
    };
    match (rank(activity) - rank(wanted)).abs() {
        0 => weights.effort_bonus,
        1 => weights.effort_bonus * 0.5,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abenteuer_contracts::{
        Age, AgeRange, Difficulty, DurationRange, Materials, Mood, SearchCriteria,
        SearchCriteriaInput, Season, WeatherSummary, WeatherTag,
    };
    use chrono::NaiveDate;

    fn activity(id: &str) -> Activity {
        Activity {
            id: id.to_string(),
            title: id.to_string(),
            summary: String::new(),
            season_tags: vec![],
            weather_tags: vec![],
            energy_level: EnergyLevel::Low,
            difficulty: Difficulty::Easy,
            safety_flags: vec![],
            age_range: AgeRange {
                min_months: 24,
                max_months: 72,
            },
            duration_range: DurationRange {
                min_minutes: 10,
                max_minutes: 30,
            },
            materials: Materials::default(),
            mood_tags: vec![],
            topic_tags: vec![],
            location: Location::Indoor,
            estimated_cost_eur: 0.0,
            steps: vec![],
            safety_notes: vec![],
        }
    }

    fn context(input: SearchCriteriaInput, weather: Option<WeatherSummary>) -> Context {
        let criteria = SearchCriteria::try_from(input).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        Context::new(date, criteria, None, weather).unwrap()
    }

    fn delta(candidate: &ScoredCandidate, dimension: ScoreDimension) -> f64 {
        candidate
            .reasons
            .iter()
            .filter(|r| r.dimension == dimension)
            .map(|r| r.delta)
            .sum()
    }

    #[test]
    fn age_fit_peaks_at_midpoint_and_is_zero_outside() {
        let weights = ScoringWeights::default();
        let a = activity("a");
        let mid = score(&a, &context(SearchCriteriaInput::new(Age::months(48), 20), None), &weights);
        let edge = score(&a, &context(SearchCriteriaInput::new(Age::months(24), 20), None), &weights);
        let outside = score(&a, &context(SearchCriteriaInput::new(Age::years(8), 20), None), &weights);

        assert_eq!(delta(&mid, ScoreDimension::Age), 3.0);
        assert_eq!(delta(&edge, ScoreDimension::Age), 1.5);
        assert_eq!(delta(&outside, ScoreDimension::Age), 0.0);
    }

    #[test]
    fn duration_mismatch_is_penalized_per_minute() {
        let weights = ScoringWeights::default();
        let a = activity("a");
        let inside = score(&a, &context(SearchCriteriaInput::new(Age::years(4), 20), None), &weights);
        let longer = score(&a, &context(SearchCriteriaInput::new(Age::years(4), 50), None), &weights);
        assert_eq!(delta(&inside, ScoreDimension::Duration), 0.0);
        assert!((delta(&longer, ScoreDimension::Duration) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn missing_required_material_scores_negative_infinity() {
        let mut a = activity("a");
        a.materials.required = vec!["chalk".to_string()];
        let candidate = score(
            &a,
            &context(SearchCriteriaInput::new(Age::years(4), 20), None),
            &ScoringWeights::default(),
        );
        assert!(candidate.is_excluded());

        let mut input = SearchCriteriaInput::new(Age::years(4), 20);
        input.materials = vec!["Chalk".to_string()];
        let candidate = score(&a, &context(input, None), &ScoringWeights::default());
        assert!(candidate.score.is_finite());
    }

    #[test]
    fn absent_weather_adds_no_weather_delta() {
        let mut a = activity("a");
        a.weather_tags = vec![WeatherTag::Rainy];
        a.location = Location::Outdoor;
        let candidate = score(
            &a,
            &context(SearchCriteriaInput::new(Age::years(4), 20), None),
            &ScoringWeights::default(),
        );
        assert_eq!(delta(&candidate, ScoreDimension::Weather), 0.0);
    }

    #[test]
    fn outdoor_activity_is_penalized_under_rain() {
        let weights = ScoringWeights::default();
        let mut outdoor = activity("outdoor");
        outdoor.location = Location::Outdoor;
        let mut indoor = activity("indoor");
        indoor.weather_tags = vec![WeatherTag::Rainy];

        let rain = WeatherSummary::new(WeatherCondition::Rainy, Some(12.0), Some(80));
        let ctx = context(SearchCriteriaInput::new(Age::years(4), 20), Some(rain));
        assert_eq!(delta(&score(&outdoor, &ctx, &weights), ScoreDimension::Weather), -2.0);
        assert_eq!(delta(&score(&indoor, &ctx, &weights), ScoreDimension::Weather), 1.25);
    }

    #[test]
    fn season_mood_topics_and_effort_add_bonuses() {
        let weights = ScoringWeights::default();
        let mut a = activity("a");
        a.season_tags = vec![Season::Autumn];
        a.mood_tags = vec![Mood::Calm];
        a.topic_tags = vec!["Natur".to_string(), "tiere".to_string(), "farben".to_string()];
        a.energy_level = EnergyLevel::Medium;

        let mut input = SearchCriteriaInput::new(Age::years(4), 20);
        input.mood = Some(Mood::Calm);
        input.topics = vec!["natur".to_string(), "tiere".to_string(), "farben".to_string(), "zahlen".to_string()];
        input.effort = Some(EnergyLevel::High);
        let candidate = score(&a, &context(input, None), &weights);

        assert_eq!(delta(&candidate, ScoreDimension::Season), 1.0);
        assert_eq!(delta(&candidate, ScoreDimension::Mood), 1.0);
        assert!((delta(&candidate, ScoreDimension::Topics) - 1.8).abs() < 1e-9);
        assert_eq!(delta(&candidate, ScoreDimension::Effort), 0.25);
    }

    #[test]
    fn topic_bonus_is_capped() {
        let weights = ScoringWeights::default();
        let mut a = activity("a");
        a.topic_tags = (0..6).map(|i| format!("t{i}")).collect();
        let mut input = SearchCriteriaInput::new(Age::years(4), 20);
        input.topics = a.topic_tags.clone();
        let candidate = score(&a, &context(input, None), &weights);
        assert_eq!(delta(&candidate, ScoreDimension::Topics), 2.0);
    }

    #[test]
    fn over_budget_is_penalized() {
        let mut a = activity("a");
        a.estimated_cost_eur = 20.0;
        let candidate = score(
            &a,
            &context(SearchCriteriaInput::new(Age::years(4), 20), None),
            &ScoringWeights::default(),
        );
        assert_eq!(delta(&candidate, ScoreDimension::Budget), -2.0);
    }

    #[test]
    fn location_preference_prefers_exact_then_mixed() {
        let weights = ScoringWeights::default();
        assert_eq!(location_fit(Location::Indoor, Location::Indoor, &weights), 1.0);
        assert_eq!(location_fit(Location::Mixed, Location::Indoor, &weights), 0.5);
        assert_eq!(location_fit(Location::Outdoor, Location::Indoor, &weights), 0.0);
        assert_eq!(location_fit(Location::Outdoor, Location::Mixed, &weights), 0.0);
    }

    #[test]
    fn rank_order_breaks_ties_by_id() {
        let a = ScoredCandidate {
            activity_id: "b".to_string(),
            score: 1.0,
            reasons: vec![],
        };
        let b = ScoredCandidate {
            activity_id: "a".to_string(),
            score: 1.0,
            reasons: vec![],
        };
        let c = ScoredCandidate {
            activity_id: "c".to_string(),
            score: 2.0,
            reasons: vec![],
        };
        let mut all = vec![a, b, c];
        all.sort_by(rank_order);
        let ids: Vec<_> = all.iter().map(|c| c.activity_id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}
