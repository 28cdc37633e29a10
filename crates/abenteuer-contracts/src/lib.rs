use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const API_VERSION: &str = "1.0.0";

pub const TOPICS_MAX_ITEMS: usize = 8;
pub const AVAILABLE_MINUTES_MAX: u32 = 600;
pub const BUDGET_EUR_MAX: f64 = 250.0;
pub const DEFAULT_BUDGET_EUR: f64 = 15.0;

#[derive(Debug, Clone)]
pub struct ContractSchemaManifest {
    pub path: &'static str,
    pub sha256: &'static str,
    pub body: &'static str,
}

#[derive(Debug, Clone)]
pub struct ContractsManifest {
    pub contracts_set_sha256: &'static str,
    pub generated_at: &'static str,
    pub schemas: Vec<ContractSchemaManifest>,
}

include!(concat!(env!("OUT_DIR"), "/generated_contracts.rs"));

pub fn contracts_manifest_v1() -> ContractsManifest {
    ContractsManifest {
        contracts_set_sha256: GENERATED_CONTRACTS_SET_SHA256,
        generated_at: GENERATED_AT_RFC3339,
        schemas: GENERATED_CONTRACT_SCHEMAS
            .iter()
            .map(|(path, sha256, body)| ContractSchemaManifest { path, sha256, body })
            .collect(),
    }
}

/// Returns the embedded schema body whose path ends with `file_name`.
pub fn contract_schema(file_name: &str) -> Option<&'static str> {
    GENERATED_CONTRACT_SCHEMAS
        .iter()
        .find(|(path, _, _)| path.ends_with(file_name))
        .map(|(_, _, body)| *body)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    /// Meteorological seasons, northern hemisphere.
    pub fn for_date(date: NaiveDate) -> Self {
        match date.month() {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Sunny,
    Cloudy,
    Rainy,
    Stormy,
    Snowy,
    Foggy,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WeatherTag {
    Sunny,
    Cloudy,
    Rainy,
    Stormy,
    Snowy,
    Foggy,
    Windy,
    Hot,
    Cold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Challenging,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SafetyFlag {
    SmallParts,
    Scissors,
    SharpTools,
    Heat,
    Chemicals,
    Water,
    Traffic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Calm,
    Wild,
    Creative,
    Curious,
    Social,
    Focused,
    Relaxing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Indoor,
    Outdoor,
    Mixed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AgeRange {
    pub min_months: u32,
    pub max_months: u32,
}

impl AgeRange {
    pub fn contains(&self, months: u32) -> bool {
        self.min_months <= months && months <= self.max_months
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DurationRange {
    pub min_minutes: u32,
    pub max_minutes: u32,
}

impl DurationRange {
    /// Minutes by which `minutes` falls outside the range; 0 when inside.
    pub fn mismatch(&self, minutes: u32) -> u32 {
        if minutes < self.min_minutes {
            self.min_minutes - minutes
        } else if minutes > self.max_minutes {
            minutes - self.max_minutes
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Materials {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

/// A single Say/Do instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlanStep {
    #[serde(rename = "do")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub say: Option<String>,
}

impl PlanStep {
    pub fn new(action: impl Into<String>, say: Option<&str>) -> Self {
        Self {
            action: action.into(),
            say: say.map(str::to_string),
        }
    }
}

/// Catalog record. Loaded once, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Activity {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub season_tags: Vec<Season>,
    #[serde(default)]
    pub weather_tags: Vec<WeatherTag>,
    pub energy_level: EnergyLevel,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub safety_flags: Vec<SafetyFlag>,
    pub age_range: AgeRange,
    pub duration_range: DurationRange,
    #[serde(default)]
    pub materials: Materials,
    #[serde(default)]
    pub mood_tags: Vec<Mood>,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    pub location: Location,
    #[serde(default)]
    pub estimated_cost_eur: f64,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
}

impl Activity {
    pub fn has_flag(&self, flag: SafetyFlag) -> bool {
        self.safety_flags.contains(&flag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WeatherSummary {
    pub condition: WeatherCondition,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub precipitation_probability: Option<u8>,
    #[serde(default)]
    pub wind_speed_max_kmh: Option<f64>,
    pub precipitation: bool,
    #[serde(default)]
    pub source: Option<String>,
}

impl WeatherSummary {
    pub fn new(
        condition: WeatherCondition,
        temperature_c: Option<f64>,
        precipitation_probability: Option<u8>,
    ) -> Self {
        let precipitation = precipitation_probability.is_some_and(|p| p >= 40)
            || matches!(
                condition,
                WeatherCondition::Rainy | WeatherCondition::Stormy | WeatherCondition::Snowy
            );
        Self {
            condition,
            temperature_c,
            precipitation_probability,
            wind_speed_max_kmh: None,
            precipitation,
            source: None,
        }
    }

    pub fn with_wind(mut self, wind_speed_max_kmh: Option<f64>) -> Self {
        self.wind_speed_max_kmh = wind_speed_max_kmh;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Tags an activity's weather affinity can be matched against.
    pub fn tags(&self) -> Vec<WeatherTag> {
        let mut tags = Vec::new();
        match self.condition {
            WeatherCondition::Sunny => tags.push(WeatherTag::Sunny),
            WeatherCondition::Cloudy => tags.push(WeatherTag::Cloudy),
            WeatherCondition::Rainy => tags.push(WeatherTag::Rainy),
            WeatherCondition::Stormy => tags.push(WeatherTag::Stormy),
            WeatherCondition::Snowy => tags.push(WeatherTag::Snowy),
            WeatherCondition::Foggy => tags.push(WeatherTag::Foggy),
            WeatherCondition::Unknown => {}
        }
        if self.precipitation && !tags.contains(&WeatherTag::Rainy) {
            tags.push(WeatherTag::Rainy);
        }
        if self.wind_speed_max_kmh.is_some_and(|w| w >= 25.0) {
            tags.push(WeatherTag::Windy);
        }
        match self.temperature_c {
            Some(t) if t >= 27.0 => tags.push(WeatherTag::Hot),
            Some(t) if t <= 5.0 => tags.push(WeatherTag::Cold),
            _ => {}
        }
        tags
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgeUnit {
    Months,
    Years,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Age {
    pub value: u32,
    pub unit: AgeUnit,
}

impl Age {
    pub fn years(value: u32) -> Self {
        Self {
            value,
            unit: AgeUnit::Years,
        }
    }

    pub fn months(value: u32) -> Self {
        Self {
            value,
            unit: AgeUnit::Months,
        }
    }

    pub fn in_months(&self) -> u32 {
        match self.unit {
            AgeUnit::Months => self.value,
            AgeUnit::Years => self.value.saturating_mul(12),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CriteriaError {
    #[error("age must be between 0 and 18 years")]
    AgeOutOfRange,
    #[error("available_minutes must be between 1 and {AVAILABLE_MINUTES_MAX}")]
    AvailableMinutes,
    #[error("budget_eur_max must be between 0 and {BUDGET_EUR_MAX}")]
    Budget,
    #[error("topics supports at most {TOPICS_MAX_ITEMS} entries")]
    TooManyTopics,
    #[error("time_window.end must be after time_window.start")]
    TimeWindowOrder,
}

/// Raw, loosely validated criteria as they arrive on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchCriteriaInput {
    pub age: Age,
    pub available_minutes: u32,
    #[serde(default = "default_location_preference")]
    pub location_preference: Location,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_budget")]
    pub budget_eur_max: f64,
    #[serde(default)]
    pub effort: Option<EnergyLevel>,
    #[serde(default)]
    pub excluded_safety_flags: Vec<SafetyFlag>,
    #[serde(default)]
    pub strict_age: bool,
}

fn default_location_preference() -> Location {
    Location::Mixed
}

fn default_budget() -> f64 {
    DEFAULT_BUDGET_EUR
}

impl SearchCriteriaInput {
    pub fn new(age: Age, available_minutes: u32) -> Self {
        Self {
            age,
            available_minutes,
            location_preference: default_location_preference(),
            materials: Vec::new(),
            mood: None,
            topics: Vec::new(),
            budget_eur_max: default_budget(),
            effort: None,
            excluded_safety_flags: Vec::new(),
            strict_age: false,
        }
    }
}

/// Validated requester criteria. Only constructible through [`SearchCriteriaInput`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "SearchCriteriaInput")]
pub struct SearchCriteria {
    age: Age,
    available_minutes: u32,
    location_preference: Location,
    materials: Vec<String>,
    mood: Option<Mood>,
    topics: Vec<String>,
    budget_eur_max: f64,
    effort: Option<EnergyLevel>,
    excluded_safety_flags: Vec<SafetyFlag>,
    strict_age: bool,
}

impl TryFrom<SearchCriteriaInput> for SearchCriteria {
    type Error = CriteriaError;

    fn try_from(input: SearchCriteriaInput) -> Result<Self, Self::Error> {
        if input.age.in_months() > 18 * 12 {
            return Err(CriteriaError::AgeOutOfRange);
        }
        if input.available_minutes == 0 || input.available_minutes > AVAILABLE_MINUTES_MAX {
            return Err(CriteriaError::AvailableMinutes);
        }
        if !(0.0..=BUDGET_EUR_MAX).contains(&input.budget_eur_max) {
            return Err(CriteriaError::Budget);
        }
        let topics = normalize_tokens(&input.topics);
        if topics.len() > TOPICS_MAX_ITEMS {
            return Err(CriteriaError::TooManyTopics);
        }
        let mut excluded_safety_flags = input.excluded_safety_flags;
        excluded_safety_flags.sort();
        excluded_safety_flags.dedup();

        Ok(Self {
            age: input.age,
            available_minutes: input.available_minutes,
            location_preference: input.location_preference,
            materials: normalize_tokens(&input.materials),
            mood: input.mood,
            topics,
            budget_eur_max: input.budget_eur_max,
            effort: input.effort,
            excluded_safety_flags,
            strict_age: input.strict_age,
        })
    }
}

impl SearchCriteria {
    pub fn age(&self) -> Age {
        self.age
    }

    pub fn age_months(&self) -> u32 {
        self.age.in_months()
    }

    pub fn available_minutes(&self) -> u32 {
        self.available_minutes
    }

    pub fn location_preference(&self) -> Location {
        self.location_preference
    }

    pub fn materials(&self) -> &[String] {
        &self.materials
    }

    pub fn has_material(&self, material: &str) -> bool {
        let wanted = normalize_token(material);
        self.materials.iter().any(|m| *m == wanted)
    }

    pub fn mood(&self) -> Option<Mood> {
        self.mood
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn budget_eur_max(&self) -> f64 {
        self.budget_eur_max
    }

    pub fn effort(&self) -> Option<EnergyLevel> {
        self.effort
    }

    pub fn excluded_safety_flags(&self) -> &[SafetyFlag] {
        &self.excluded_safety_flags
    }

    pub fn strict_age(&self) -> bool {
        self.strict_age
    }

    /// Stable string used to seed per-day selection.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{:?}|{}|{:?}|{}|{:.2}|{:?}|{}",
            self.age.in_months(),
            self.available_minutes,
            self.location_preference,
            self.materials.join(","),
            self.mood,
            self.topics.join(","),
            self.budget_eur_max,
            self.effort,
            self.strict_age
        )
    }
}

pub fn normalize_token(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalize_tokens(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let token = normalize_token(value);
        if token.is_empty() || out.contains(&token) {
            continue;
        }
        out.push(token);
    }
    out
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn span_minutes(&self) -> u32 {
        (self.end - self.start).num_minutes().max(0) as u32
    }
}

/// Per-request situational input. Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Context {
    date: NaiveDate,
    weather: Option<WeatherSummary>,
    criteria: SearchCriteria,
    time_window: Option<TimeWindow>,
}

impl Context {
    pub fn new(
        date: NaiveDate,
        criteria: SearchCriteria,
        time_window: Option<TimeWindow>,
        weather: Option<WeatherSummary>,
    ) -> Result<Self, CriteriaError> {
        if let Some(window) = &time_window {
            if window.end <= window.start {
                return Err(CriteriaError::TimeWindowOrder);
            }
        }
        Ok(Self {
            date,
            weather,
            criteria,
            time_window,
        })
    }

    /// Same request, with the weather snapshot replaced.
    pub fn with_weather(self, weather: Option<WeatherSummary>) -> Self {
        Self { weather, ..self }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn season(&self) -> Season {
        Season::for_date(self.date)
    }

    pub fn weather(&self) -> Option<&WeatherSummary> {
        self.weather.as_ref()
    }

    pub fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    pub fn available_minutes(&self) -> u32 {
        match &self.time_window {
            Some(window) => self.criteria.available_minutes.min(window.span_minutes()),
            None => self.criteria.available_minutes,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDimension {
    Age,
    Duration,
    Season,
    Weather,
    Location,
    Materials,
    Mood,
    Topics,
    Effort,
    Budget,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreReason {
    pub dimension: ScoreDimension,
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub activity_id: String,
    pub score: f64,
    pub reasons: Vec<ScoreReason>,
}

impl ScoredCandidate {
    pub fn is_excluded(&self) -> bool {
        self.score == f64::NEG_INFINITY
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Library,
    Generated,
    Fallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    LowerEnergy,
    HigherEnergy,
    IndoorSwap,
    NoMaterials,
    Shorter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlanVariant {
    pub kind: VariantKind,
    pub text: String,
}

impl PlanVariant {
    pub fn new(kind: VariantKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

pub const PLAN_VARIANTS_MIN: usize = 3;
pub const PLAN_VARIANTS_MAX: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ActivityPlan {
    #[serde(default)]
    pub activity_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub steps: Vec<PlanStep>,
    pub safety_notes: Vec<String>,
    pub variants: Vec<PlanVariant>,
    pub provenance: Provenance,
}

impl ActivityPlan {
    /// Every free-text field of the plan joined into one block.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.title, &self.summary];
        for step in &self.steps {
            parts.push(&step.action);
            if let Some(say) = &step.say {
                parts.push(say);
            }
        }
        parts.extend(self.safety_notes.iter().map(String::as_str));
        parts.extend(self.variants.iter().map(|v| v.text.as_str()));
        parts.join("\n")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Unsafe,
    NotRelevant,
    FactuallyWrong,
    Other,
}

impl ReportReason {
    pub fn label_de_en(&self) -> &'static str {
        match self {
            ReportReason::Unsafe => "Unsicher / Unsafe",
            ReportReason::NotRelevant => "Unpassend / Not relevant",
            ReportReason::FactuallyWrong => "Faktisch falsch / Factually wrong",
            ReportReason::Other => "Sonstiges / Other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlanReport {
    pub timestamp_utc: String,
    pub plan_hash: String,
    pub reason: ReportReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Notice {
    pub code: String,
    pub message_de_en: String,
}

impl Notice {
    pub fn new(code: &str, message_de_en: &str) -> Self {
        Self {
            code: code.to_string(),
            message_de_en: message_de_en.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}
