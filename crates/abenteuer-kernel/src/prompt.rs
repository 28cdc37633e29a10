use std::fmt::Write as _;

use abenteuer_contracts::{Activity, Context};

pub const SYSTEM_PROMPT: &str = "You write short, safe micro-adventure plans for a caregiver and a small child. \
Keep the child in the lead, timebox every step, and use Say/Do pairs in German and English (\"DE / EN\"). \
Never suggest knives, fire, chemicals or small parts for toddlers. \
Return one JSON object with exactly the keys title, summary, steps (objects with \"do\" and optional \"say\"), \
safety_notes and variants (3 to 6 objects with kind in lower_energy, higher_energy, indoor_swap, no_materials, shorter, and text).";

pub const TRUNCATED_NOTICE_DE_EN: &str = "Hinweis: Eingabe wurde gekürzt, um das Sicherheitslimit einzuhalten. / Notice: input was truncated to enforce the safety limit.";

/// Cuts `text` to at most `max_chars` characters. The flag reports whether anything was cut.
pub fn truncate(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (text[..byte_index].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// User prompt seeding the generator with the chosen catalog activity. Not yet redacted.
pub fn build_prompt(activity: &Activity, ctx: &Context, notes: Option<&str>) -> String {
    let criteria = ctx.criteria();
    let mut out = String::new();

    let _ = writeln!(out, "Plane ein Mikroabenteuer. / Plan a micro-adventure.");
    let _ = writeln!(out);
    let _ = writeln!(out, "Idee / Idea: {}", activity.title);
    if !activity.summary.is_empty() {
        let _ = writeln!(out, "Kurz / Summary: {}", activity.summary);
    }
    let _ = writeln!(
        out,
        "Ort / Location: {}",
        serde_json::to_string(&activity.location).unwrap_or_default()
    );
    if !activity.materials.required.is_empty() {
        let _ = writeln!(out, "Material: {}", activity.materials.required.join(", "));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Kriterien / Criteria:");
    let _ = writeln!(out, "- Alter / Age: {} Monate / months", criteria.age_months());
    let _ = writeln!(out, "- Zeit / Time: {} Minuten / minutes", ctx.available_minutes());
    let _ = writeln!(out, "- Datum / Date: {}", ctx.date());
    if !criteria.materials().is_empty() {
        let _ = writeln!(out, "- Vorhanden / Available: {}", criteria.materials().join(", "));
    }
    if let Some(mood) = criteria.mood() {
        let _ = writeln!(out, "- Stimmung / Mood: {}", serde_json::to_string(&mood).unwrap_or_default());
    }
    if !criteria.topics().is_empty() {
        let _ = writeln!(out, "- Themen / Topics: {}", criteria.topics().join(", "));
    }
    let _ = writeln!(out, "- Budget: <= {:.2} EUR", criteria.budget_eur_max());

    match ctx.weather() {
        Some(weather) => {
            let _ = writeln!(
                out,
                "Wetterlage / Weather: {}",
                serde_json::to_string(weather).unwrap_or_default()
            );
        }
        None => {
            let _ = writeln!(out, "Wetterlage / Weather: unknown");
        }
    }

    if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "Notizen / Notes: {notes}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryStore;
    use abenteuer_contracts::{Age, SearchCriteria, SearchCriteriaInput, WeatherCondition, WeatherSummary};
    use chrono::NaiveDate;

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("Blätter", 3), ("Blä".to_string(), true));
        assert_eq!(truncate("kurz", 10), ("kurz".to_string(), false));
        assert_eq!(truncate("genau", 5), ("genau".to_string(), false));
    }

    #[test]
    fn prompt_carries_activity_criteria_weather_and_notes() {
        let store = LibraryStore::seed().unwrap();
        let activity = store.by_id("wolken-gucken").unwrap();
        let mut input = SearchCriteriaInput::new(Age::years(4), 20);
        input.topics = vec!["Natur".into()];
        let criteria = SearchCriteria::try_from(input).unwrap();
        let weather = WeatherSummary::new(WeatherCondition::Cloudy, Some(17.0), Some(10));
        let ctx = Context::new(
            NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
            criteria,
            None,
            Some(weather),
        )
        .unwrap();

        let prompt = build_prompt(activity, &ctx, Some("  mag Vögel  "));
        assert!(prompt.contains(&activity.title));
        assert!(prompt.contains("48 Monate"));
        assert!(prompt.contains("20 Minuten"));
        assert!(prompt.contains("natur"));
        assert!(prompt.contains("\"cloudy\""));
        assert!(prompt.contains("Notizen / Notes: mag Vögel"));
    }

    #[test]
    fn missing_weather_is_marked_unknown() {
        let store = LibraryStore::seed().unwrap();
        let activity = store.by_id("tier-yoga").unwrap();
        let criteria = SearchCriteria::try_from(SearchCriteriaInput::new(Age::years(3), 15)).unwrap();
        let ctx = Context::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(), criteria, None, None).unwrap();
        let prompt = build_prompt(activity, &ctx, None);
        assert!(prompt.contains("Weather: unknown"));
        assert!(!prompt.contains("Notes"));
    }
}
