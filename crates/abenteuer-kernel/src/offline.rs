use abenteuer_contracts::{
    normalize_token, Activity, ActivityPlan, Context, Location, PlanStep, PlanVariant, Provenance,
    VariantKind,
};

pub const SUPERVISION_NOTE_DE_EN: &str =
    "In Reichweite bleiben und aufmerksam begleiten. / Stay within reach and supervise attentively.";

const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("paper", "Abwischbare Fläche (Fenster/Tafel) statt Papier. / Use a wipeable surface instead of paper."),
    ("pens", "Mit dem Finger zeigen oder Gegenstände legen statt Stifte. / Point or lay out objects instead of pens."),
    ("tape", "Vorhandene Kanten und Linien statt Klebeband. / Use existing edges and lines instead of tape."),
    ("scissors", "Reißen oder sortieren statt schneiden. / Tear or sort instead of cutting."),
    ("bowls", "Becher oder kleine Dosen statt Schüsseln. / Use cups or small tins instead of bowls."),
    ("rice", "Trockene Nudeln oder Naturmaterial statt Reis. / Use dry pasta or natural items instead of rice."),
    ("flashlight", "Tageslicht und Schatten statt Taschenlampe. / Use daylight and shadows instead of a flashlight."),
    ("chalk", "Wasser und ein alter Pinsel statt Kreide. / Paint with water and an old brush instead of chalk."),
    ("cups", "Leere Joghurtbecher oder Bauklötze statt Becher. / Use empty yoghurt pots or blocks instead of cups."),
    ("blanket", "Ein großes Handtuch statt Decke. / Use a large towel instead of a blanket."),
    ("string", "Ein Schnürsenkel statt Schnur. / Use a shoelace instead of string."),
];

const GENERIC_SUBSTITUTION: &str =
    "Etwas Ähnliches aus dem Haushalt nehmen oder den Schritt weglassen. / Use something similar from home or skip the step.";

/// Substitution hint for a material the requester does not have.
pub fn substitution_for(material: &str) -> &'static str {
    let key = normalize_token(material);
    SUBSTITUTIONS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, text)| *text)
        .unwrap_or(GENERIC_SUBSTITUTION)
}

/// Plan built straight from a catalog activity, without any external call.
pub fn build_offline_plan(activity: &Activity, ctx: &Context) -> ActivityPlan {
    let minutes = ctx
        .available_minutes()
        .min(activity.duration_range.max_minutes);

    let steps = if activity.steps.is_empty() {
        generic_steps(minutes)
    } else {
        activity.steps.clone()
    };

    let mut safety_notes = activity.safety_notes.clone();
    safety_notes.push(SUPERVISION_NOTE_DE_EN.to_string());

    let summary = if activity.summary.trim().is_empty() {
        activity.title.clone()
    } else {
        activity.summary.clone()
    };

    ActivityPlan {
        activity_id: Some(activity.id.clone()),
        title: activity.title.clone(),
        summary,
        steps,
        safety_notes,
        variants: variants_for(activity, ctx),
        provenance: Provenance::Library,
    }
}

/// Child-led, timeboxed parent script for catalog entries without their own steps.
fn generic_steps(minutes: u32) -> Vec<PlanStep> {
    let warmup = (minutes / 6).max(2);
    let wrapup = (minutes / 6).max(2);
    let main = minutes.saturating_sub(warmup + wrapup).max(5);
    vec![
        PlanStep::new(
            format!("Ankommen ({warmup} Min): Beschreiben, was das Kind gerade tut. / Arrive ({warmup} min): describe what the child is doing."),
            Some("Du schaust dir das ganz genau an. / You are looking at that really closely."),
        ),
        PlanStep::new(
            format!("Spielen ({main} Min): Das Kind führt, du machst nach. / Play ({main} min): the child leads, you imitate."),
            Some("Ich mache es wie du! / I am doing it just like you!"),
        ),
        PlanStep::new(
            "Zwischendurch konkret loben und aktiv zuhören. / Along the way, praise specifically and listen actively.",
            Some("Du hast nicht aufgegeben. Erzähl mir mehr! / You kept trying. Tell me more!"),
        ),
        PlanStep::new(
            format!("Abschluss ({wrapup} Min): Gemeinsam aufräumen und das Schönste benennen. / Wrap up ({wrapup} min): tidy up together and name the best moment."),
            Some("Was war heute am lustigsten? / What was the most fun today?"),
        ),
    ]
}

fn variants_for(activity: &Activity, ctx: &Context) -> Vec<PlanVariant> {
    let mut variants = vec![
        PlanVariant::new(
            VariantKind::LowerEnergy,
            "Ruhiger: im Sitzen spielen und jede Runde langsamer machen. / Calmer: play seated and slow each round down.",
        ),
        PlanVariant::new(
            VariantKind::HigherEnergy,
            "Wilder: jede Runde mit Hüpfen oder Rennen zum Ziel verbinden. / Wilder: add hopping or a run to the finish each round.",
        ),
        PlanVariant::new(VariantKind::IndoorSwap, indoor_swap_text(activity.location)),
    ];

    let missing: Vec<&str> = activity
        .materials
        .optional
        .iter()
        .chain(activity.materials.required.iter())
        .filter(|m| !ctx.criteria().has_material(m))
        .map(|m| substitution_for(m))
        .collect();
    let no_materials = if missing.is_empty() {
        "Ohne Material: nur mit Händen, Stimme und dem, was im Raum ist. / No materials: just hands, voice and whatever is around.".to_string()
    } else {
        let mut unique: Vec<&str> = Vec::new();
        for text in missing {
            if !unique.contains(&text) {
                unique.push(text);
            }
        }
        unique.join(" ")
    };
    variants.push(PlanVariant::new(VariantKind::NoMaterials, no_materials));

    if ctx.available_minutes() < activity.duration_range.min_minutes {
        variants.push(PlanVariant::new(
            VariantKind::Shorter,
            format!(
                "Kurzfassung ({} Min): nur den ersten Schritt spielen. / Short version ({} min): play only the first step.",
                ctx.available_minutes(),
                ctx.available_minutes()
            ),
        ));
    }
    variants
}

fn indoor_swap_text(location: Location) -> &'static str {
    match location {
        Location::Indoor => "Drinnen bleibt alles gleich; Fensterplatz für Tageslicht wählen. / Already indoors; pick a spot by the window for daylight.",
        Location::Outdoor | Location::Mixed => "Drinnen: Flur oder Wohnzimmer freiräumen und die Idee dort spielen. / Indoors: clear the hallway or living room and play it there.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryStore;
    use crate::safety::{SafetyValidator, Verdict};
    use abenteuer_contracts::{Age, SafetyFlag, SearchCriteria, SearchCriteriaInput};
    use chrono::NaiveDate;

    fn context(input: SearchCriteriaInput) -> Context {
        let criteria = SearchCriteria::try_from(input).unwrap();
        Context::new(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(), criteria, None, None).unwrap()
    }

    #[test]
    fn offline_plan_keeps_catalog_steps_and_adds_supervision_note() {
        let store = LibraryStore::seed().unwrap();
        let activity = store.by_id("kissen-burg").unwrap();
        let plan = build_offline_plan(activity, &context(SearchCriteriaInput::new(Age::years(3), 30)));

        assert_eq!(plan.activity_id.as_deref(), Some("kissen-burg"));
        assert_eq!(plan.provenance, Provenance::Library);
        assert_eq!(plan.steps, activity.steps);
        assert_eq!(plan.safety_notes.last().map(String::as_str), Some(SUPERVISION_NOTE_DE_EN));
        assert!((3..=6).contains(&plan.variants.len()));
    }

    #[test]
    fn no_materials_variant_lists_substitutions() {
        let store = LibraryStore::seed().unwrap();
        let activity = store.by_id("schatten-theater").unwrap();
        let mut input = SearchCriteriaInput::new(Age::years(4), 30);
        input.materials = vec!["flashlight".into()];
        let plan = build_offline_plan(activity, &context(input));
        let no_materials = plan
            .variants
            .iter()
            .find(|v| v.kind == VariantKind::NoMaterials)
            .unwrap();
        assert!(no_materials.text.contains("Handtuch"));
    }

    #[test]
    fn shorter_variant_appears_when_time_is_tight() {
        let store = LibraryStore::seed().unwrap();
        let activity = store.by_id("kissen-burg").unwrap();
        let plan = build_offline_plan(activity, &context(SearchCriteriaInput::new(Age::years(3), 10)));
        assert!(plan.variants.iter().any(|v| v.kind == VariantKind::Shorter));
        assert!(plan.variants.len() <= 6);
    }

    #[test]
    fn generic_steps_are_timeboxed() {
        let steps = generic_steps(30);
        assert_eq!(steps.len(), 4);
        assert!(steps[0].action.contains("5 Min"));
        assert!(steps[1].action.contains("20 Min"));
    }

    #[test]
    fn unknown_material_gets_generic_substitution() {
        assert_eq!(substitution_for("Glitzer"), GENERIC_SUBSTITUTION);
        assert!(substitution_for(" Paper ").contains("Papier"));
    }

    #[test]
    fn seed_offline_plans_pass_safety_within_their_age_range() {
        let store = LibraryStore::seed().unwrap();
        let validator = SafetyValidator::default();
        for activity in store.all() {
            let mut input = SearchCriteriaInput::new(Age::months(activity.age_range.min_months), 30);
            input.materials = activity.materials.required.clone();
            let plan = build_offline_plan(activity, &context(input));
            let verdict = validator.evaluate(&plan, activity.age_range.min_months, &activity.safety_flags);
            assert_eq!(verdict, Verdict::Approved, "{}", activity.id);
        }
    }

    #[test]
    fn small_parts_activity_is_vetoed_for_toddlers() {
        let store = LibraryStore::seed().unwrap();
        let activity = store.by_id("perlen-kette").unwrap();
        assert!(activity.has_flag(SafetyFlag::SmallParts));
        let plan = build_offline_plan(activity, &context(SearchCriteriaInput::new(Age::years(2), 30)));
        let verdict = SafetyValidator::default().evaluate(&plan, 24, &activity.safety_flags);
        assert_eq!(verdict, Verdict::Rejected { rule: "small_parts" });
    }
}
