//! Rule-based veto over plans before they leave the kernel.
//!
//! Rules run in a fixed order and the first blocking match wins. A rejected plan is
//! replaced by [`fallback_plan`]; callers only ever see an [`ApprovedPlan`].

use abenteuer_contracts::{
    ActivityPlan, PlanStep, PlanVariant, Provenance, SafetyFlag, VariantKind,
};
use serde::Serialize;

/// How a term is looked up in lower-cased, punctuation-free plan text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    /// Anywhere inside a word, so compounds like "obstmesser" match "messer".
    Stem(&'static str),
    /// Start of a word or phrase ("scissor" matches "scissors").
    Prefix(&'static str),
    /// Exact word or phrase.
    Word(&'static str),
}

use Term::{Prefix, Stem, Word};

const SMALL_PARTS: &[Term] = &[
    Prefix("bead"),
    Stem("perle"),
    Stem("murmel"),
    Prefix("marble"),
    Stem("knopfzelle"),
    Prefix("button batter"),
    Prefix("button cell"),
    Stem("kleinteil"),
    Prefix("small part"),
    Prefix("small piece"),
    Stem("magnet"),
    Stem("münze"),
    Prefix("coin"),
];

const SMALL_PARTS_HARMLESS: &[&str] = &["murmeltier"];

const SHARP_TOOLS: &[Term] = &[
    Prefix("knife"),
    Prefix("knives"),
    Stem("messer"),
    Prefix("cutter"),
    Prefix("schnitzen"),
    Word("schnitze"),
    Word("schnitzt"),
    Prefix("whittl"),
    Stem("säge"),
    Word("saw"),
    Word("saws"),
    Prefix("handsaw"),
    Prefix("scalpel"),
    Stem("skalpell"),
    Prefix("razor"),
    Stem("rasierklinge"),
    Word("klinge"),
    Word("axe"),
    Word("axt"),
    Word("äxte"),
    Word("beil"),
    Stem("handbeil"),
];

const SHARP_TOOLS_HARMLESS: &[&str] = &[
    "durchmesser",
    "regenmesser",
    "windmesser",
    "höhenmesser",
    "zeitmesser",
    "entfernungsmesser",
    "sägespän",
    "sägemehl",
];

const SCISSORS: &[Term] = &[Prefix("scissor"), Stem("schere")];

const SCISSORS_HARMLESS: &[&str] = &["schererei", "bescher"];

const CHILD_SAFE_SCISSORS: &[Term] = &[
    Stem("kinderschere"),
    Prefix("child safe scissor"),
    Prefix("childsafe scissor"),
    Prefix("safety scissor"),
    Prefix("kindersichere schere"),
    Stem("sicherheitsschere"),
];

const SUPERVISION: &[Term] = &[
    Prefix("unter aufsicht"),
    Prefix("mit aufsicht"),
    Prefix("beaufsichtigt"),
    Prefix("under supervision"),
    Prefix("with supervision"),
    Prefix("adult supervision"),
    Prefix("supervised"),
];

const FIRE: &[Term] = &[
    Word("fire"),
    Word("fires"),
    Prefix("campfire"),
    Prefix("bonfire"),
    Prefix("fireplace"),
    Prefix("firework"),
    Prefix("flame"),
    Prefix("candle"),
    Prefix("stove"),
    Word("oven"),
    Word("ovens"),
    Word("grill"),
    Word("grills"),
    Prefix("matchstick"),
    Word("cigarette lighter"),
    Word("with a lighter"),
    Word("use a lighter"),
    Word("using a lighter"),
    Prefix("lighter fluid"),
    Stem("feuer"),
    Stem("flamme"),
    Stem("kerze"),
    Stem("teelicht"),
    Stem("fackel"),
    Stem("herdplatte"),
    Stem("gasherd"),
    Stem("küchenherd"),
    Stem("backofen"),
    Word("ofen"),
    Stem("grillkohle"),
    Stem("grillanzünder"),
    Stem("grillrost"),
    Stem("holzkohlegrill"),
    Stem("streichholz"),
    Stem("streichhölz"),
    Stem("heißkleber"),
    Stem("heisskleber"),
    Prefix("glue gun"),
    Stem("bügeleisen"),
];

const FIRE_HARMLESS: &[&str] = &[
    "feuerwehr",
    "feuersalamander",
    "feuerwanze",
    "feuerqualle",
    "feuerdorn",
    "feuerrot",
    "feuerfest",
    "kerzengerade",
    "fire engine",
    "fire engines",
    "fire truck",
    "fire trucks",
    "fire station",
    "fire brigade",
];

const ADULT_ONLY: &[Term] = &[
    Prefix("nur erwachsene"),
    Prefix("nur durch erwachsene"),
    Prefix("nur von erwachsenen"),
    Prefix("adults only"),
    Prefix("adult only"),
    Prefix("only adults"),
];

const CHEMICALS: &[Term] = &[
    Prefix("bleach"),
    Stem("bleichmittel"),
    Prefix("solvent"),
    Stem("lösungsmittel"),
    Prefix("detergent pod"),
    Stem("waschmittel"),
    Stem("spülmaschinentab"),
    Word("chlor"),
    Prefix("chlorine"),
    Stem("chlorreiniger"),
    Stem("chlortablette"),
    Prefix("ammonia"),
    Stem("ammoniak"),
    Word("lye"),
    Stem("natronlauge"),
    Stem("abflussreiniger"),
    Prefix("drain cleaner"),
    Stem("essigessenz"),
    Stem("aceton"),
    Stem("nagellackentferner"),
    Prefix("paint thinner"),
    Stem("verdünner"),
    Prefix("pesticide"),
    Stem("pestizid"),
    Prefix("dry ice"),
    Stem("trockeneis"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Block,
    /// Allowed only when every qualifier group has at least one hit in the text.
    RequireContext(&'static [&'static [Term]]),
}

#[derive(Debug, Clone, Copy)]
pub struct SafetyRule {
    pub id: &'static str,
    /// The rule applies only when the requester is younger than this many months.
    pub below_age_months: Option<u32>,
    pub flags: &'static [SafetyFlag],
    pub terms: &'static [Term],
    /// Words (or phrases, when they contain a space) ignored before `terms` are looked up.
    pub harmless: &'static [&'static str],
    pub action: RuleAction,
}

pub const RULES: &[SafetyRule] = &[
    SafetyRule {
        id: "small_parts",
        below_age_months: Some(36),
        flags: &[SafetyFlag::SmallParts],
        terms: SMALL_PARTS,
        harmless: SMALL_PARTS_HARMLESS,
        action: RuleAction::Block,
    },
    SafetyRule {
        id: "sharp_tools",
        below_age_months: None,
        flags: &[SafetyFlag::SharpTools],
        terms: SHARP_TOOLS,
        harmless: SHARP_TOOLS_HARMLESS,
        action: RuleAction::Block,
    },
    SafetyRule {
        id: "scissors",
        below_age_months: Some(72),
        flags: &[SafetyFlag::Scissors],
        terms: SCISSORS,
        harmless: SCISSORS_HARMLESS,
        action: RuleAction::RequireContext(&[CHILD_SAFE_SCISSORS, SUPERVISION]),
    },
    SafetyRule {
        id: "heat_flag",
        below_age_months: None,
        flags: &[SafetyFlag::Heat],
        terms: &[],
        harmless: &[],
        action: RuleAction::Block,
    },
    SafetyRule {
        id: "fire",
        below_age_months: None,
        flags: &[],
        terms: FIRE,
        harmless: FIRE_HARMLESS,
        action: RuleAction::RequireContext(&[ADULT_ONLY]),
    },
    SafetyRule {
        id: "chemicals",
        below_age_months: None,
        flags: &[SafetyFlag::Chemicals],
        terms: CHEMICALS,
        harmless: &[],
        action: RuleAction::Block,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected { rule: &'static str },
}

/// A plan that passed every rule. Only [`SafetyValidator`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ApprovedPlan(ActivityPlan);

impl ApprovedPlan {
    pub fn plan(&self) -> &ActivityPlan {
        &self.0
    }

    pub fn into_inner(self) -> ActivityPlan {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SafetyValidator {
    rules: &'static [SafetyRule],
}

impl Default for SafetyValidator {
    fn default() -> Self {
        Self { rules: RULES }
    }
}

impl SafetyValidator {
    pub fn rules(&self) -> &'static [SafetyRule] {
        self.rules
    }

    pub fn evaluate(&self, plan: &ActivityPlan, age_months: u32, flags: &[SafetyFlag]) -> Verdict {
        let text = normalize_text(&plan.text());
        for rule in self.rules {
            if rule.below_age_months.is_some_and(|limit| age_months >= limit) {
                continue;
            }
            let scrubbed = without_harmless(&text, rule.harmless);
            let triggered = rule.flags.iter().any(|f| flags.contains(f))
                || rule.terms.iter().any(|term| mentions(&scrubbed, *term));
            if !triggered {
                continue;
            }
            let blocked = match rule.action {
                RuleAction::Block => true,
                RuleAction::RequireContext(groups) => !groups
                    .iter()
                    .all(|group| group.iter().any(|q| mentions(&text, *q))),
            };
            if blocked {
                return Verdict::Rejected { rule: rule.id };
            }
        }
        Verdict::Approved
    }

    /// Approves the plan unchanged or substitutes the fallback plan.
    pub fn validate(
        &self,
        plan: ActivityPlan,
        age_months: u32,
        flags: &[SafetyFlag],
    ) -> (ApprovedPlan, Verdict) {
        let verdict = self.evaluate(&plan, age_months, flags);
        match verdict {
            Verdict::Approved => (ApprovedPlan(plan), verdict),
            Verdict::Rejected { rule } => {
                tracing::info!(rule, "plan rejected by safety rule; using fallback");
                (ApprovedPlan(fallback_plan()), verdict)
            }
        }
    }
}

/// Static plan that passes every rule at every age.
pub fn fallback_plan() -> ActivityPlan {
    ActivityPlan {
        activity_id: None,
        title: "Sicherer Ersatzplan: Bewegungs- und Wahrnehmungsrunde / Safe fallback plan: movement and senses".to_string(),
        summary: "Eine kurze, materialfreie Runde zum Bewegen, Hinschauen und Zuhören. / A short, material-free round of moving, looking and listening.".to_string(),
        steps: vec![
            PlanStep::new(
                "Gemeinsam drei Dinge in einer Farbe suchen und benennen. / Find and name three things of one colour together.",
                Some("Was siehst du, das blau ist? / What can you see that is blue?"),
            ),
            PlanStep::new(
                "Das Kind macht eine Bewegung vor, du machst sie nach. / The child shows a movement, you copy it.",
                Some("Ich mache es genauso wie du! / I am doing it just like you!"),
            ),
            PlanStep::new(
                "Eine Minute still sitzen und Geräusche zählen. / Sit still for one minute and count the sounds.",
                Some("Du hast ganz genau zugehört. / You listened really carefully."),
            ),
        ],
        safety_notes: vec![
            "In Reichweite bleiben und aufmerksam begleiten. / Stay within reach and supervise attentively.".to_string(),
        ],
        variants: vec![
            PlanVariant::new(
                VariantKind::LowerEnergy,
                "Im Sitzen spielen: nur Farben suchen. / Play seated: only look for colours.",
            ),
            PlanVariant::new(
                VariantKind::HigherEnergy,
                "Jede gefundene Farbe wird mit fünf Hüpfern gefeiert. / Celebrate each colour with five hops.",
            ),
            PlanVariant::new(
                VariantKind::Shorter,
                "Nur die Farbsuche, fünf Minuten lang. / Only the colour hunt, for five minutes.",
            ),
        ],
        provenance: Provenance::Fallback,
    }
}

/// Lower-cased words separated by single spaces, padded on both ends.
fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut out = String::with_capacity(cleaned.len() + 2);
    out.push(' ');
    for word in cleaned.split_whitespace() {
        out.push_str(word);
        out.push(' ');
    }
    out
}

/// Drops harmless words and phrases from normalized text, keeping the padding.
fn without_harmless(normalized: &str, harmless: &[&str]) -> String {
    let mut text = normalized.to_string();
    for phrase in harmless.iter().filter(|h| h.contains(' ')) {
        let needle = format!(" {phrase} ");
        while text.contains(&needle) {
            text = text.replace(&needle, " ");
        }
    }
    let mut out = String::from(" ");
    for word in text
        .split_whitespace()
        .filter(|word| !harmless.iter().any(|h| !h.contains(' ') && word.contains(h)))
    {
        out.push_str(word);
        out.push(' ');
    }
    out
}

fn mentions(normalized: &str, term: Term) -> bool {
    match term {
        Term::Stem(stem) => normalized.split_whitespace().any(|word| word.contains(stem)),
        Term::Prefix(prefix) => normalized.contains(&format!(" {prefix}")),
        Term::Word(word) => normalized.contains(&format!(" {word} ")),
    }
}
