use regex::Regex;

const EMAIL: &str = r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}";
const PHONE: &str = r"(?:\+\d{1,3}|\(0\d{1,4}\)|\b0)(?:[\s\-./]?\d){6,}\b";
const NAME_PLACEHOLDER: &str = "[NAME]";
const STREET_DE: &str = r"\b[A-ZÄÖÜ][\wäöüß\-]*(?:straße|strasse|str\.|weg|allee|platz|gasse|ring|damm|ufer)\s+\d+[a-zA-Z]?\b";
const STREET_EN: &str = r"\b\d+\s+(?:[A-Z][a-z]+\s+)+(?:Street|St\.|Road|Rd\.|Avenue|Ave\.|Lane|Way)";
const NAME_INTRO: &str = r"((?i:my\s+name\s+is|mein\s+name\s+ist|ich\s+hei(?:ß|ss)e)\s+)([A-ZÄÖÜ][a-zäöüß]+(?:\s+[A-ZÄÖÜ][a-zäöüß]+){0,2})";

/// Masks personal data in outbound text.
#[derive(Debug, Clone)]
pub struct Redactor {
    email: Regex,
    phone: Regex,
    street_de: Regex,
    street_en: Regex,
    name_intro: Regex,
    family_names: Option<Regex>,
}

impl Redactor {
    pub fn new(family_names: &[String]) -> Result<Self, regex::Error> {
        let names: Vec<String> = family_names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(regex::escape)
            .collect();
        let family_names = if names.is_empty() {
            None
        } else {
            // The bracketed form goes first so "[Carla]" is masked whole.
            let alternatives = names.join("|");
            Some(Regex::new(&format!(
                r"\[(?i:{alternatives})\]|(?i:\b(?:{alternatives})\b)"
            ))?)
        };

        Ok(Self {
            email: Regex::new(EMAIL)?,
            phone: Regex::new(PHONE)?,
            street_de: Regex::new(STREET_DE)?,
            street_en: Regex::new(STREET_EN)?,
            name_intro: Regex::new(NAME_INTRO)?,
            family_names,
        })
    }

    /// Idempotent: `redact(redact(t)) == redact(t)`.
    pub fn redact(&self, text: &str) -> String {
        let out = self.email.replace_all(text, "[EMAIL]");
        let out = self.phone.replace_all(&out, "[PHONE]");
        let out = self.street_de.replace_all(&out, "[ADDRESS]");
        let out = self.street_en.replace_all(&out, "[ADDRESS]");
        let out = self.name_intro.replace_all(&out, "${1}[NAME]");
        match &self.family_names {
            Some(names) => names.replace_all(&out, NAME_PLACEHOLDER).into_owned(),
            None => out.into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor() -> Redactor {
        Redactor::new(&["Carla".to_string()]).unwrap()
    }

    #[test]
    fn masks_email_and_phone() {
        let out = redactor().redact("Schreib an mama.test@example.org oder ruf +49 211 1234567 an.");
        assert_eq!(out, "Schreib an [EMAIL] oder ruf [PHONE] an.");
    }

    #[test]
    fn masks_street_addresses() {
        let r = redactor();
        assert_eq!(
            r.redact("Wir wohnen in der Kastanienallee 12a in Düsseldorf."),
            "Wir wohnen in der [ADDRESS] in Düsseldorf."
        );
        assert_eq!(r.redact("Meet at 221 Baker Street."), "Meet at [ADDRESS].");
    }

    #[test]
    fn masks_self_introductions() {
        let r = redactor();
        assert_eq!(r.redact("Hi, my name is Jonas Weber."), "Hi, my name is [NAME].");
        assert_eq!(r.redact("Hallo, ich heiße Mia!"), "Hallo, ich heiße [NAME]!");
        assert_eq!(r.redact("Mein Name ist Lea."), "Mein Name ist [NAME].");
    }

    #[test]
    fn masks_configured_family_names_case_insensitively() {
        let out = redactor().redact("carla liebt Pfützen, CARLA auch Schnee.");
        assert_eq!(out, "[NAME] liebt Pfützen, [NAME] auch Schnee.");
    }

    #[test]
    fn masks_adjacent_phone_numbers_in_one_pass() {
        assert_eq!(
            redactor().redact("+49 211 1234567+49 211 7654321"),
            "[PHONE][PHONE]"
        );
    }

    #[test]
    fn masks_bracketed_family_names() {
        assert_eq!(redactor().redact("[Carla] spielt"), "[NAME] spielt");
        let with_odd_name = Redactor::new(&["Name".to_string()]).unwrap();
        assert_eq!(with_odd_name.redact("[NAME] und [Name]"), "[NAME] und [NAME]");
    }

    #[test]
    fn leaves_dates_and_durations_alone() {
        let text = "Am 2026-05-10 um 09:30 für 45 Minuten, PLZ 40210.";
        assert_eq!(redactor().redact(text), text);
    }

    #[test]
    fn redaction_is_idempotent() {
        let plain = redactor();
        let with_odd_name = Redactor::new(&["Name".to_string(), "Carla".to_string()]).unwrap();
        for r in [&plain, &with_odd_name] {
            for text in [
                "my name is Carla, mail carla@example.com, phone 0211/987654321",
                "Ich heiße Name und wohne Hauptstraße 5.",
                "[NAME] and [EMAIL] and [PHONE] and [ADDRESS]",
                "+49 211 1234567+49 211 7654321",
                "[Carla] spielt mit [Name]",
                "Nothing personal here.",
            ] {
                let once = r.redact(text);
                assert_eq!(r.redact(&once), once, "{text}");
            }
        }
    }
}
