use std::collections::HashSet;

use serde_json::{Map, Value};

/// First words that mark a prospect name as test/junk data.
const JUNK_PREFIXES: &[&str] = &["test", "qa", "demo", "admin", "user", "sample"];

/// Words that signal a brand/organization name rather than a person.
const BRAND_SIGNALS: &[&str] = &[
    "network",
    "studio",
    "studios",
    "media",
    "group",
    "team",
    "agency",
    "academy",
    "fitness",
    "coaching",
    "collective",
    "hub",
    "club",
    "reaction",
    "youtubers",
    "tv",
    "official",
    "global",
    "pro",
    "digital",
    "online",
    "solutions",
    "services",
    "consulting",
    "wellness",
    "health",
    "training",
    "institute",
    "foundation",
];

/// Decide how to address a prospect in outreach copy.
///
/// Returns `(greeting_name, is_personal)`:
/// - a person's name ("Britteny La'Shay") → first name, personal
/// - a brand/org name ("Loroly Network") → "{name} Team"
/// - junk ("12 34", "TEST TEST") → "there"
/// - non-Latin names fall back to "{app_name} Team" when the app name is
///   Latin, else "there"
pub fn resolve_greeting(name: &str, app_name: Option<&str>) -> (String, bool) {
    let name = name.trim();
    if name.is_empty() {
        return ("there".to_string(), false);
    }

    if is_junk(name) {
        return ("there".to_string(), false);
    }

    if !is_latin(name) {
        if let Some(app) = app_name.map(str::trim).filter(|app| is_latin(app)) {
            return (format!("{app} Team"), false);
        }
        return ("there".to_string(), false);
    }

    if is_brand_name(name) {
        return (format!("{name} Team"), false);
    }

    if looks_like_person_name(name) {
        let first = name.split_whitespace().next().unwrap_or(name);
        return (capitalize_if_lower(first), true);
    }

    if let Some(app) = app_name.map(str::trim).filter(|app| !app.is_empty() && *app != name) {
        return (format!("{app} Team"), false);
    }
    (format!("{name} Team"), false)
}

fn is_junk(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    if lower.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }
    JUNK_PREFIXES.iter().any(|prefix| {
        lower == *prefix
            || lower
                .strip_prefix(*prefix)
                .is_some_and(|rest| rest.chars().next().is_some_and(|c| !c.is_alphanumeric()))
    })
}

/// Primarily Latin letters (codepoints below U+0250 among alphabetic chars).
fn is_latin(text: &str) -> bool {
    let mut latin = 0usize;
    let mut letters = 0usize;
    for character in text.chars() {
        if character.is_alphabetic() {
            letters += 1;
            if (character as u32) < 0x0250 {
                latin += 1;
            }
        }
    }
    letters > 0 && latin * 10 > letters * 7
}

fn is_brand_name(name: &str) -> bool {
    name.to_lowercase()
        .split_whitespace()
        .any(|word| BRAND_SIGNALS.contains(&word))
}

fn looks_like_person_name(name: &str) -> bool {
    if !is_latin(name) {
        return false;
    }
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.is_empty() || words.len() > 4 {
        return false;
    }
    words.iter().all(|word| {
        word.trim_matches(|c| c == '\'' || c == '"')
            .chars()
            .next()
            .is_some_and(char::is_alphabetic)
    })
}

fn capitalize_if_lower(word: &str) -> String {
    if word.chars().all(|c| !c.is_alphabetic() || c.is_lowercase()) {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    } else {
        word.to_string()
    }
}

/// Prospects that must never receive outreach.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    pub blocked_app_ids: HashSet<i64>,
    pub blocked_email_domains: Vec<String>,
    /// Apps with an active paid subscription — existing customers, not
    /// prospects. Refreshed from the warehouse each poll cycle.
    pub active_app_ids: HashSet<i64>,
}

impl ExclusionRules {
    pub fn new(blocked_app_ids: &[i64], blocked_email_domains: &[String]) -> Self {
        Self {
            blocked_app_ids: blocked_app_ids.iter().copied().collect(),
            blocked_email_domains: blocked_email_domains
                .iter()
                .map(|domain| domain.trim().to_ascii_lowercase())
                .collect(),
            active_app_ids: HashSet::new(),
        }
    }

    /// Returns the exclusion reason, or `None` when outreach is allowed.
    pub fn exclusion_reason(&self, application_id: i64, email: Option<&str>) -> Option<String> {
        if self.blocked_app_ids.contains(&application_id) {
            return Some(format!("blocked app id {application_id}"));
        }
        if let Some(domain) = email.and_then(|value| value.trim().rsplit('@').next()) {
            let domain = domain.to_ascii_lowercase();
            if self
                .blocked_email_domains
                .iter()
                .any(|blocked| *blocked == domain)
            {
                return Some(format!("internal email domain {domain}"));
            }
        }
        if self.active_app_ids.contains(&application_id) {
            return Some("active paying subscriber".to_string());
        }
        None
    }
}

/// Replace `{{key}}` placeholders with scalar values from the context.
/// Unknown placeholders are left in place.
pub fn render_template(template: &str, context: &Map<String, Value>) -> String {
    let mut result = template.to_string();
    for (key, value) in context {
        let placeholder = format!("{{{{{key}}}}}");
        let replacement = match value {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            _ => continue,
        };
        result = result.replace(&placeholder, &replacement);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{render_template, resolve_greeting, ExclusionRules};
    use serde_json::{Map, Value};

    #[test]
    fn person_names_use_first_name() {
        assert_eq!(
            resolve_greeting("Britteny La'Shay", None),
            ("Britteny".to_string(), true)
        );
        assert_eq!(
            resolve_greeting("Brittney Carr", None),
            ("Brittney".to_string(), true)
        );
        assert_eq!(resolve_greeting("Fred", None), ("Fred".to_string(), true));
        // lowercase input still reads as a person, title-cased
        assert_eq!(
            resolve_greeting("sanchez brown", None),
            ("Sanchez".to_string(), true)
        );
    }

    #[test]
    fn brand_names_get_team_suffix() {
        assert_eq!(
            resolve_greeting("Loroly Network", None),
            ("Loroly Network Team".to_string(), false)
        );
        assert_eq!(
            resolve_greeting("Arab Youtubers Reaction", None),
            ("Arab Youtubers Reaction Team".to_string(), false)
        );
    }

    #[test]
    fn junk_names_fall_back_to_generic() {
        assert_eq!(resolve_greeting("12 34", None), ("there".to_string(), false));
        assert_eq!(
            resolve_greeting("TEST TEST", None),
            ("there".to_string(), false)
        );
        assert_eq!(resolve_greeting("", None), ("there".to_string(), false));
    }

    #[test]
    fn non_latin_names_use_app_team() {
        assert_eq!(
            resolve_greeting("反射的棱镜", Some("Prism Fitness")),
            ("Prism Fitness Team".to_string(), false)
        );
        assert_eq!(
            resolve_greeting("反射的棱镜", None),
            ("there".to_string(), false)
        );
    }

    #[test]
    fn exclusion_rules_cover_all_three_cases() {
        let mut rules = ExclusionRules::new(&[274764], &["joinkliq.io".to_string()]);
        rules.active_app_ids.insert(99);

        assert!(rules.exclusion_reason(274764, None).is_some());
        assert!(rules
            .exclusion_reason(1, Some("ben@joinkliq.io"))
            .is_some());
        assert!(rules.exclusion_reason(99, Some("coach@gmail.com")).is_some());
        assert!(rules.exclusion_reason(1, Some("coach@gmail.com")).is_none());
    }

    #[test]
    fn templates_resolve_scalar_placeholders() {
        let mut context = Map::new();
        context.insert(
            "first_name".to_string(),
            Value::String("Britteny".to_string()),
        );
        let rendered = render_template("Hey {{first_name}}, welcome to KLIQ!", &context);
        assert_eq!(rendered, "Hey Britteny, welcome to KLIQ!");
        assert_eq!(
            render_template("Hi {{unknown}}", &context),
            "Hi {{unknown}}"
        );
    }
}
