use regex::Regex;
use std::sync::OnceLock;

fn mix_set_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)trinax\s+mix\s*set\s*#?\s*(\d{1,4})\s*[-–—:]\s*(\d{1,2})\.(\d{1,2})\.(\d{4})")
            .expect("mix set pattern is valid")
    })
}

fn non_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("non-word pattern is valid"))
}

fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s_-]+").expect("separator pattern is valid"))
}

/// Canonical slug form: lowercase `[a-z0-9-]`, no doubled, leading or
/// trailing dashes. Applying it twice yields the same string.
pub fn normalize_slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = true;
    for c in input.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn transliterate_german(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'ä' | 'Ä' => out.push_str("ae"),
            'ö' | 'Ö' => out.push_str("oe"),
            'ü' | 'Ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            other => out.push(other),
        }
    }
    out
}

/// Generic title slugification. The result is not yet normalized.
pub fn slugify(title: &str) -> String {
    let lowered = transliterate_german(title).to_lowercase();
    let stripped = non_word_regex().replace_all(&lowered, "");
    let dashed = separator_regex().replace_all(stripped.trim(), "-");
    dashed.trim_matches('-').to_string()
}

/// Recognizes titles like "Trinax Mix Set 66 - 01.04.2021" and maps them to
/// `trinax-mix-set-066-01042021`.
pub fn mix_set_slug(title: &str) -> Option<String> {
    let caps = mix_set_regex().captures(title)?;
    let number: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let month: u32 = caps[3].parse().ok()?;
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return None;
    }
    Some(format!(
        "trinax-mix-set-{:03}-{:02}{:02}{}",
        number, day, month, &caps[4]
    ))
}

/// Slug resolution order: explicit slug, then the mix-set naming scheme,
/// then generic slugification. Always normalized.
pub fn resolve_slug(explicit: Option<&str>, title: &str) -> String {
    if let Some(explicit) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return normalize_slug(explicit);
    }
    if let Some(slug) = mix_set_slug(title) {
        return normalize_slug(&slug);
    }
    normalize_slug(&slugify(title))
}

/// True when `slug` is already in canonical form and non-empty.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && normalize_slug(slug) == slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "---",
            "Hello World",
            "  Grüße aus Köln!! ",
            "a--b__c  d",
            "-leading-and-trailing-",
            "ALL CAPS 2024",
            "emoji 🎉 party",
            "already-normal-123",
            "İstanbul",
        ];
        for s in samples {
            let once = normalize_slug(s);
            assert_eq!(normalize_slug(&once), once, "input: {:?}", s);
            assert!(once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            assert!(!once.starts_with('-') && !once.ends_with('-'));
            assert!(!once.contains("--"));
        }
    }

    #[test]
    fn mix_set_title_maps_to_fixed_scheme() {
        assert_eq!(
            resolve_slug(None, "Trinax Mix Set 66 - 01.04.2021"),
            "trinax-mix-set-066-01042021"
        );
        assert_eq!(
            mix_set_slug("trinax mixset 7 – 5.3.2022").as_deref(),
            Some("trinax-mix-set-007-05032022")
        );
        assert_eq!(mix_set_slug("Trinax Mix Set 66 - 41.04.2021"), None);
        assert_eq!(mix_set_slug("Ein ganz normaler Beitrag"), None);
    }

    #[test]
    fn explicit_slug_wins_and_is_normalized() {
        assert_eq!(
            resolve_slug(Some("  My Custom--Slug "), "Trinax Mix Set 66 - 01.04.2021"),
            "my-custom-slug"
        );
        assert_eq!(resolve_slug(Some("   "), "Sommer Shooting"), "sommer-shooting");
    }

    #[test]
    fn slugify_strips_punctuation_and_transliterates() {
        assert_eq!(resolve_slug(None, "Hochzeit: Anna & Jörg!"), "hochzeit-anna-joerg");
        assert_eq!(resolve_slug(None, "  Straße   im   Nebel  "), "strasse-im-nebel");
        assert_eq!(resolve_slug(None, "!!!"), "");
    }

    #[test]
    fn slug_validation() {
        assert!(is_valid_slug("abc-123"));
        assert!(!is_valid_slug("Abc"));
        assert!(!is_valid_slug("../etc"));
        assert!(!is_valid_slug(""));
    }
}
