use std::collections::HashSet;

/// Sanitizes post HTML. Keeps ammonia's default whitelist and additionally
/// allows embed iframes (video and audio players).
pub fn sanitize_post_html(input: &str) -> String {
    ammonia::Builder::default()
        .add_tags(&["iframe"])
        .add_tag_attributes(
            "iframe",
            &["src", "width", "height", "allow", "allowfullscreen", "frameborder", "title"],
        )
        .add_generic_attributes(&["class"])
        .clean(input)
        .to_string()
}

/// Strips all HTML tags from input (for titles/excerpts/SEO fields).
/// Entities escaped by the cleaner are decoded again so "Rock & Roll" stays readable.
pub fn strip_all_html(input: &str) -> String {
    let cleaned = ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string();
    html_escape::decode_html_entities(&cleaned).trim().to_string()
}

/// Reduces a user-supplied folder or file name to `[A-Za-z0-9._-]`.
/// Leading dots are dropped so no hidden files or `..` survive.
pub fn sanitize_path_segment(input: &str) -> Option<String> {
    let replaced: String = input
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let trimmed = replaced.trim_start_matches('.');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        None
    } else {
        Some(trimmed.to_string())
    }
}
