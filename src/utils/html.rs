// src/utils/html.rs

/// Sanitizes user-supplied free text (descriptions, bios, rating comments).
///
/// Whitelist-based: safe tags such as `<b>` survive, `<script>` is removed
/// together with its content, and event-handler attributes are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// `clean_html` over an optional field, dropping values that end up empty.
pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input
        .map(clean_html)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts() {
        assert_eq!(clean_html("Leaving at 5<script>alert(1)</script>"), "Leaving at 5");
        assert_eq!(
            clean_html(r#"<b onclick="x()">AC car</b>"#),
            "<b>AC car</b>"
        );
    }

    #[test]
    fn test_clean_optional_drops_empty() {
        assert_eq!(clean_optional(Some("<script>x</script>")), None);
        assert_eq!(clean_optional(Some(" quiet ride ")), Some("quiet ride".into()));
        assert_eq!(clean_optional(None), None);
    }
}
