/// Lowercases a display name into a stable identifier fragment. Alphanumerics
/// pass through; spaces and common separators collapse into single dashes;
/// everything else is dropped. Never returns an empty string.
pub fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if matches!(ch, ' ' | '-' | '_' | '/' | '.') && !out.ends_with('-') && !out.is_empty()
        {
            out.push('-');
        }
    }
    let out = out.trim_matches('-').to_string();
    if out.is_empty() {
        "neighborhood".to_string()
    } else {
        out
    }
}

#[test]
fn slugify_test() {
    assert_eq!(slugify("Greenpoint"), "greenpoint");
    assert_eq!(slugify("  Long Island City / Hunters Point  "), "long-island-city-hunters-point");
    assert_eq!(slugify("St. George"), "st-george");
    assert_eq!(slugify("!!!"), "neighborhood");
    assert_eq!(slugify(""), "neighborhood");
}
