// Utility functions

/// Pulls the 10-character product id out of an Amazon link, or accepts a
/// bare id as-is. Handles the `/dp/<asin>` and `/gp/product/<asin>` URL
/// shapes; anything else is rejected.
pub fn extract_asin(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if is_asin(trimmed) {
        return Some(trimmed.to_ascii_uppercase());
    }

    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme.split('/').next()?;
    if !host.contains("amazon.") {
        return None;
    }

    let path = &without_scheme[host.len()..];
    let segments: Vec<&str> = path
        .split(['/', '?', '#'])
        .filter(|s| !s.is_empty())
        .collect();

    for window in segments.windows(2) {
        if window[0].eq_ignore_ascii_case("dp") || window[0].eq_ignore_ascii_case("product") {
            if is_asin(window[1]) {
                return Some(window[1].to_ascii_uppercase());
            }
        }
    }
    None
}

fn is_asin(s: &str) -> bool {
    s.len() == 10 && s.chars().all(|c| c.is_ascii_alphanumeric()) && s.chars().any(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

/// Parses a user-typed price, accepting a comma decimal separator.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', ".");
    match cleaned.parse::<f64>() {
        Ok(p) if p.is_finite() && p > 0.0 => Some(p),
        _ => None,
    }
}
