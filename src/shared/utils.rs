//! Utility functions and helpers

/// Format a price for display
pub fn format_price(price: f64) -> String {
    format!("${:.2}", price)
}

/// Fractional change from `old_value` to `new_value` (negative for a drop)
pub fn calculate_fractional_change(old_value: f64, new_value: f64) -> f64 {
    if old_value > 0.0 {
        (new_value - old_value) / old_value
    } else {
        0.0
    }
}

/// Turn a URL slug like `Sony-WH-1000XM5-Headphones` into a display title
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Truncate text with ellipsis
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
    format!("{}...", kept)
}
