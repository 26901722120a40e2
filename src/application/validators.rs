/// Validates a plan code for URL-friendly characters.
/// Rules:
/// - 1-50 characters
/// - Only lowercase ASCII letters, numbers, hyphens, underscores
/// - Must start with a letter or number
pub fn is_valid_plan_code(code: &str) -> bool {
    let Some(first) = code.chars().next() else {
        return false;
    };
    if code.len() > 50 {
        return false;
    }
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }
    code.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Client supplied idempotency keys: 1-100 printable ASCII characters, no whitespace
pub fn is_valid_idempotency_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= 100 && key.chars().all(|c| c.is_ascii_graphic())
}

/// Shop product identifiers are opaque but must be short and URL-safe
pub fn is_valid_product_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// ISO 4217 style code, three uppercase letters
pub fn is_valid_currency(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}
