pub mod snowflake;

/// Table/identifier-safe name check used before any dynamic spatial SQL.
/// Generated names are `vector_<8 hex>` so this is belt and braces for
/// anything read back from the database.
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name.chars().next().map(|c| c.is_ascii_lowercase()).unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_identifiers() {
        assert!(is_safe_identifier("vector_1a2b3c4d"));
        assert!(is_safe_identifier("scenes"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("1abc"));
        assert!(!is_safe_identifier("drop table; --"));
        assert!(!is_safe_identifier("Vector_X"));
    }
}
