use rand::Rng;

/// Generates a random auth cookie for one display instance.
/// The cookie is the MIT-MAGIC-COOKIE-1 value: 32 lowercase hexadecimal
/// characters, each nibble drawn uniformly from a cryptographically
/// seeded generator.
///
/// # Returns
/// A string containing the generated cookie.
pub fn generate() -> String {
    const DIGITS: &[u8] = b"0123456789abcdef";
    let mut rng = rand::rng();
    (0..32)
        .map(|_| {
            let idx = rng.random_range(0..DIGITS.len());
            DIGITS[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_32_lowercase_hex_characters() {
        let cookie = generate();
        assert_eq!(cookie.len(), 32);
        assert!(cookie.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn successive_cookies_differ() {
        assert_ne!(generate(), generate());
    }
}
