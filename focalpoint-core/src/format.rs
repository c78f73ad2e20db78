//! Public key and id string helpers.

use std::sync::OnceLock;

use regex::Regex;

/// The all-zero public key: 43 `0` characters and the padding `=`.
pub const ZERO_KEY: &str = "0000000000000000000000000000000000000000000=";

const KEY_BODY_LEN: usize = 43;
const SHORT_KEY_LEN: usize = 15;

fn public_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9/+]{43}=$").unwrap())
}

fn trailing_zero_padding() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"0+=?$").unwrap())
}

/// Whether `value` has the shape of a base64 public key.
pub fn is_public_key(value: &str) -> bool {
    public_key_pattern().is_match(value)
}

/// Turn a partial key typed by a user into a full-length key query.
///
/// Full keys pass through. Otherwise non-base64 characters are removed and
/// the remainder is right-padded with `0` to 43 characters plus `=`.
pub fn normalize_key_query(input: &str) -> String {
    if is_public_key(input) {
        return input.to_string();
    }
    let mut body: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '/' || *c == '+')
        .collect();
    while body.len() < KEY_BODY_LEN {
        body.push('0');
    }
    body.push('=');
    body
}

/// Short display form of a public key.
///
/// The zero key collapses to `"0"`. Other keys lose their trailing zero
/// padding and are cut to 15 characters.
pub fn shorten_b64(value: &str) -> String {
    if value.starts_with(&ZERO_KEY[..KEY_BODY_LEN]) {
        return value[..1].to_string();
    }
    trailing_zero_padding()
        .replace(value, "")
        .chars()
        .take(SHORT_KEY_LEN)
        .collect()
}

/// Short display form of a hex id: first five characters, `...`, then
/// everything from position 60.
pub fn shorten_hex(value: &str) -> String {
    let head: String = value.chars().take(5).collect();
    let tail: String = value.chars().skip(60).collect();
    format!("{head}...{tail}")
}

/// Keys that do not end in zero padding belong to observers rather than
/// named locales.
pub fn is_observer_key(value: &str) -> bool {
    !value.ends_with("00=")
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "hF8PpJCn0Z5oXLYQqTzdbZGwQ3sI2W0qzR6aGZKKNfo=";

    #[test]
    fn recognizes_public_keys() {
        assert!(is_public_key(KEY));
        assert!(is_public_key(ZERO_KEY));
        assert!(!is_public_key("short="));
        assert!(!is_public_key(&format!("{KEY}x")));
    }

    #[test]
    fn zero_key_shortens_to_single_glyph() {
        assert_eq!(shorten_b64(ZERO_KEY), "0");
    }

    #[test]
    fn normal_key_shortens_to_fifteen() {
        assert_eq!(shorten_b64(KEY), "hF8PpJCn0Z5oXLY");
    }

    #[test]
    fn padded_key_loses_zero_padding() {
        let padded = normalize_key_query("alice");
        assert_eq!(padded.len(), 44);
        assert_eq!(shorten_b64(&padded), "alice");
    }

    #[test]
    fn query_normalization() {
        assert_eq!(normalize_key_query(KEY), KEY);
        assert_eq!(
            normalize_key_query("bob@home!"),
            "bobhome000000000000000000000000000000000000="
        );
    }

    #[test]
    fn hex_shortening() {
        let id = "a".repeat(60) + "bcdef";
        assert_eq!(shorten_hex(&id), "aaaaa...bcdef");
    }

    #[test]
    fn observer_keys() {
        assert!(is_observer_key(KEY));
        assert!(!is_observer_key(&normalize_key_query("place")));
    }
}
