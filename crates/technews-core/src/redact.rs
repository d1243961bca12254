use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static REDACTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key",
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret",
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer",
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "bot_token",
            Regex::new(r"(Bot\s+)([A-Za-z0-9\-_.]{20,})").expect("invalid bot_token regex"),
        ),
        (
            "sk_token",
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
    ]
});

/// Mask credentials before a payload reaches the logs.
///
/// Returns the sanitised text and the names of the patterns that fired.
pub fn redact_secrets(input: &str) -> (String, Vec<&'static str>) {
    let mut output = input.to_string();
    let mut hits = Vec::new();

    for (name, pattern) in REDACTION_PATTERNS.iter() {
        if !pattern.is_match(&output) {
            continue;
        }
        hits.push(*name);
        output = pattern
            .replace_all(&output, |caps: &Captures| {
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .into_owned();
    }

    (output, hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_api_keys_and_bearer_tokens() {
        let (text, hits) = redact_secrets("api_key=abc123 Authorization: Bearer xyz.789");
        assert_eq!(text, "api_key=[REDACTED] Authorization: Bearer [REDACTED]");
        assert_eq!(hits, vec!["api_key", "bearer"]);
    }

    #[test]
    fn masks_bare_sk_tokens() {
        let (text, hits) = redact_secrets("token sk-ABCDEFGHIJKLMNOPQRST leaked");
        assert_eq!(text, "token [REDACTED] leaked");
        assert_eq!(hits, vec!["sk_token"]);
    }

    #[test]
    fn leaves_plain_text_untouched() {
        let (text, hits) = redact_secrets("Tin công nghệ hôm nay");
        assert_eq!(text, "Tin công nghệ hôm nay");
        assert!(hits.is_empty());
    }
}
