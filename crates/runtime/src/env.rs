//! Typed reads over a key lookup, so configs can be built from the process
//! environment or from a fixed table in tests.

use std::str::FromStr;

use anyhow::{bail, Context};

/// Parse `key` when present, otherwise return `default`.
pub fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}: '{raw}'")),
        None => Ok(default),
    }
}

/// Boolean switch. Accepts `1/true/yes/on` and `0/false/no/off`, any case.
pub fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> anyhow::Result<bool> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("Invalid {key}: '{raw}' (expected true/false, yes/no, on/off or 1/0)"),
    }
}

/// Non-empty, trimmed value of a required key.
pub fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .with_context(|| format!("{key} must be set"))
}

/// Comma-separated list with blanks dropped. `None` when the key is unset.
pub fn list(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
    lookup(key).map(|raw| {
        raw.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(key: &'static str, value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |k| (k == key).then(|| value.to_string())
    }

    #[test]
    fn test_parse_flag_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(parse_flag(&one("FLAG", raw), "FLAG", false).unwrap(), "{raw}");
        }
        for raw in ["0", "False", "no", "OFF"] {
            assert!(!parse_flag(&one("FLAG", raw), "FLAG", true).unwrap(), "{raw}");
        }
        assert!(parse_flag(&one("OTHER", "x"), "FLAG", true).unwrap());

        let err = parse_flag(&one("FLAG", "maybe"), "FLAG", true).unwrap_err();
        assert!(err.to_string().contains("FLAG"));
    }

    #[test]
    fn test_parse_or_names_the_key() {
        assert_eq!(parse_or(&one("N", " 42 "), "N", 7u64).unwrap(), 42);
        assert_eq!(parse_or(&one("M", "1"), "N", 7u64).unwrap(), 7);

        let err = parse_or(&one("N", "lots"), "N", 7u64).unwrap_err();
        assert!(err.to_string().contains("Invalid N: 'lots'"));
    }

    #[test]
    fn test_required_rejects_blank() {
        assert_eq!(required(&one("TOKEN", " abc "), "TOKEN").unwrap(), "abc");
        assert!(required(&one("TOKEN", "   "), "TOKEN").is_err());
        let err = required(&one("OTHER", "x"), "TOKEN").unwrap_err();
        assert_eq!(err.to_string(), "TOKEN must be set");
    }

    #[test]
    fn test_list_drops_blanks() {
        assert_eq!(
            list(&one("HOSTS", "a, ,b,"), "HOSTS"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(list(&one("OTHER", "a"), "HOSTS"), None);
    }
}
