use std::env;

use anyhow::{anyhow, Result};

pub const FORUM_URL: &str = "https://www.nodeseek.com";
pub const COOKIE_DOMAIN: &str = ".nodeseek.com";

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub cookie: String,
    pub random_reward: bool,
    pub headless: bool,
    pub gemini_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let cookie = env::var("NS_COOKIE")
            .or_else(|_| env::var("COOKIE"))
            .map_err(|_| anyhow!("Set the NS_COOKIE (or COOKIE) environment variable"))?;

        let random_reward = env::var("NS_RANDOM")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let headless = env::var("HEADLESS")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Config {
            cookie,
            random_reward,
            headless,
            gemini_api_key,
        })
    }
}

/// Boolean-ish env values: "true", "1", "yes", "on" (case-insensitive).
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Splits a browser cookie string ("a=1; b=2") into name/value pairs.
/// Segments without a '=' are skipped rather than failing the whole parse.
pub fn parse_cookie_pairs(raw: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                pairs.push((name.to_string(), value.to_string()));
            }
            _ => continue,
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_pairs() {
        let pairs = parse_cookie_pairs("a=1;b=2");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("a".to_string(), "1".to_string()));
        assert_eq!(pairs[1], ("b".to_string(), "2".to_string()));
    }

    #[test]
    fn test_parse_cookie_pairs_skips_malformed() {
        let pairs = parse_cookie_pairs("a=1; garbage ;b=2");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "a");
        assert_eq!(pairs[1].0, "b");
    }

    #[test]
    fn test_parse_cookie_pairs_keeps_equals_in_value() {
        let pairs = parse_cookie_pairs("session=abc=def");
        assert_eq!(pairs, vec![("session".to_string(), "abc=def".to_string())]);
    }

    #[test]
    fn test_parse_cookie_pairs_trims_whitespace() {
        let pairs = parse_cookie_pairs(" a=1 ; b=2 ");
        assert_eq!(pairs[0], ("a".to_string(), "1".to_string()));
        assert_eq!(pairs[1], ("b".to_string(), "2".to_string()));
    }

    #[test]
    fn test_parse_cookie_pairs_empty() {
        assert!(parse_cookie_pairs("").is_empty());
        assert!(parse_cookie_pairs(";;;").is_empty());
        assert!(parse_cookie_pairs("=nameless").is_empty());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(parse_flag(" on "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("random"));
    }
}
