use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

pub const MIN_REPLY_CHARS: usize = 4;
pub const MAX_REPLY_CHARS: usize = 25;

const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONTENT_BUDGET_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct PromptConfig {
    #[serde(default)]
    custom_prompt: Option<String>,
}

/// Client for the Gemini generateContent endpoint.
///
/// Every failure mode (no key, timeout, bad status, malformed body,
/// reply out of bounds) collapses into `None`: the caller only needs to
/// know whether it got a usable reply.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    prompt_template: String,
    verbose: bool,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, verbose: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_key,
            prompt_template: Self::load_prompt_template(verbose),
            verbose,
        })
    }

    fn load_prompt_template(verbose: bool) -> String {
        match fs::read_to_string("prompt.toml") {
            Ok(content) => match toml::from_str::<PromptConfig>(&content) {
                Ok(prompt_config) => {
                    if let Some(custom) = prompt_config.custom_prompt {
                        if verbose {
                            println!("[PROMPT] Loaded custom prompt from prompt.toml");
                        }
                        return custom;
                    }
                }
                Err(e) => {
                    if verbose {
                        println!("[PROMPT] Warning: Failed to parse prompt.toml: {}", e);
                        println!("[PROMPT] Using default prompt");
                    }
                }
            },
            Err(_) => {
                if verbose {
                    println!("[PROMPT] No prompt.toml found, using default prompt");
                }
            }
        }

        r#"你是一个技术论坛的用户，正在回复一篇帖子。帖子标题是：“{{TITLE}}”，内容片段如下：“{{CONTENT}}”。
请写一句简短（4-20个字）、自然、和帖子内容相关的回复。语气友好，符合技术或交易社区的氛围。
示例：
- “这个配置不错”
- “思路很清晰”
只输出回复本身，不要引号，不要任何解释。"#
            .to_string()
    }

    /// Returns a validated reply for the post, or `None` if anything
    /// along the way went wrong.
    pub async fn generate_reply(&self, post_title: &str, post_content: &str) -> Option<String> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                println!("[AI] No Gemini API key configured, skipping reply");
                return None;
            }
        };

        if self.verbose {
            println!("[AI] Generating reply");
        }

        let snippet: String = post_content.chars().take(CONTENT_BUDGET_CHARS).collect();
        let prompt = self
            .prompt_template
            .replace("{{TITLE}}", post_title)
            .replace("{{CONTENT}}", &snippet);

        let body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        let response = match self
            .http
            .post(GEMINI_URL)
            .query(&[("key", api_key.as_str())])
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                println!("[AI] Gemini request failed: {}, skipping reply", e);
                return None;
            }
        };

        if !response.status().is_success() {
            println!("[AI] Gemini returned {}, skipping reply", response.status());
            return None;
        }

        let value: Value = match response.json().await {
            Ok(value) => value,
            Err(e) => {
                println!("[AI] Gemini response was not valid JSON: {}, skipping reply", e);
                return None;
            }
        };

        let raw = match extract_reply_text(&value) {
            Some(raw) => raw,
            None => {
                println!("[AI] Gemini response missing candidate text, skipping reply");
                return None;
            }
        };

        let reply = sanitize_reply(&raw);
        if !reply_length_ok(&reply) {
            println!(
                "[AI] Reply length out of range ({}): {}, skipping reply",
                reply.chars().count(),
                reply
            );
            return None;
        }

        if self.verbose {
            println!("[AI] Generated: {}", reply);
        }
        Some(reply)
    }
}

/// Pulls `candidates[0].content.parts[0].text` out of a generateContent
/// response body.
fn extract_reply_text(value: &Value) -> Option<String> {
    value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

/// Flattens newlines and strips ASCII and CJK quote characters.
pub fn sanitize_reply(raw: &str) -> String {
    let mut reply = raw.trim().replace(['\n', '\r'], " ");
    for quote in ['"', '\'', '“', '”', '‘', '’'] {
        reply = reply.replace(quote, "");
    }
    reply.trim().to_string()
}

/// A reply is usable iff its character count lies within the inclusive
/// bound. Counted in chars, not bytes: the replies are mostly CJK.
pub fn reply_length_ok(reply: &str) -> bool {
    let len = reply.chars().count();
    (MIN_REPLY_CHARS..=MAX_REPLY_CHARS).contains(&len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_reply_text() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "这个配置不错" }],
                    "role": "model"
                },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_reply_text(&body).as_deref(), Some("这个配置不错"));
    }

    #[test]
    fn test_extract_reply_text_missing_fields() {
        assert_eq!(extract_reply_text(&json!({})), None);
        assert_eq!(extract_reply_text(&json!({ "candidates": [] })), None);
        assert_eq!(
            extract_reply_text(&json!({ "candidates": [{ "content": {} }] })),
            None
        );
        assert_eq!(
            extract_reply_text(&json!({ "candidates": [{ "content": { "parts": [{}] } }] })),
            None
        );
    }

    #[test]
    fn test_sanitize_reply() {
        assert_eq!(sanitize_reply("  “思路很清晰”\n"), "思路很清晰");
        assert_eq!(sanitize_reply("line one\nline two"), "line one line two");
        assert_eq!(sanitize_reply("\"quoted 'text'\""), "quoted text");
    }

    #[test]
    fn test_reply_length_bounds() {
        assert!(!reply_length_ok("abc"));
        assert!(reply_length_ok("abcd"));
        assert!(reply_length_ok("abcdefghij"));
        assert!(reply_length_ok(&"x".repeat(25)));
        assert!(!reply_length_ok(&"x".repeat(26)));
        assert!(!reply_length_ok(""));
    }

    #[test]
    fn test_reply_length_counts_chars_not_bytes() {
        // 6 chars, 18 bytes
        assert!(reply_length_ok("这个配置不错"));
        // 26 chars over the bound even though each is multibyte
        assert!(!reply_length_ok(&"好".repeat(26)));
    }
}
