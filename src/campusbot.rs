use evlog::meta;
use serde::{Deserialize, Serialize};

use crate::runtime::get_logger;

const PREAMBLE: &str = "You are CampusBot, a helpful assistant for students interested in blockchain-based voting. \
    Respond clearly, factually, and be multilingual-aware.";

pub const NO_ANSWER: &str = "Sorry, I couldn't understand that.";
pub const FAILED: &str = "Something went wrong. Please try again!";
pub const NOT_CONFIGURED: &str = "CampusBot is not configured on this server.";

pub const SUGGESTED_QUESTIONS: &[&str] = &[
    "How to vote in blockchain elections?",
    "Explain zero-knowledge proofs in elections",
    "Benefits of decentralization in student elections",
    "How do I check if my vote is counted?",
];

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn build_request(prompt: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part {
                text: format!("{}\n\nUser: {}", PREAMBLE, prompt.trim()),
            }],
        }],
    }
}

fn extract_reply(response: GenerateResponse) -> Option<String> {
    response.candidates.into_iter()
        .next()?
        .content?
        .parts.into_iter()
        .next()?
        .text
        .filter(|t| !t.trim().is_empty())
}

/// Client for the external text-generation endpoint. Failures are logged and turned into a
/// fixed reply; callers always get text back.
pub struct CampusBot {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl CampusBot {
    pub fn new(url: Option<String>, key: Option<String>) -> Self {
        let endpoint = url.map(|url| match key {
            None => url,
            Some(key) => format!("{}?key={}", url, key),
        });

        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn generate(&self, endpoint: &str, prompt: &str) -> anyhow::Result<Option<String>> {
        let response = self.http.post(endpoint)
            .json(&build_request(prompt))
            .send()
            .await?
            .error_for_status()?
            .json::<GenerateResponse>()
            .await?;

        Ok(extract_reply(response))
    }

    pub async fn ask(&self, prompt: &str) -> String {
        let endpoint = match &self.endpoint {
            None => return NOT_CONFIGURED.to_owned(),
            Some(v) => v,
        };

        match self.generate(endpoint, prompt).await {
            Ok(Some(reply)) => reply,
            Ok(None) => NO_ANSWER.to_owned(),
            Err(e) => {
                get_logger().error("Error contacting CampusBot endpoint.", meta! {
                    "Error" => e,
                });
                FAILED.to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wraps_prompt_with_preamble() {
        let body = serde_json::to_value(build_request("  How do I reveal?  ")).unwrap();
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert!(text.starts_with("You are CampusBot"));
        assert!(text.ends_with("User: How do I reveal?"));
    }

    #[test]
    fn reply_is_first_candidate_text() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Use /reveal."},{"text":"ignored"}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_reply(response).as_deref(), Some("Use /reveal."));
    }

    #[test]
    fn missing_text_has_no_reply() {
        for raw in [r#"{}"#, r#"{"candidates":[]}"#, r#"{"candidates":[{"content":{"parts":[{}]}}]}"#] {
            let response: GenerateResponse = serde_json::from_str(raw).unwrap();
            assert_eq!(extract_reply(response), None);
        }
    }

    #[tokio::test]
    async fn unconfigured_bot_says_so() {
        let bot = CampusBot::new(None, Some("key".to_owned()));
        assert!(!bot.is_configured());
        assert_eq!(bot.ask("hi").await, NOT_CONFIGURED);
    }
}
