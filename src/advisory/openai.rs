//! [`TextGenerator`] backed by an OpenAI-compatible `/chat/completions`
//! endpoint with structured output.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::advisory::{GenerationError, PromptRequest, TextGenerator};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiGenerator {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn body(&self, request: PromptRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: String::from("user"),
                content: request.prompt,
            }],
            temperature: 0.2,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: json!({
                    "name": request.name,
                    "schema": request.output_schema,
                    "strict": false,
                }),
            },
        }
    }
}

/// Pulls the first choice's content and parses it as JSON. Markdown code
/// fences around the JSON are tolerated.
fn parse_content(completion: ChatCompletionResponse) -> Result<Value, GenerationError> {
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    let content = strip_code_fence(content.trim());
    if content.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    serde_json::from_str(content).map_err(GenerationError::MalformedOutput)
}

fn strip_code_fence(content: &str) -> &str {
    let Some(inner) = content.strip_prefix("```") else {
        return content;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: PromptRequest) -> Result<Value, GenerationError> {
        let name = request.name;
        let mut builder = self.client.post(self.url()).json(&self.body(request));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status();
        debug!(
            prompt = name,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "generation response"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        parse_content(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn generator() -> OpenAiGenerator {
        OpenAiGenerator::new(OpenAiConfig {
            endpoint: String::from("http://localhost:8080/v1/"),
            model: String::from("test-model"),
            api_key: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn completion(content: Option<&str>) -> ChatCompletionResponse {
        serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
        .unwrap()
    }

    #[test]
    fn test_url_joins_endpoint() {
        assert_eq!(
            generator().url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_body_carries_prompt_and_schema() {
        let request = PromptRequest {
            name: "task_breakdown",
            prompt: String::from("Break it down"),
            output_schema: json!({"type": "object"}),
        };

        let body = serde_json::to_value(generator().body(request)).unwrap();
        assert_eq!(body["model"], json!("test-model"));
        assert_eq!(body["messages"][0]["content"], json!("Break it down"));
        assert_eq!(body["response_format"]["type"], json!("json_schema"));
        assert_eq!(
            body["response_format"]["json_schema"]["name"],
            json!("task_breakdown")
        );
        assert_eq!(
            body["response_format"]["json_schema"]["schema"],
            json!({"type": "object"})
        );
    }

    #[rstest]
    #[case::plain(r#"{"tasks": ["A"]}"#)]
    #[case::fenced("```json\n{\"tasks\": [\"A\"]}\n```")]
    #[case::padded("  {\"tasks\": [\"A\"]}\n")]
    fn test_parse_content(#[case] content: &str) {
        let value = parse_content(completion(Some(content))).unwrap();
        assert_eq!(value, json!({"tasks": ["A"]}));
    }

    #[test]
    fn test_missing_content_is_empty_response() {
        assert!(matches!(
            parse_content(completion(None)),
            Err(GenerationError::EmptyResponse)
        ));
        let no_choices = ChatCompletionResponse { choices: vec![] };
        assert!(matches!(
            parse_content(no_choices),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn test_prose_is_malformed_output() {
        let error = parse_content(completion(Some("Here are some tasks"))).unwrap_err();
        assert!(matches!(error, GenerationError::MalformedOutput(_)));
    }
}
