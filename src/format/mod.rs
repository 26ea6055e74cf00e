//! Shaping raw completions into the form callers asked for

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::completion::{CallParameters, ChatCompletion, Prompt, Role};

/// Output shape for successful responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The completion exactly as the API returned it
    #[default]
    Raw,
    /// Only the text of the first choice
    #[serde(alias = "simple")]
    Text,
    /// Flat record of request, parameters and response metadata
    Bundle,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Raw => "raw",
            OutputFormat::Text => "text",
            OutputFormat::Bundle => "bundle",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "text" | "simple" => Ok(OutputFormat::Text),
            "bundle" | "bundle_dict" => Ok(OutputFormat::Bundle),
            other => Err(format!("unknown output format '{}' (expected raw, text or bundle)", other)),
        }
    }
}

/// A completion rendered in one of the [`OutputFormat`] shapes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormattedResponse {
    Raw(ChatCompletion),
    Text(String),
    Bundle(Bundle),
}

impl FormattedResponse {
    /// Response text regardless of shape
    pub fn text(&self) -> Option<&str> {
        match self {
            FormattedResponse::Raw(cc) => cc.first_content(),
            FormattedResponse::Text(text) => Some(text.as_str()),
            FormattedResponse::Bundle(bundle) => bundle.response_message.as_deref(),
        }
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            FormattedResponse::Bundle(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            FormattedResponse::Raw(_) => OutputFormat::Raw,
            FormattedResponse::Text(_) => OutputFormat::Text,
            FormattedResponse::Bundle(_) => OutputFormat::Bundle,
        }
    }
}

/// Input messages and call settings flattened together with the response
/// and its metadata. Every field is optional so an empty record can stand in
/// for a request that never produced a completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: Option<String>,
    pub system_message: Option<String>,
    pub user_message: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub response_message: Option<String>,
    pub created_time: Option<i64>,
    pub model: Option<String>,
    pub total_tokens: Option<u32>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub seed: Option<i64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Bundle {
    /// Dictionary rendering with every field present (null when unset)
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Creation time as a UTC timestamp
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_time
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn is_empty(&self) -> bool {
        *self == Bundle::default()
    }
}

/// Render `completion` for the request it answers
pub fn format_response(
    completion: &ChatCompletion,
    prompt: &Prompt,
    params: &CallParameters,
    format: OutputFormat,
) -> FormattedResponse {
    match format {
        OutputFormat::Raw => FormattedResponse::Raw(completion.clone()),
        OutputFormat::Text => {
            FormattedResponse::Text(completion.first_content().unwrap_or_default().to_string())
        }
        OutputFormat::Bundle => FormattedResponse::Bundle(Bundle {
            id: Some(completion.id.clone()),
            system_message: prompt.first_content(Role::System).map(str::to_string),
            user_message: prompt.first_content(Role::User).map(str::to_string),
            metadata: prompt.metadata.clone(),
            response_message: completion.first_content().map(str::to_string),
            created_time: Some(completion.created),
            model: Some(completion.model.clone()),
            total_tokens: Some(completion.usage.total_tokens),
            prompt_tokens: Some(completion.usage.prompt_tokens),
            completion_tokens: Some(completion.usage.completion_tokens),
            seed: params.seed,
            temperature: Some(params.temperature),
            top_p: Some(params.top_p),
            max_tokens: params.max_tokens,
        }),
    }
}

/// Placeholder rendering for a request that has no completion. Only the
/// bundle shape has one (an all-empty record).
pub fn format_absent(format: OutputFormat) -> Option<FormattedResponse> {
    match format {
        OutputFormat::Bundle => Some(FormattedResponse::Bundle(Bundle::default())),
        OutputFormat::Raw | OutputFormat::Text => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CallOverrides, ChatMessage, Choice, ResponseMessage, Usage};
    use serde_json::json;

    fn completion() -> ChatCompletion {
        ChatCompletion {
            id: "chatcmpl-1".to_string(),
            created: 1_700_000_000,
            model: "gpt-3.5-turbo-0613".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content: Some("Washington, D.C.".to_string()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage {
                prompt_tokens: 20,
                completion_tokens: 5,
                total_tokens: 25,
            },
        }
    }

    fn prompt() -> Prompt {
        let mut metadata = Map::new();
        metadata.insert("question_id".into(), json!(17));
        Prompt::new(vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("What is the capital of the USA?"),
        ])
        .with_metadata(metadata)
    }

    #[test]
    fn test_raw_is_unmodified() {
        let cc = completion();
        let out = format_response(&cc, &prompt(), &CallParameters::default(), OutputFormat::Raw);
        assert_eq!(out, FormattedResponse::Raw(cc));
    }

    #[test]
    fn test_text_is_first_choice() {
        let out = format_response(&completion(), &prompt(), &CallParameters::default(), OutputFormat::Text);
        assert_eq!(out, FormattedResponse::Text("Washington, D.C.".to_string()));
        assert_eq!(out.text(), Some("Washington, D.C."));
    }

    #[test]
    fn test_bundle_flattens_request_params_and_response() {
        let params = CallParameters::default().merge(&CallOverrides::new().seed(9).max_tokens(64));
        let out = format_response(&completion(), &prompt(), &params, OutputFormat::Bundle);
        let bundle = out.as_bundle().unwrap();

        assert_eq!(bundle.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(bundle.system_message.as_deref(), Some("You are a helpful assistant."));
        assert_eq!(bundle.user_message.as_deref(), Some("What is the capital of the USA?"));
        assert_eq!(bundle.metadata.as_ref().unwrap()["question_id"], json!(17));
        assert_eq!(bundle.model.as_deref(), Some("gpt-3.5-turbo-0613"));
        assert_eq!(bundle.total_tokens, Some(25));
        assert_eq!(bundle.seed, Some(9));
        assert_eq!(bundle.max_tokens, Some(64));
        assert_eq!(bundle.temperature, Some(0.9));
        assert_eq!(
            bundle.created_at().unwrap().to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_formatting_is_idempotent() {
        let params = CallParameters::default();
        let first = format_response(&completion(), &prompt(), &params, OutputFormat::Bundle);
        let second = format_response(&completion(), &prompt(), &params, OutputFormat::Bundle);

        assert_eq!(first, second);
        assert_eq!(
            first.as_bundle().unwrap().to_map(),
            second.as_bundle().unwrap().to_map()
        );
    }

    #[test]
    fn test_absent_placeholder() {
        let placeholder = format_absent(OutputFormat::Bundle).unwrap();
        let bundle = placeholder.as_bundle().unwrap();
        assert!(bundle.is_empty());

        let map = bundle.to_map();
        assert_eq!(map.len(), 14);
        assert!(map.values().all(Value::is_null));

        assert!(format_absent(OutputFormat::Raw).is_none());
        assert!(format_absent(OutputFormat::Text).is_none());
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("simple".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("bundle_dict".parse::<OutputFormat>().unwrap(), OutputFormat::Bundle);
        assert_eq!("RAW".parse::<OutputFormat>().unwrap(), OutputFormat::Raw);
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Text.to_string(), "text");
    }
}
