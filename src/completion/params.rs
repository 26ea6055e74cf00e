//! Call parameters and per-call overrides

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::models::ChatMessage;

/// Request body keys owned by named fields; never accepted as extra options
pub const RESERVED_KEYS: &[&str] = &["messages", "model", "temperature", "top_p", "max_tokens", "n", "seed"];

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Fully resolved parameters for one API call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParameters {
    pub model: String,

    pub temperature: f64,

    pub top_p: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Number of candidates to sample
    pub n: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Additional named options passed through to the API untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CallParameters {
    fn default() -> Self {
        crate::config::ModelConfig::default().call_defaults()
    }
}

impl CallParameters {
    /// Apply `overrides` on top of these defaults. Explicit override values win;
    /// `extra` options are merged key by key, dropping any reserved key.
    pub fn merge(&self, overrides: &CallOverrides) -> CallParameters {
        let extra = self
            .extra
            .iter()
            .chain(&overrides.extra)
            .filter(|(key, _)| !is_reserved(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        CallParameters {
            model: overrides.model.clone().unwrap_or_else(|| self.model.clone()),
            temperature: overrides.temperature.unwrap_or(self.temperature),
            top_p: overrides.top_p.unwrap_or(self.top_p),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            n: overrides.n.unwrap_or(self.n),
            seed: overrides.seed.or(self.seed),
            extra,
        }
    }
}

/// Per-call overrides; `None` fields fall back to the caller's defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOverrides {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CallOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn n(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Any other API option, e.g. `presence_penalty` or `response_format`.
    /// Keys in [`RESERVED_KEYS`] are ignored; use the named setters instead.
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if is_reserved(&key) {
            warn!(key = %key, "Ignoring extra option that shadows a named request field");
            return self;
        }
        self.extra.insert(key, value);
        self
    }
}

/// JSON body of `POST /chat/completions`
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub messages: &'a [ChatMessage],

    #[serde(flatten)]
    pub params: &'a CallParameters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overrides_take_precedence() {
        let defaults = CallParameters::default();
        let merged = defaults.merge(&CallOverrides::new().model("gpt-4").temperature(0.0).seed(42));

        assert_eq!(merged.model, "gpt-4");
        assert_eq!(merged.temperature, 0.0);
        assert_eq!(merged.seed, Some(42));
        // untouched fields keep defaults
        assert_eq!(merged.top_p, defaults.top_p);
        assert_eq!(merged.n, defaults.n);
    }

    #[test]
    fn test_empty_overrides_are_identity() {
        let defaults = CallParameters {
            max_tokens: Some(100),
            ..CallParameters::default()
        };

        assert_eq!(defaults.merge(&CallOverrides::default()), defaults);
    }

    #[test]
    fn test_extra_options_merge_by_key() {
        let mut defaults = CallParameters::default();
        defaults.extra.insert("presence_penalty".into(), json!(0.5));
        defaults.extra.insert("user".into(), json!("batch"));

        let merged = defaults.merge(&CallOverrides::new().option("presence_penalty", json!(1.0)));

        assert_eq!(merged.extra["presence_penalty"], json!(1.0));
        assert_eq!(merged.extra["user"], json!("batch"));
    }

    #[test]
    fn test_reserved_keys_never_reach_extra() {
        let overrides = CallOverrides::new()
            .option("model", json!("shadow"))
            .option("messages", json!([]))
            .option("logit_bias", json!({}));
        assert_eq!(overrides.extra.len(), 1);

        let mut defaults = CallParameters::default();
        defaults.extra.insert("temperature".into(), json!(2.0));
        let mut raw = CallOverrides::new().model("gpt-4");
        raw.extra.insert("messages".into(), json!("injected"));

        let merged = defaults.merge(&raw);
        assert!(merged.extra.is_empty());

        let messages = vec![ChatMessage::user("hi")];
        let body = serde_json::to_string(&ChatCompletionRequest {
            messages: &messages,
            params: &merged,
        })
        .unwrap();
        assert_eq!(body.matches("\"messages\"").count(), 1);
        assert_eq!(body.matches("\"model\"").count(), 1);
        assert_eq!(body.matches("\"temperature\"").count(), 1);
        assert!(body.contains("\"model\":\"gpt-4\""));
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let params = CallParameters::default()
            .merge(&CallOverrides::new().option("logprobs", json!(true)));

        let body = serde_json::to_value(ChatCompletionRequest {
            messages: &messages,
            params: &params,
        })
        .unwrap();

        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["n"], 1);
        assert_eq!(body["logprobs"], true);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("seed").is_none());
    }
}
