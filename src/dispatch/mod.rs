//! Request dispatch: single-request retry, bounded-concurrency batches and
//! the sequential baseline

pub mod batch;
pub mod invoker;
pub mod progress;
pub mod sequential;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::ConcurrentBatchDispatcher;
pub use invoker::{InvokeOutcome, RetryingInvoker};
pub use progress::{BarProgress, NoProgress, ProgressEvent, ProgressSink, TracingProgress};
pub use sequential::SequentialBatchRunner;

use serde::{Serialize, Serializer};

use crate::completion::Prompt;
use crate::format::{format_absent, FormattedResponse, OutputFormat};

/// Final outcome of one request
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResult {
    /// A response that passed validation
    Success(FormattedResponse),
    /// Every attempt failed or was rejected
    Absent,
}

impl CompletionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionResult::Success(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CompletionResult::Absent)
    }

    pub fn response(&self) -> Option<&FormattedResponse> {
        match self {
            CompletionResult::Success(response) => Some(response),
            CompletionResult::Absent => None,
        }
    }

    pub fn into_response(self) -> Option<FormattedResponse> {
        match self {
            CompletionResult::Success(response) => Some(response),
            CompletionResult::Absent => None,
        }
    }

    /// Like [`into_response`](Self::into_response) but renders `Absent` as
    /// the placeholder for `format` where one exists (an empty bundle)
    pub fn into_response_or_placeholder(self, format: OutputFormat) -> Option<FormattedResponse> {
        match self {
            CompletionResult::Success(response) => Some(response),
            CompletionResult::Absent => format_absent(format),
        }
    }
}

/// `Absent` serializes as `null`
impl Serialize for CompletionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CompletionResult::Success(response) => response.serialize(serializer),
            CompletionResult::Absent => serializer.serialize_none(),
        }
    }
}

/// Accept/reject check applied to every formatted response before it is
/// returned. Rejection costs one retry, exactly like a failed call.
pub trait Validator: Send + Sync {
    fn validate(&self, prompt: &Prompt, response: &FormattedResponse) -> bool;
}

impl<F> Validator for F
where
    F: Fn(&Prompt, &FormattedResponse) -> bool + Send + Sync,
{
    fn validate(&self, prompt: &Prompt, response: &FormattedResponse) -> bool {
        self(prompt, response)
    }
}

/// Default validator: every response is accepted
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _prompt: &Prompt, _response: &FormattedResponse) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Bundle;

    #[test]
    fn test_absent_serializes_as_null() {
        let results = vec![
            CompletionResult::Success(FormattedResponse::Text("ok".to_string())),
            CompletionResult::Absent,
        ];

        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, r#"["ok",null]"#);
    }

    #[test]
    fn test_placeholder_only_for_bundle() {
        assert_eq!(
            CompletionResult::Absent.into_response_or_placeholder(OutputFormat::Bundle),
            Some(FormattedResponse::Bundle(Bundle::default()))
        );
        assert_eq!(
            CompletionResult::Absent.into_response_or_placeholder(OutputFormat::Text),
            None
        );
    }

    #[test]
    fn test_closure_validator() {
        let non_empty = |_: &Prompt, response: &FormattedResponse| {
            response.text().map_or(false, |t| !t.is_empty())
        };
        let prompt = Prompt::from_pair("s", "u");

        assert!(non_empty.validate(&prompt, &FormattedResponse::Text("yes".into())));
        assert!(!non_empty.validate(&prompt, &FormattedResponse::Text(String::new())));
        assert!(AcceptAll.validate(&prompt, &FormattedResponse::Text(String::new())));
    }
}
