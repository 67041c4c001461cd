//! Feedback Classification Module
//!
//! Assigns a [`FeedbackCategory`] to raw feedback text via a hosted
//! chat-completion endpoint. Classification is best-effort: any failure
//! (transport, non-2xx, unparseable output) degrades to `Other` so the
//! ingestion path never loses feedback over a flaky model.
//!
//! # Environment Variables
//! - `UPVIEW_CLASSIFIER_URL`: Chat completions endpoint
//! - `UPVIEW_CLASSIFIER_API_KEY`: Bearer token for the endpoint
//! - `UPVIEW_CLASSIFIER_MODEL`: Model identifier

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;
use upview_core::FeedbackCategory;

const DEFAULT_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo";

/// Classification seam. Production uses [`InferenceClassifier`]; tests
/// substitute a fixed-answer fake.
#[async_trait]
pub trait FeedbackClassifier: Send + Sync {
    /// Categorize one piece of feedback text. Infallible by contract;
    /// implementations degrade to [`FeedbackCategory::Other`].
    async fn classify(&self, text: &str) -> FeedbackCategory;
}

/// Classifier backed by an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct InferenceClassifier {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl InferenceClassifier {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a classifier from environment variables. Returns `None`
    /// when no endpoint is configured, in which case everything
    /// classifies as `Other`.
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        let url = std::env::var("UPVIEW_CLASSIFIER_URL").ok()?;
        let api_key = std::env::var("UPVIEW_CLASSIFIER_API_KEY").ok()?;
        let model =
            std::env::var("UPVIEW_CLASSIFIER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self {
            client,
            url,
            api_key,
            model,
        })
    }

    fn prompt(text: &str) -> String {
        format!(
            "Categorize the following game feedback as exactly one word from: \
             bug, suggestion, spam, rude, other.\n\
             - bug: describes something broken or not working\n\
             - suggestion: a feature or improvement idea\n\
             - spam: irrelevant, unreadable, promotional, or repeated content\n\
             - rude: contains insults, profanity, or offensive language\n\
             - other: anything else\n\
             Respond with only the single lowercase word.\n\n\
             Feedback: {text}"
        )
    }

    async fn classify_inner(&self, text: &str) -> Result<FeedbackCategory, crate::error::ApiError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "max_tokens": 8,
                "messages": [{ "role": "user", "content": Self::prompt(text) }],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(crate::error::ApiError::upstream(format!(
                "classifier returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let word = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_lowercase();

        // Unknown words collapse to Other rather than erroring.
        Ok(word.parse().unwrap_or_default())
    }
}

#[async_trait]
impl FeedbackClassifier for InferenceClassifier {
    async fn classify(&self, text: &str) -> FeedbackCategory {
        match self.classify_inner(text).await {
            Ok(category) => category,
            Err(e) => {
                warn!(error = %e, "feedback classification failed, defaulting to other");
                FeedbackCategory::Other
            }
        }
    }
}

/// Classifier that never calls out; everything is `Other`. Used when no
/// classifier endpoint is configured.
#[derive(Clone, Default)]
pub struct NoopClassifier;

#[async_trait]
impl FeedbackClassifier for NoopClassifier {
    async fn classify(&self, _text: &str) -> FeedbackCategory {
        FeedbackCategory::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_the_feedback() {
        let prompt = InferenceClassifier::prompt("the door is stuck");
        assert!(prompt.contains("Feedback: the door is stuck"));
        for label in FeedbackCategory::LABELS {
            assert!(prompt.contains(label), "prompt missing label {label}");
        }
    }

    #[tokio::test]
    async fn test_noop_classifier_is_other() {
        let classifier = NoopClassifier;
        assert_eq!(
            classifier.classify("anything at all").await,
            FeedbackCategory::Other
        );
    }
}
