//! Free-text commentary about movies from an OpenAI-compatible chat
//! completion endpoint, with prompts built from stored reviews.

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::debug;

use crate::error::ReviewError;
use crate::models::review::{Review, UserReview};

pub trait TextGenerator: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ReviewError>>;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Debug)]
struct ChatErrorBody {
    error: ChatErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ChatErrorDetail {
    message: String,
}

pub struct ChatCompletionClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionClient {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        ChatCompletionClient {
            client,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

impl TextGenerator for ChatCompletionClient {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ReviewError>> {
        async move {
            let request = ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user".into(),
                    content: prompt.to_string(),
                }],
            };

            debug!(model = %self.model, prompt_len = prompt.len(), "requesting completion");
            let response = self
                .client
                .post(&self.url)
                .header("api-key", self.api_key.as_str())
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                // Fall back to the bare status when the body is not the usual error shape
                let message = match response.json::<ChatErrorBody>().await {
                    Ok(body) => body.error.message,
                    Err(_) => format!("text generation answered with status {}", status),
                };
                return Err(ReviewError::External(message));
            }

            let body: ChatResponse = response.json().await?;
            body.choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| ReviewError::External("text generation returned no choices".into()))
        }
        .boxed()
    }
}

/// Used when no text generation endpoint is configured.
pub struct DisabledGenerator;

impl TextGenerator for DisabledGenerator {
    fn generate<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String, ReviewError>> {
        async { Err(ReviewError::External("text generation is not configured".into())) }.boxed()
    }
}

/// Prompt asking for commentary on one movie. `personal` carries the
/// requester's own ratings when the answer should be tailored to them.
pub fn examine_prompt(
    movie: &str,
    reviews: &[Review],
    average: f64,
    personal: Option<&[UserReview]>,
) -> String {
    let mut prompt = format!("What do you think about the movie \"{}\"?", movie);

    if !reviews.is_empty() {
        let _ = write!(
            prompt,
            "\nOur group rated it {:.1} out of 10 on average. Their comments:",
            average
        );
        for review in reviews {
            let _ = write!(prompt, "\n- {:.1}: {}", review.score, review.comment);
        }
    }

    if let Some(own) = personal.filter(|own| !own.is_empty()) {
        prompt.push_str("\nTailor the answer to a viewer who rated these movies (out of 10):");
        for entry in own {
            let _ = write!(prompt, "\n- {}: {:.1}", entry.movie_name, entry.review.score);
        }
    }

    prompt.push_str("\nKeep the answer under 200 words.");
    prompt
}

/// Prompt asking for three recommendations given `(movie, score)` pairs.
pub fn recommend_prompt(rated: &[(String, f64)]) -> String {
    let mut prompt = String::from("Here are movies with their scores out of 10:");
    for (movie, score) in rated {
        let _ = write!(prompt, "\n- {}: {:.1}", movie, score);
    }
    prompt.push_str(
        "\nRecommend 3 other movies that fit these tastes, one line each with a short reason.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn examine_prompt_includes_reviews_and_personal_list() {
        let reviews = vec![Review::new("u1", 8.0, "tight plot")];
        let own = vec![UserReview {
            movie_name: "heat".into(),
            review: Review::new("u2", 9.0, ""),
        }];

        let prompt = examine_prompt("ronin", &reviews, 8.0, Some(own.as_slice()));

        assert!(prompt.contains("\"ronin\""));
        assert!(prompt.contains("8.0 out of 10"));
        assert!(prompt.contains("- 8.0: tight plot"));
        assert!(prompt.contains("- heat: 9.0"));
    }

    #[test]
    fn examine_prompt_without_context_only_names_the_movie() {
        let prompt = examine_prompt("ronin", &[], 0.0, None);
        assert!(!prompt.contains("on average"));
        assert!(!prompt.contains("Tailor"));
    }

    #[test]
    fn recommend_prompt_lists_every_rating() {
        let prompt = recommend_prompt(&[("heat".into(), 9.0), ("alien".into(), 7.5)]);
        assert!(prompt.contains("- heat: 9.0"));
        assert!(prompt.contains("- alien: 7.5"));
        assert!(prompt.contains("Recommend 3"));
    }
}
