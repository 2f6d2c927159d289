use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{AnalysisError, AnalysisOutcome, FoodAnalysisResult, RawImage};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a nutrition expert. For every photo you receive, identify the \
food it shows and estimate its nutritional content. Report one entry per distinct food item, in \
the same order as the photos. For each entry give a short human-readable dish name, the grams of \
protein, fat, carbohydrate and fibre, the total mass in grams, the total energy in kcal, a health \
score from 1 (very unhealthy) to 10 (very healthy), the degree of industrial processing (low, \
medium or high), and the list of visible components or ingredients. All quantities are \
whole-number estimates for the entire portion shown. If a photo contains no food, do not invent \
an entry; return an empty list of foods.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Images(Vec<ImagePart>),
}

#[derive(Debug, Serialize)]
struct ImagePart {
    #[serde(rename = "type")]
    content_type: String,
    image_url: ImageData,
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// The output contract imposed on the model. Mirrors `FoodAnalysisResult`;
/// with `strict` mode the model either emits data of this shape or refuses.
fn analysis_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "foods": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "readable_name": { "type": "string" },
                        "protein_g": { "type": "integer" },
                        "fat_g": { "type": "integer" },
                        "carbohydrate_g": { "type": "integer" },
                        "fibre_g": { "type": "integer" },
                        "total_mass_g": { "type": "integer" },
                        "total_kcal": { "type": "integer" },
                        "total_health_score": { "type": "integer" },
                        "processing_degree": { "type": "string", "enum": ["low", "medium", "high"] },
                        "components": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": [
                        "readable_name", "protein_g", "fat_g", "carbohydrate_g", "fibre_g",
                        "total_mass_g", "total_kcal", "total_health_score", "processing_degree",
                        "components"
                    ],
                    "additionalProperties": false
                }
            }
        },
        "required": ["foods"],
        "additionalProperties": false
    })
}

/// Vision analysis collaborator: a batch of images in, one terminal
/// `AnalysisOutcome` out. One round trip per call, no retries.
#[async_trait]
pub trait VisionService: Send + Sync {
    async fn analyze(&self, images: &[RawImage]) -> AnalysisOutcome;
}

pub struct OpenAiVisionClient {
    api_key: String,
    model: String,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiVisionClient {
    pub fn new(api_key: String, model: String, max_output_tokens: u32) -> Self {
        Self {
            api_key,
            model,
            max_output_tokens,
            client: reqwest::Client::new(),
        }
    }

    fn build_request(&self, images: &[RawImage]) -> ChatRequest {
        let parts = images
            .iter()
            .map(|bytes| {
                let encoded = general_purpose::STANDARD.encode(bytes);
                ImagePart {
                    content_type: "image_url".to_string(),
                    image_url: ImageData {
                        url: format!("data:image/jpeg;base64,{}", encoded),
                    },
                }
            })
            .collect();

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: MessageContent::Images(parts),
                },
            ],
            max_completion_tokens: self.max_output_tokens,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "food_analysis".to_string(),
                    strict: true,
                    schema: analysis_schema(),
                },
            },
        }
    }

    async fn request_analysis(
        &self,
        images: &[RawImage],
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let request = self.build_request(images);
        log::info!(
            "🤖 Sending {} image(s) to {} for analysis",
            images.len(),
            self.model
        );

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await?;
            log::error!("❌ Vision API error ({}): {}", status, detail);
            return Err(AnalysisError::Api { status, detail });
        }

        let chat: ChatResponse = response.json().await?;
        Ok(decode_outcome(chat, self.max_output_tokens))
    }
}

#[async_trait]
impl VisionService for OpenAiVisionClient {
    async fn analyze(&self, images: &[RawImage]) -> AnalysisOutcome {
        match self.request_analysis(images).await {
            Ok(outcome) => outcome,
            Err(err) => AnalysisOutcome::Failed(err),
        }
    }
}

/// Maps one chat response onto the three-way outcome. Pure so the decode
/// rules stay testable without a live endpoint.
fn decode_outcome(response: ChatResponse, max_tokens: u32) -> AnalysisOutcome {
    let choice = match response.choices.into_iter().next() {
        Some(choice) => choice,
        None => {
            return AnalysisOutcome::Failed(AnalysisError::Malformed(
                "response contained no choices".to_string(),
            ))
        }
    };

    // A truncated structured response is unusable, whatever made it through.
    if choice.finish_reason.as_deref() == Some("length") {
        return AnalysisOutcome::Failed(AnalysisError::LengthLimit {
            max_tokens,
        });
    }

    if let Some(reason) = choice.message.refusal {
        log::info!("🚫 Model refused: {}", reason);
        return AnalysisOutcome::Refusal(reason);
    }

    let content = match choice.message.content {
        Some(content) => content,
        None => {
            return AnalysisOutcome::Failed(AnalysisError::Malformed(
                "response contained neither content nor refusal".to_string(),
            ))
        }
    };

    let result: FoodAnalysisResult = match serde_json::from_str(&content) {
        Ok(result) => result,
        Err(err) => return AnalysisOutcome::Failed(AnalysisError::Malformed(err.to_string())),
    };

    for food in &result.foods {
        if let Err(violation) = food.check_invariants() {
            return AnalysisOutcome::Failed(AnalysisError::SchemaViolation(violation));
        }
    }

    log::info!("✅ Analysis parsed: {} food item(s)", result.foods.len());
    AnalysisOutcome::Success(result)
}
