use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Serialize, Deserialize)]
pub struct GroqTranscriptionResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroqError {
    pub error: GroqErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroqErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

/// Whisper transcription over Groq's OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, GROQ_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Transcribe one short utterance (16-bit mono WAV).
    ///
    /// `language` is an ISO-639-1 code (`en`, `hi`, `gu`).
    pub async fn transcribe(&self, wav: Vec<u8>, language: &str) -> Result<String> {
        log::info!(
            "Transcribing {:.1} KB utterance (language={})",
            wav.len() as f32 / 1024.0,
            language
        );

        let file_part = Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "json")
            .text("temperature", "0");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if status.is_success() {
            let parsed: GroqTranscriptionResponse = serde_json::from_str(&response_text)?;
            Ok(parsed.text.trim().to_string())
        } else if let Ok(error_response) = serde_json::from_str::<GroqError>(&response_text) {
            Err(Error::Api(format!(
                "Groq API error: {}",
                error_response.error.message
            )))
        } else {
            Err(Error::Api(format!("HTTP error {}: {}", status, response_text)))
        }
    }
}
