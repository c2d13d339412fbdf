use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::form::{Medium, Submission};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/ask";

const APOLOGY_ENGLISH: &str = "Sorry, I encountered an error. Please try again.";
const APOLOGY_GUJARATI: &str = "માફ કરશો, કોઈ ભૂલ થઈ. કૃપા કરીને ફરી પ્રયાસ કરો.";

/// Canned answer shown (and spoken) when the tutor cannot be reached.
pub fn apology(medium: Medium) -> &'static str {
    match medium {
        Medium::English => APOLOGY_ENGLISH,
        Medium::Gujarati => APOLOGY_GUJARATI,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

/// Client for the question-answering backend (`POST /ask`).
#[derive(Clone)]
pub struct TutorClient {
    client: Client,
    endpoint: String,
}

impl TutorClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn form(submission: &Submission) -> Result<Form> {
        let mut form = Form::new()
            .text("message", submission.message.clone())
            .text("grade", submission.grade.as_str().to_string())
            .text("subject", submission.subject.clone());

        if let Some(file) = &submission.attachment {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str("application/octet-stream")?;
            form = form.part("file", part);
        }
        Ok(form)
    }

    /// One round trip; any failure is returned as an error.
    pub async fn try_ask(&self, submission: &Submission) -> Result<String> {
        log::info!(
            "Asking tutor: grade={} subject={} file={}",
            submission.grade.as_str(),
            submission.subject,
            submission
                .attachment
                .as_ref()
                .map(|a| a.file_name.as_str())
                .unwrap_or("none")
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(Self::form(submission)?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: AskResponse = serde_json::from_str(&body)?;
        log::info!("Tutor answered ({} chars)", parsed.answer.chars().count());
        Ok(parsed.answer)
    }

    /// Ask the tutor. Failures come back as the localized apology so the
    /// caller can treat every outcome as an answer.
    pub async fn ask(&self, submission: &Submission) -> String {
        match self.try_ask(submission).await {
            Ok(answer) => answer,
            Err(e) => {
                log::error!("Tutor request failed: {}", e);
                apology(submission.medium).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{Attachment, FormState, Grade, Role};
    use crate::api::test_server::{dead_server, one_shot_server};

    async fn ask_server(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let (base, handle) = one_shot_server(status, body).await;
        (format!("{base}/ask"), handle)
    }

    fn maths_question(text: &str, medium: crate::form::Medium) -> (FormState, Submission) {
        let mut form = FormState::new();
        form.set_grade(Some(Grade::One));
        form.set_medium(medium).unwrap();
        form.set_subject("Maths").unwrap();
        form.set_input(text);
        let submission = form.submit().unwrap();
        (form, submission)
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = TutorClient::new(DEFAULT_ENDPOINT);
        assert_eq!(client.endpoint(), "http://127.0.0.1:8000/ask");
    }

    #[tokio::test]
    async fn test_answer_is_returned() {
        let (endpoint, server) = ask_server("200 OK", r#"{"answer":"4"}"#).await;
        let (_, submission) = maths_question("2+2=?", Medium::English);

        let answer = TutorClient::new(endpoint).ask(&submission).await;
        assert_eq!(answer, "4");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /ask"));
        assert!(request.contains("name=\"message\"\r\n\r\n2+2=?"));
        assert!(request.contains("name=\"grade\"\r\n\r\n1"));
        assert!(request.contains("name=\"subject\"\r\n\r\nMaths"));
        assert!(!request.contains("name=\"file\""));
    }

    #[tokio::test]
    async fn test_gujarati_subject_and_file_are_sent() {
        let (endpoint, server) = ask_server("200 OK", r#"{"answer":"ચાર"}"#).await;
        let (_, mut submission) = maths_question("૨+૨?", Medium::Gujarati);
        submission.attachment = Some(Attachment {
            file_name: "sum.png".into(),
            bytes: b"PNGDATA".to_vec(),
        });

        let answer = TutorClient::new(endpoint).ask(&submission).await;
        assert_eq!(answer, "ચાર");

        let request = server.await.unwrap();
        assert!(request.contains("name=\"subject\"\r\n\r\ngujarati_Maths"));
        assert!(request.contains("name=\"file\"; filename=\"sum.png\""));
        assert!(request.contains("PNGDATA"));
    }

    #[tokio::test]
    async fn test_network_failure_appends_english_apology() {
        let (mut form, submission) = maths_question("2+2=?", Medium::English);
        let client = TutorClient::new(format!("{}/ask", dead_server().await));

        assert!(client.try_ask(&submission).await.is_err());
        let answer = client.ask(&submission).await;
        form.complete(&submission, answer);

        let transcript = form.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[0].text, "2+2=?");
        assert_eq!(transcript[1].role, Role::Bot);
        assert_eq!(
            transcript[1].text,
            "Sorry, I encountered an error. Please try again."
        );
    }

    #[tokio::test]
    async fn test_server_error_uses_gujarati_apology() {
        let (endpoint, _server) =
            ask_server("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
        let (_, submission) = maths_question("પ્રશ્ન", Medium::Gujarati);

        let answer = TutorClient::new(endpoint).ask(&submission).await;
        assert_eq!(answer, apology(Medium::Gujarati));
    }

    #[tokio::test]
    async fn test_body_without_answer_is_a_failure() {
        let (endpoint, _server) = ask_server("200 OK", r#"{"result":"4"}"#).await;
        let (_, submission) = maths_question("2+2=?", Medium::English);

        let client = TutorClient::new(endpoint);
        assert!(matches!(client.try_ask(&submission).await, Err(Error::Json(_))));
    }
}
