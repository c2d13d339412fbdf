use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::One => "1",
            Grade::Two => "2",
            Grade::Three => "3",
        }
    }
}

impl FromStr for Grade {
    type Err = FormError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Grade::One),
            "2" => Ok(Grade::Two),
            "3" => Ok(Grade::Three),
            other => Err(FormError::UnknownGrade(other.to_string())),
        }
    }
}

/// Instructional language track (distinct from the voice language).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medium {
    #[default]
    English,
    Gujarati,
}

impl Medium {
    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::English => "english",
            Medium::Gujarati => "gujarati",
        }
    }

    /// Voice language that goes with this medium by default
    pub fn voice_language(&self) -> VoiceLanguage {
        match self {
            Medium::English => VoiceLanguage::EnIn,
            Medium::Gujarati => VoiceLanguage::GuIn,
        }
    }
}

impl FromStr for Medium {
    type Err = FormError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Medium::English),
            "gujarati" | "gu" => Ok(Medium::Gujarati),
            other => Err(FormError::UnknownMedium(other.to_string())),
        }
    }
}

/// Language tag for speech input and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoiceLanguage {
    #[default]
    #[serde(rename = "en-IN")]
    EnIn,
    #[serde(rename = "hi-IN")]
    HiIn,
    #[serde(rename = "gu-IN")]
    GuIn,
}

impl VoiceLanguage {
    pub fn tag(&self) -> &'static str {
        match self {
            VoiceLanguage::EnIn => "en-IN",
            VoiceLanguage::HiIn => "hi-IN",
            VoiceLanguage::GuIn => "gu-IN",
        }
    }

    /// Primary subtag (`en` for `en-IN`)
    pub fn prefix(&self) -> &'static str {
        match self {
            VoiceLanguage::EnIn => "en",
            VoiceLanguage::HiIn => "hi",
            VoiceLanguage::GuIn => "gu",
        }
    }
}

impl fmt::Display for VoiceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for VoiceLanguage {
    type Err = FormError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en-in" | "en" => Ok(VoiceLanguage::EnIn),
            "hi-in" | "hi" => Ok(VoiceLanguage::HiIn),
            "gu-in" | "gu" => Ok(VoiceLanguage::GuIn),
            other => Err(FormError::UnknownLanguage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Unknown grade '{0}' (expected 1, 2 or 3)")]
    UnknownGrade(String),
    #[error("Unknown medium '{0}' (expected english or gujarati)")]
    UnknownMedium(String),
    #[error("Unknown voice language '{0}' (expected en-IN, hi-IN or gu-IN)")]
    UnknownLanguage(String),
    #[error("Select a grade first")]
    GradeRequired,
    #[error("'{subject}' is not offered here; choose one of: {}", .available.join(", "))]
    UnknownSubject {
        subject: String,
        available: Vec<&'static str>,
    },
}

/// Subjects offered for a grade in a medium. Empty until a grade is chosen.
pub fn available_subjects(grade: Option<Grade>, medium: Medium) -> &'static [&'static str] {
    match (grade, medium) {
        (None, _) => &[],
        (Some(Grade::Three), Medium::English) => &["English", "Maths", "EVS"],
        (Some(_), Medium::English) => &["English", "Maths"],
        (Some(Grade::Three), Medium::Gujarati) => &["EVS", "Maths", "Gujarati"],
        (Some(_), Medium::Gujarati) => &["Maths", "Gujarati"],
    }
}

/// Subject as the backend expects it: Gujarati-medium subjects are namespaced.
pub fn wire_subject(subject: &str, medium: Medium) -> String {
    match medium {
        Medium::Gujarati => format!("gujarati_{subject}"),
        Medium::English => subject.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub text: String,
}

/// File sent alongside a question (e.g. a photo of a worksheet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self { file_name, bytes })
    }
}

/// One question as captured at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub message: String,
    pub grade: Grade,
    /// Subject as sent on the wire (see [`wire_subject`])
    pub subject: String,
    pub medium: Medium,
    pub attachment: Option<Attachment>,
}

/// Selections, pending input and the conversation so far.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    grade: Option<Grade>,
    medium: Medium,
    subject: String,
    language: VoiceLanguage,
    input: String,
    attachment: Option<Attachment>,
    transcript: Vec<ConversationMessage>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grade(&self) -> Option<Grade> {
        self.grade
    }

    pub fn medium(&self) -> Medium {
        self.medium
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn language(&self) -> VoiceLanguage {
        self.language
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn transcript(&self) -> &[ConversationMessage] {
        &self.transcript
    }

    pub fn available_subjects(&self) -> &'static [&'static str] {
        available_subjects(self.grade, self.medium)
    }

    /// Pick (or clear) the grade. The subject is reset.
    pub fn set_grade(&mut self, grade: Option<Grade>) {
        self.grade = grade;
        self.subject.clear();
    }

    /// Pick the medium. The subject is reset and the voice language follows
    /// the medium. Not allowed before a grade is chosen.
    pub fn set_medium(&mut self, medium: Medium) -> std::result::Result<(), FormError> {
        if self.grade.is_none() {
            return Err(FormError::GradeRequired);
        }
        self.medium = medium;
        self.subject.clear();
        self.language = medium.voice_language();
        Ok(())
    }

    /// Pick a subject from the currently offered set (case-insensitive).
    pub fn set_subject(&mut self, subject: &str) -> std::result::Result<(), FormError> {
        let available = self.available_subjects();
        match available
            .iter()
            .find(|s| s.eq_ignore_ascii_case(subject.trim()))
        {
            Some(canonical) => {
                self.subject = canonical.to_string();
                Ok(())
            }
            None if self.grade.is_none() => Err(FormError::GradeRequired),
            None => Err(FormError::UnknownSubject {
                subject: subject.trim().to_string(),
                available: available.to_vec(),
            }),
        }
    }

    pub fn set_language(&mut self, language: VoiceLanguage) {
        self.language = language;
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.attachment = Some(attachment);
    }

    pub fn detach(&mut self) -> Option<Attachment> {
        self.attachment.take()
    }

    pub fn can_send(&self) -> bool {
        self.grade.is_some() && !self.subject.is_empty() && !self.input.trim().is_empty()
    }

    /// Capture the pending question and clear the input box.
    ///
    /// The input is cleared right away, whatever the request outcome.
    pub fn submit(&mut self) -> Option<Submission> {
        if !self.can_send() {
            return None;
        }
        let grade = self.grade?;

        Some(Submission {
            message: std::mem::take(&mut self.input),
            grade,
            subject: wire_subject(&self.subject, self.medium),
            medium: self.medium,
            attachment: self.attachment.clone(),
        })
    }

    /// Record a finished exchange: the question, then the answer.
    pub fn complete(&mut self, submission: &Submission, answer: impl Into<String>) {
        self.transcript.push(ConversationMessage {
            role: Role::User,
            text: submission.message.clone(),
        });
        self.transcript.push(ConversationMessage {
            role: Role::Bot,
            text: answer.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRADES: [Option<Grade>; 4] = [None, Some(Grade::One), Some(Grade::Two), Some(Grade::Three)];

    fn ready_form() -> FormState {
        let mut form = FormState::new();
        form.set_grade(Some(Grade::One));
        form.set_subject("Maths").unwrap();
        form
    }

    #[test]
    fn test_available_subjects_table() {
        let expected: [(Option<Grade>, Medium, &[&str]); 8] = [
            (None, Medium::English, &[]),
            (None, Medium::Gujarati, &[]),
            (Some(Grade::One), Medium::English, &["English", "Maths"]),
            (Some(Grade::Two), Medium::English, &["English", "Maths"]),
            (Some(Grade::Three), Medium::English, &["English", "Maths", "EVS"]),
            (Some(Grade::One), Medium::Gujarati, &["Maths", "Gujarati"]),
            (Some(Grade::Two), Medium::Gujarati, &["Maths", "Gujarati"]),
            (Some(Grade::Three), Medium::Gujarati, &["EVS", "Maths", "Gujarati"]),
        ];
        for (grade, medium, subjects) in expected {
            assert_eq!(available_subjects(grade, medium), subjects, "{grade:?} {medium:?}");
        }
    }

    #[test]
    fn test_grade_change_resets_subject() {
        for grade in GRADES {
            let mut form = FormState::new();
            form.set_grade(Some(Grade::Three));
            form.set_subject("EVS").unwrap();
            form.set_grade(grade);
            assert_eq!(form.subject(), "");
        }
    }

    #[test]
    fn test_medium_change_resets_subject_and_language() {
        for medium in [Medium::English, Medium::Gujarati] {
            let mut form = FormState::new();
            form.set_grade(Some(Grade::Three));
            form.set_subject("Maths").unwrap();
            form.set_medium(medium).unwrap();
            assert_eq!(form.subject(), "");
            assert_eq!(form.language(), medium.voice_language());
        }

        let mut form = ready_form();
        form.set_medium(Medium::Gujarati).unwrap();
        assert_eq!(form.language(), VoiceLanguage::GuIn);
        form.set_language(VoiceLanguage::HiIn);
        assert_eq!(form.language(), VoiceLanguage::HiIn);
    }

    #[test]
    fn test_medium_requires_grade() {
        let mut form = FormState::new();
        assert_eq!(form.set_medium(Medium::Gujarati), Err(FormError::GradeRequired));
        assert_eq!(form.medium(), Medium::English);
    }

    #[test]
    fn test_subject_must_be_offered() {
        let mut form = FormState::new();
        assert_eq!(form.set_subject("Maths"), Err(FormError::GradeRequired));

        form.set_grade(Some(Grade::One));
        assert!(matches!(
            form.set_subject("EVS"),
            Err(FormError::UnknownSubject { .. })
        ));
        form.set_subject("maths").unwrap();
        assert_eq!(form.subject(), "Maths");
    }

    #[test]
    fn test_send_gating() {
        let mut form = FormState::new();
        form.set_input("2+2=?");
        assert!(!form.can_send());

        form.set_grade(Some(Grade::One));
        assert!(!form.can_send());

        form.set_subject("Maths").unwrap();
        assert!(form.can_send());

        for blank in ["", "   ", "\t\n"] {
            form.set_input(blank);
            assert!(!form.can_send());
            assert!(form.submit().is_none());
        }
    }

    #[test]
    fn test_wire_subject() {
        assert_eq!(wire_subject("Maths", Medium::English), "Maths");
        assert_eq!(wire_subject("Maths", Medium::Gujarati), "gujarati_Maths");
    }

    #[test]
    fn test_submit_clears_input_and_captures_fields() {
        let mut form = FormState::new();
        form.set_grade(Some(Grade::Three));
        form.set_medium(Medium::Gujarati).unwrap();
        form.set_subject("EVS").unwrap();
        form.attach(Attachment {
            file_name: "page.png".into(),
            bytes: vec![1, 2, 3],
        });
        form.set_input("What is a plant?");

        let submission = form.submit().unwrap();
        assert_eq!(form.input(), "");
        assert_eq!(submission.message, "What is a plant?");
        assert_eq!(submission.grade, Grade::Three);
        assert_eq!(submission.subject, "gujarati_EVS");
        assert_eq!(submission.medium, Medium::Gujarati);
        assert_eq!(submission.attachment.unwrap().file_name, "page.png");
        // Attachment stays selected for the next question
        assert!(form.attachment().is_some());
        assert!(form.transcript().is_empty());
    }

    #[test]
    fn test_complete_appends_user_then_bot() {
        let mut form = ready_form();
        form.set_input("first");
        let first = form.submit().unwrap();
        form.set_input("second");
        let second = form.submit().unwrap();

        // Second answer arrives first; each pair stays together
        form.complete(&second, "two");
        form.complete(&first, "one");

        let texts: Vec<_> = form
            .transcript()
            .iter()
            .map(|m| (m.role, m.text.as_str()))
            .collect();
        assert_eq!(
            texts,
            vec![
                (Role::User, "second"),
                (Role::Bot, "two"),
                (Role::User, "first"),
                (Role::Bot, "one"),
            ]
        );
    }

    #[test]
    fn test_parse_selections() {
        assert_eq!("2".parse::<Grade>(), Ok(Grade::Two));
        assert!("4".parse::<Grade>().is_err());
        assert_eq!("Gujarati".parse::<Medium>(), Ok(Medium::Gujarati));
        assert_eq!("hi-IN".parse::<VoiceLanguage>(), Ok(VoiceLanguage::HiIn));
        assert_eq!(VoiceLanguage::GuIn.to_string(), "gu-IN");
    }
}
