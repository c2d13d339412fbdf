//! Speech in and out.
//!
//! [`VoiceAdapter`] owns the two speech engines for the lifetime of the app
//! and exposes the same small surface the tutor UI needs: start/stop
//! listening, speak/cancel, a status line and the speaking flag that drives
//! the avatar.

pub mod endpoint;
pub mod recognizer;
pub mod synth;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::avatar::Gender;
use crate::error::Result;
use crate::form::VoiceLanguage;

pub use recognizer::{AudioSource, WhisperRecognizer};
pub use synth::EspeakSynthesizer;

pub const SPEECH_RATE: f32 = 0.9;
pub const MALE_PITCH: f32 = 0.9;
pub const FEMALE_PITCH: f32 = 1.1;

pub const STATUS_LISTENING: &str = "Listening...";
pub const STATUS_UNSUPPORTED: &str = "Speech recognition not supported on this system";

const FEMALE_HINTS: [&str; 6] = ["female", "woman", "samantha", "zira", "heera", "nicky"];
const MALE_HINTS: [&str; 5] = ["male", "man", "david", "rishi", "prabhat"];

/// Whether the host offers a speech engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Final transcript of the utterance
    Result(String),
    /// Error code (`no-speech`, `audio-capture`, `network`)
    Error(String),
    /// Session over, whatever the outcome
    End,
}

/// Speech-to-text engine: one non-continuous session at a time.
pub trait SpeechRecognizer {
    fn start(&mut self, language: VoiceLanguage) -> Result<()>;
    fn stop(&mut self);
    /// Events produced since the last poll, oldest first.
    fn poll(&mut self) -> Vec<RecognitionEvent>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// Language tag as reported by the engine (`en-in`, `gu`, ...)
    pub lang: String,
    /// Engine-specific identifier used to select the voice
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub language: VoiceLanguage,
    pub rate: f32,
    pub pitch: f32,
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    End(u64),
    Error(u64, String),
}

/// Text-to-speech engine: at most one utterance in flight.
pub trait SpeechSynthesizer {
    fn voices(&self) -> Vec<Voice>;
    fn speak(&mut self, utterance: Utterance) -> Result<()>;
    fn cancel(&mut self);
    fn poll(&mut self) -> Vec<SynthesisEvent>;
}

/// "Is the teacher talking": written by the adapter, read by the renderer.
#[derive(Debug, Clone, Default)]
pub struct SpeakingFlag(Arc<AtomicBool>);

impl SpeakingFlag {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, speaking: bool) {
        self.0.store(speaking, Ordering::Relaxed);
    }
}

pub fn pitch_for(gender: Option<Gender>) -> f32 {
    match gender {
        Some(Gender::Female) => FEMALE_PITCH,
        _ => MALE_PITCH,
    }
}

fn name_suits(name: &str, gender: Option<Gender>) -> bool {
    let name = name.to_lowercase();
    match gender {
        Some(Gender::Female) => FEMALE_HINTS.iter().any(|h| name.contains(h)),
        // "male" and "man" also occur inside "female"/"woman"
        _ => {
            !name.contains("female")
                && !name.contains("woman")
                && MALE_HINTS.iter().any(|h| name.contains(h))
        }
    }
}

/// Pick a voice for `language`: a gender-hinted name first, then any voice
/// of the language, else `None` (engine default).
pub fn choose_voice(voices: &[Voice], language: VoiceLanguage, gender: Option<Gender>) -> Option<Voice> {
    let matching: Vec<&Voice> = voices
        .iter()
        .filter(|v| v.lang.to_lowercase().starts_with(language.prefix()))
        .collect();

    matching
        .iter()
        .find(|v| name_suits(&v.name, gender))
        .or_else(|| matching.first())
        .map(|v| (*v).clone())
}

pub struct VoiceAdapter {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    listening: bool,
    status: String,
    speaking: SpeakingFlag,
    current_utterance: Option<u64>,
    next_utterance: u64,
}

impl VoiceAdapter {
    /// Engines that are `None` were found unavailable at startup.
    pub fn new(
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    ) -> Self {
        let adapter = Self {
            recognizer,
            synthesizer,
            listening: false,
            status: String::new(),
            speaking: SpeakingFlag::default(),
            current_utterance: None,
            next_utterance: 1,
        };
        log::info!(
            "Voice: recognition {:?}, synthesis {:?}",
            adapter.recognition(),
            adapter.synthesis()
        );
        adapter
    }

    pub fn recognition(&self) -> Capability {
        if self.recognizer.is_some() {
            Capability::Available
        } else {
            Capability::Unavailable
        }
    }

    pub fn synthesis(&self) -> Capability {
        if self.synthesizer.is_some() {
            Capability::Available
        } else {
            Capability::Unavailable
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.get()
    }

    pub fn speaking_flag(&self) -> SpeakingFlag {
        self.speaking.clone()
    }

    pub fn start_listening(&mut self, language: VoiceLanguage) {
        let Some(recognizer) = self.recognizer.as_mut() else {
            self.status = STATUS_UNSUPPORTED.to_string();
            return;
        };
        if self.listening {
            return;
        }

        match recognizer.start(language) {
            Ok(()) => {
                log::info!("Listening ({})", language);
                self.listening = true;
                self.status = STATUS_LISTENING.to_string();
            }
            Err(e) => {
                log::error!("Speech recognition failed to start: {}", e);
                self.listening = false;
                self.status = "Error: audio-capture".to_string();
            }
        }
    }

    pub fn stop_listening(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        self.listening = false;
        self.status.clear();
    }

    /// Mic button: start when idle, stop when listening.
    pub fn toggle_listening(&mut self, language: VoiceLanguage) {
        if self.recognizer.is_some() && self.listening {
            self.stop_listening();
        } else {
            self.start_listening(language);
        }
    }

    /// Drain both engines. Returns a recognized transcript, if one arrived;
    /// it should replace the pending input.
    pub fn poll(&mut self) -> Option<String> {
        let mut transcript = None;

        if let Some(recognizer) = self.recognizer.as_mut() {
            for event in recognizer.poll() {
                match event {
                    RecognitionEvent::Result(text) => {
                        log::info!("Recognized: {}", text);
                        self.status.clear();
                        transcript = Some(text);
                    }
                    RecognitionEvent::Error(code) => {
                        log::error!("Speech recognition error: {}", code);
                        self.listening = false;
                        self.status = format!("Error: {code}");
                    }
                    RecognitionEvent::End => self.listening = false,
                }
            }
        }

        if let Some(synthesizer) = self.synthesizer.as_mut() {
            for event in synthesizer.poll() {
                let (id, error) = match event {
                    SynthesisEvent::End(id) => (id, None),
                    SynthesisEvent::Error(id, e) => (id, Some(e)),
                };
                if self.current_utterance != Some(id) {
                    continue;
                }
                if let Some(e) = error {
                    log::warn!("Speech synthesis error: {}", e);
                }
                self.current_utterance = None;
                self.speaking.set(false);
            }
        }

        transcript
    }

    /// Say `text`, replacing anything still being spoken.
    pub fn speak(&mut self, text: &str, language: VoiceLanguage, gender: Option<Gender>) {
        let Some(synthesizer) = self.synthesizer.as_mut() else {
            log::error!("Speech synthesis not supported");
            return;
        };

        synthesizer.cancel();
        self.current_utterance = None;
        self.speaking.set(false);

        let id = self.next_utterance;
        self.next_utterance += 1;

        let utterance = Utterance {
            id,
            text: text.to_string(),
            language,
            rate: SPEECH_RATE,
            pitch: pitch_for(gender),
            voice: choose_voice(&synthesizer.voices(), language, gender),
        };
        log::debug!(
            "Speaking #{} with voice {:?}",
            id,
            utterance.voice.as_ref().map(|v| v.name.as_str())
        );

        self.speaking.set(true);
        self.current_utterance = Some(id);
        if let Err(e) = synthesizer.speak(utterance) {
            log::error!("Speech synthesis failed: {}", e);
            self.current_utterance = None;
            self.speaking.set(false);
        }
    }

    pub fn cancel_speech(&mut self) {
        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.cancel();
        }
        self.current_utterance = None;
        self.speaking.set(false);
    }
}

impl Drop for VoiceAdapter {
    fn drop(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.cancel();
        }
    }
}
