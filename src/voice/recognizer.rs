use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Instant;
use tokio::runtime::Handle;

use super::endpoint::{EndpointConfig, EndpointDecision, Endpointer};
use super::{RecognitionEvent, SpeechRecognizer};
use crate::api::GroqClient;
use crate::audio::MicRecorder;
use crate::error::Result;
use crate::form::VoiceLanguage;

/// Capture device for one utterance at a time.
pub trait AudioSource {
    fn start(&mut self) -> Result<()>;
    /// Close the device and return the utterance as WAV.
    fn stop(&mut self) -> Result<Vec<u8>>;
    fn discard(&mut self);
    /// Current input level (RMS)
    fn level(&self) -> f32;
}

impl AudioSource for MicRecorder {
    fn start(&mut self) -> Result<()> {
        MicRecorder::start(self)
    }

    fn stop(&mut self) -> Result<Vec<u8>> {
        MicRecorder::stop(self)
    }

    fn discard(&mut self) {
        MicRecorder::discard(self)
    }

    fn level(&self) -> f32 {
        MicRecorder::level(self)
    }
}

struct Session {
    started: Instant,
    endpointer: Endpointer,
    language: VoiceLanguage,
}

/// Audio capture ended by silence, transcribed by Groq Whisper.
///
/// Every `start`/`stop` bumps the generation; events are tagged with the
/// generation they belong to and anything older is dropped on poll, so a
/// transcription still in flight when the user stops or restarts never
/// reaches the adapter.
pub struct WhisperRecognizer<S = MicRecorder> {
    source: S,
    groq: GroqClient,
    runtime: Handle,
    endpoint: EndpointConfig,
    session: Option<Session>,
    generation: u64,
    tx: Sender<(u64, RecognitionEvent)>,
    rx: Receiver<(u64, RecognitionEvent)>,
}

impl WhisperRecognizer<MicRecorder> {
    /// `None` when there is no API key or no microphone.
    pub fn probe(groq: GroqClient, runtime: Handle, endpoint: EndpointConfig) -> Option<Self> {
        if !groq.has_api_key() {
            log::warn!("No Groq API key - speech recognition disabled");
            return None;
        }
        match MicRecorder::new() {
            Ok(recorder) => Some(Self::new(recorder, groq, runtime, endpoint)),
            Err(e) => {
                log::warn!("No microphone - speech recognition disabled: {}", e);
                None
            }
        }
    }
}

impl<S: AudioSource> WhisperRecognizer<S> {
    pub fn new(source: S, groq: GroqClient, runtime: Handle, endpoint: EndpointConfig) -> Self {
        let (tx, rx) = unbounded();
        Self {
            source,
            groq,
            runtime,
            endpoint,
            session: None,
            generation: 0,
            tx,
            rx,
        }
    }

    fn fail(&self, code: &str) {
        let _ = self.tx.send((self.generation, RecognitionEvent::Error(code.to_string())));
        let _ = self.tx.send((self.generation, RecognitionEvent::End));
    }

    fn finish(&mut self, language: VoiceLanguage) {
        let wav = match self.source.stop() {
            Ok(wav) => wav,
            Err(e) => {
                log::error!("Recording failed: {}", e);
                self.fail("audio-capture");
                return;
            }
        };

        let generation = self.generation;
        let groq = self.groq.clone();
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let event = match groq.transcribe(wav, language.prefix()).await {
                Ok(text) if text.trim().is_empty() => RecognitionEvent::Error("no-speech".into()),
                Ok(text) => RecognitionEvent::Result(text.trim().to_string()),
                Err(e) => {
                    log::error!("Transcription failed: {}", e);
                    RecognitionEvent::Error("network".into())
                }
            };
            let _ = tx.send((generation, event));
            let _ = tx.send((generation, RecognitionEvent::End));
        });
    }
}

impl<S: AudioSource> SpeechRecognizer for WhisperRecognizer<S> {
    fn start(&mut self, language: VoiceLanguage) -> Result<()> {
        if self.session.take().is_some() {
            self.source.discard();
        }
        self.generation += 1;
        self.source.start()?;
        self.session = Some(Session {
            started: Instant::now(),
            endpointer: Endpointer::new(self.endpoint),
            language,
        });
        Ok(())
    }

    fn stop(&mut self) {
        // Also invalidates a transcription still in flight
        self.generation += 1;
        if self.session.take().is_some() {
            self.source.discard();
            log::debug!("Recognition session aborted");
        }
    }

    fn poll(&mut self) -> Vec<RecognitionEvent> {
        if let Some(session) = self.session.as_mut() {
            let level = self.source.level();
            let decision = session.endpointer.update(session.started.elapsed(), level);
            let language = session.language;
            match decision {
                EndpointDecision::Continue => {}
                EndpointDecision::Finished => {
                    self.session = None;
                    self.finish(language);
                }
                EndpointDecision::NoSpeech => {
                    self.session = None;
                    self.source.discard();
                    self.fail("no-speech");
                }
            }
        }

        let current = self.generation;
        self.rx
            .try_iter()
            .filter_map(|(generation, event)| {
                if generation == current {
                    Some(event)
                } else {
                    log::debug!("Dropping stale recognition event {:?}", event);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_server::{dead_server, one_shot_server};
    use crate::error::Error;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Script {
        level: f32,
        recording: bool,
        fail_stop: bool,
        log: Vec<&'static str>,
    }

    /// Level and WAV come from a shared script instead of a microphone
    #[derive(Clone, Default)]
    struct ScriptedSource(Arc<Mutex<Script>>);

    impl AudioSource for ScriptedSource {
        fn start(&mut self) -> Result<()> {
            let mut s = self.0.lock().unwrap();
            if s.recording {
                return Err(Error::Audio("Already recording".into()));
            }
            s.recording = true;
            s.log.push("start");
            Ok(())
        }

        fn stop(&mut self) -> Result<Vec<u8>> {
            let mut s = self.0.lock().unwrap();
            s.recording = false;
            s.log.push("stop");
            if s.fail_stop {
                Err(Error::Audio("No audio captured".into()))
            } else {
                Ok(b"RIFFWAVE".to_vec())
            }
        }

        fn discard(&mut self) {
            let mut s = self.0.lock().unwrap();
            s.recording = false;
            s.log.push("discard");
        }

        fn level(&self) -> f32 {
            self.0.lock().unwrap().level
        }
    }

    /// Any loud poll ends the utterance; a silent poll is no-speech.
    fn instant_endpoint() -> EndpointConfig {
        EndpointConfig {
            threshold: 0.1,
            trailing_silence: Duration::ZERO,
            no_speech_timeout: Duration::ZERO,
            max_utterance: Duration::from_secs(60),
        }
    }

    fn recognizer(base_url: String, source: ScriptedSource) -> WhisperRecognizer<ScriptedSource> {
        let groq = GroqClient::with_base_url("gsk_test".into(), "whisper-large-v3-turbo".into(), base_url);
        WhisperRecognizer::new(source, groq, Handle::current(), instant_endpoint())
    }

    /// Poll until `count` events have arrived (or give up after ~2s).
    async fn collect(rec: &mut WhisperRecognizer<ScriptedSource>, count: usize) -> Vec<RecognitionEvent> {
        let mut events = Vec::new();
        for _ in 0..200 {
            events.extend(rec.poll());
            if events.len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        events
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_utterance_is_transcribed() {
        let (base, server) = one_shot_server("200 OK", r#"{"text":" two plus two "}"#).await;
        let source = ScriptedSource::default();
        source.0.lock().unwrap().level = 0.5;
        let mut rec = recognizer(base, source.clone());

        rec.start(VoiceLanguage::GuIn).unwrap();
        let events = collect(&mut rec, 2).await;
        assert_eq!(
            events,
            vec![RecognitionEvent::Result("two plus two".into()), RecognitionEvent::End]
        );
        assert_eq!(source.0.lock().unwrap().log, vec!["start", "stop"]);

        let request = server.await.unwrap();
        assert!(request.contains("name=\"language\"\r\n\r\ngu"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_transcript_is_no_speech() {
        let (base, _server) = one_shot_server("200 OK", r#"{"text":"   "}"#).await;
        let source = ScriptedSource::default();
        source.0.lock().unwrap().level = 0.5;
        let mut rec = recognizer(base, source);

        rec.start(VoiceLanguage::EnIn).unwrap();
        assert_eq!(
            collect(&mut rec, 2).await,
            vec![RecognitionEvent::Error("no-speech".into()), RecognitionEvent::End]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_silence_is_no_speech_without_request() {
        let source = ScriptedSource::default();
        let mut rec = recognizer(dead_server().await, source.clone());

        rec.start(VoiceLanguage::EnIn).unwrap();
        assert_eq!(
            rec.poll(),
            vec![RecognitionEvent::Error("no-speech".into()), RecognitionEvent::End]
        );
        assert_eq!(source.0.lock().unwrap().log, vec!["start", "discard"]);
        assert!(rec.poll().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_service_is_network_error() {
        let source = ScriptedSource::default();
        source.0.lock().unwrap().level = 0.5;
        let mut rec = recognizer(dead_server().await, source);

        rec.start(VoiceLanguage::EnIn).unwrap();
        assert_eq!(
            collect(&mut rec, 2).await,
            vec![RecognitionEvent::Error("network".into()), RecognitionEvent::End]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_capture_is_audio_capture_error() {
        let source = ScriptedSource::default();
        {
            let mut s = source.0.lock().unwrap();
            s.level = 0.5;
            s.fail_stop = true;
        }
        let mut rec = recognizer(dead_server().await, source);

        rec.start(VoiceLanguage::EnIn).unwrap();
        assert_eq!(
            rec.poll(),
            vec![RecognitionEvent::Error("audio-capture".into()), RecognitionEvent::End]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_then_restart_drops_earlier_transcription() {
        let (base, server) = one_shot_server("200 OK", r#"{"text":"old question"}"#).await;
        let source = ScriptedSource::default();
        source.0.lock().unwrap().level = 0.5;
        let mut rec = recognizer(base, source.clone());

        // Utterance ends; its transcription is now in flight
        rec.start(VoiceLanguage::EnIn).unwrap();
        assert!(rec.poll().is_empty());

        rec.stop();
        source.0.lock().unwrap().level = 0.0;
        rec.start(VoiceLanguage::EnIn).unwrap();
        assert!(source.0.lock().unwrap().recording);

        // Let the earlier request complete; its events must not surface
        server.await.unwrap();
        let mut late = Vec::new();
        for _ in 0..20 {
            // The new session itself hears silence and ends with no-speech
            late.extend(
                rec.poll()
                    .into_iter()
                    .filter(|e| !matches!(e, RecognitionEvent::Error(c) if c == "no-speech")),
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(late.iter().all(|e| !matches!(e, RecognitionEvent::Result(_))), "{late:?}");
    }
}
