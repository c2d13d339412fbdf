use std::time::Duration;

/// Tuning for deciding when a spoken utterance is over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointConfig {
    /// RMS level counted as speech
    pub threshold: f32,
    /// Silence after speech that ends the utterance
    pub trailing_silence: Duration,
    /// Give up if nothing is heard for this long
    pub no_speech_timeout: Duration,
    /// Hard cap on one utterance
    pub max_utterance: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            trailing_silence: Duration::from_millis(900),
            no_speech_timeout: Duration::from_secs(6),
            max_utterance: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDecision {
    Continue,
    /// Speech was heard and has ended
    Finished,
    /// Nothing but silence
    NoSpeech,
}

/// Silence-based end-of-utterance detection over microphone levels.
#[derive(Debug, Clone)]
pub struct Endpointer {
    config: EndpointConfig,
    last_voice: Option<Duration>,
}

impl Endpointer {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            last_voice: None,
        }
    }

    pub fn heard_speech(&self) -> bool {
        self.last_voice.is_some()
    }

    /// Feed the level measured `elapsed` after the session started.
    pub fn update(&mut self, elapsed: Duration, level: f32) -> EndpointDecision {
        if level >= self.config.threshold {
            self.last_voice = Some(elapsed);
        }

        if elapsed >= self.config.max_utterance {
            return if self.heard_speech() {
                EndpointDecision::Finished
            } else {
                EndpointDecision::NoSpeech
            };
        }

        match self.last_voice {
            None if elapsed >= self.config.no_speech_timeout => EndpointDecision::NoSpeech,
            None => EndpointDecision::Continue,
            Some(t) if elapsed.saturating_sub(t) >= self.config.trailing_silence => {
                EndpointDecision::Finished
            }
            Some(_) => EndpointDecision::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_silence_reports_no_speech() {
        let mut ep = Endpointer::new(EndpointConfig::default());
        assert_eq!(ep.update(ms(100), 0.0), EndpointDecision::Continue);
        assert_eq!(ep.update(ms(5_900), 0.01), EndpointDecision::Continue);
        assert_eq!(ep.update(ms(6_000), 0.0), EndpointDecision::NoSpeech);
        assert!(!ep.heard_speech());
    }

    #[test]
    fn test_trailing_silence_finishes() {
        let mut ep = Endpointer::new(EndpointConfig::default());
        assert_eq!(ep.update(ms(500), 0.2), EndpointDecision::Continue);
        assert_eq!(ep.update(ms(1_000), 0.3), EndpointDecision::Continue);
        assert_eq!(ep.update(ms(1_800), 0.0), EndpointDecision::Continue);
        assert_eq!(ep.update(ms(1_900), 0.0), EndpointDecision::Finished);
    }

    #[test]
    fn test_late_speech_beats_no_speech_timeout() {
        let mut ep = Endpointer::new(EndpointConfig::default());
        assert_eq!(ep.update(ms(5_500), 0.5), EndpointDecision::Continue);
        assert_eq!(ep.update(ms(6_200), 0.0), EndpointDecision::Continue);
    }

    #[test]
    fn test_max_utterance_cap() {
        let mut ep = Endpointer::new(EndpointConfig::default());
        ep.update(ms(100), 0.5);
        assert_eq!(ep.update(ms(20_000), 0.5), EndpointDecision::Finished);
    }
}
