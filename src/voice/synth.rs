use std::io::Write;
use std::process::{Child, Command, Stdio};

use super::{SpeechSynthesizer, SynthesisEvent, Utterance, Voice};
use crate::error::{Error, Result};

pub const DEFAULT_PROGRAM: &str = "espeak-ng";

/// espeak's own defaults, scaled by the utterance rate/pitch
const BASE_WPM: f32 = 175.0;
const BASE_PITCH: f32 = 50.0;

/// Text-to-speech through an `espeak-ng` child process per utterance.
pub struct EspeakSynthesizer {
    program: String,
    voices: Vec<Voice>,
    current: Option<(u64, Child)>,
}

impl EspeakSynthesizer {
    /// Runs `<program> --voices`; `None` if the program is missing.
    pub fn probe(program: &str) -> Option<Self> {
        let output = match Command::new(program).arg("--voices").output() {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                log::warn!("{} --voices exited with {}", program, output.status);
                return None;
            }
            Err(e) => {
                log::warn!("{} not available - speech synthesis disabled: {}", program, e);
                return None;
            }
        };

        let voices = parse_voices(&String::from_utf8_lossy(&output.stdout));
        log::info!("{}: {} voices", program, voices.len());
        Some(Self {
            program: program.to_string(),
            voices,
            current: None,
        })
    }
}

/// Parse the `--voices` table:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  gu              --/M      Gujarati           inc/gu
/// ```
pub fn parse_voices(table: &str) -> Vec<Voice> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 {
                return None;
            }
            Some(Voice {
                name: cols[3].replace('_', " "),
                lang: cols[1].to_string(),
                id: cols[1].to_string(),
            })
        })
        .collect()
}

/// The text itself is fed on stdin so argv stays small.
pub fn espeak_args(utterance: &Utterance) -> Vec<String> {
    let voice = utterance
        .voice
        .as_ref()
        .map(|v| v.id.clone())
        .unwrap_or_else(|| utterance.language.prefix().to_string());
    let wpm = (BASE_WPM * utterance.rate).round() as u32;
    let pitch = (BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0) as u32;

    vec![
        "-v".into(),
        voice,
        "-s".into(),
        wpm.to_string(),
        "-p".into(),
        pitch.to_string(),
        "--stdin".into(),
    ]
}

impl SpeechSynthesizer for EspeakSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&mut self, utterance: Utterance) -> Result<()> {
        self.cancel();
        let mut child = Command::new(&self.program)
            .args(espeak_args(&utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Audio(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let text = utterance.text;
            let id = utterance.id;
            // The pipe fills faster than speech drains it
            std::thread::spawn(move || {
                if let Err(e) = stdin.write_all(text.as_bytes()) {
                    log::debug!("Utterance #{} input cut short: {}", id, e);
                }
            });
        }
        self.current = Some((utterance.id, child));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some((id, mut child)) = self.current.take() {
            let _ = child.kill();
            let _ = child.wait();
            log::debug!("Cancelled utterance #{}", id);
        }
    }

    fn poll(&mut self) -> Vec<SynthesisEvent> {
        let Some((id, child)) = self.current.as_mut() else {
            return Vec::new();
        };
        let id = *id;
        let event = match child.try_wait() {
            Ok(None) => return Vec::new(),
            Ok(Some(status)) if status.success() => SynthesisEvent::End(id),
            Ok(Some(status)) => SynthesisEvent::Error(id, status.to_string()),
            Err(e) => SynthesisEvent::Error(id, e.to_string()),
        };
        self.current = None;
        vec![event]
    }
}

impl Drop for EspeakSynthesizer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::VoiceLanguage;

    const TABLE: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  en-gb           --/M      English_(Great_Britain) gmw/en               (en 2)
 5  en-029          --/M      English_(Caribbean) gmw/en-029
 5  gu              --/M      Gujarati           inc/gu
 5  hi              --/M      Hindi              inc/hi
";

    fn utterance(voice: Option<Voice>) -> Utterance {
        Utterance {
            id: 7,
            text: "-two plus two".into(),
            language: VoiceLanguage::GuIn,
            rate: 0.8,
            pitch: 1.1,
            voice,
        }
    }

    #[test]
    fn test_parse_voices() {
        let voices = parse_voices(TABLE);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[0].name, "English (Great Britain)");
        assert_eq!(voices[0].lang, "en-gb");
        assert_eq!(voices[2].id, "gu");
        assert!(parse_voices("Pty Language Age/Gender VoiceName File\n").is_empty());
    }

    #[test]
    fn test_args_scale_rate_and_pitch() {
        let args = espeak_args(&utterance(None));
        assert_eq!(args, vec!["-v", "gu", "-s", "140", "-p", "55", "--stdin"]);
    }

    #[test]
    fn test_long_text_stays_out_of_argv() {
        let mut u = utterance(None);
        u.text = "two plus two is four. ".repeat(10_000);
        let args = espeak_args(&u);
        assert_eq!(args.last().map(String::as_str), Some("--stdin"));
        assert!(args.iter().map(String::len).sum::<usize>() < 64);
    }

    #[cfg(unix)]
    #[test]
    fn test_text_is_piped_to_the_program() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let heard = dir.path().join("heard.txt");
        let program = dir.path().join("fake-espeak");
        std::fs::write(&program, format!("#!/bin/sh\ncat > '{}'\n", heard.display())).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut tts = EspeakSynthesizer {
            program: program.display().to_string(),
            voices: Vec::new(),
            current: None,
        };
        let mut u = utterance(None);
        u.text = "two plus two is four. ".repeat(10_000);
        tts.speak(u.clone()).unwrap();

        let mut events = Vec::new();
        for _ in 0..500 {
            events = tts.poll();
            if !events.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(events, vec![SynthesisEvent::End(7)]);
        assert_eq!(std::fs::read_to_string(&heard).unwrap(), u.text);
    }

    #[test]
    fn test_args_use_chosen_voice() {
        let voice = parse_voices(TABLE).remove(1);
        let mut u = utterance(Some(voice));
        u.pitch = 3.0;
        let args = espeak_args(&u);
        assert_eq!(args[1], "en-029");
        assert_eq!(args[5], "99");
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        assert!(EspeakSynthesizer::probe("teacherbot-no-such-tts").is_none());
    }
}
