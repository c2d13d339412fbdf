use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::api::{GroqClient, TutorClient};
use crate::avatar::controller::TALKING_CLIP;
use crate::avatar::{self, AvatarStage, Gender, LoadedAvatar};
use crate::config::Config;
use crate::console::{ConsoleCommand, HELP};
use crate::error::Result;
use crate::form::{Attachment, FormState, Role, Submission};
use crate::renderer::{AvatarRenderer, Frame};
use crate::system::HotkeyManager;
use crate::voice::{EspeakSynthesizer, SpeechRecognizer, SpeechSynthesizer, VoiceAdapter, WhisperRecognizer};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const PLACEHOLDER_TINT: [f32; 3] = [1.0, 0.55, 0.1];

/// Events sent from the console thread and async tasks back to the event loop
pub enum AppEvent {
    Console(ConsoleCommand),
    TutorReply {
        submission: Submission,
        answer: String,
    },
    AvatarLoaded {
        generation: u64,
        result: Result<LoadedAvatar>,
    },
}

pub struct App {
    window: Option<Arc<Window>>,
    renderer: Option<AvatarRenderer>,
    form: FormState,
    voice: VoiceAdapter,
    tutor: TutorClient,
    stage: AvatarStage,
    teacher: Option<Gender>,
    asset_root: PathBuf,
    initial_avatar: Option<Gender>,
    hotkey_manager: Option<HotkeyManager>,
    tokio_rt: Arc<tokio::runtime::Runtime>,
    event_proxy: EventLoopProxy<AppEvent>,
    last_frame: Instant,
    last_status: String,
    last_speaking: bool,
    in_flight: usize,
}

impl App {
    pub fn new(config: Config, tokio_rt: Arc<tokio::runtime::Runtime>, event_proxy: EventLoopProxy<AppEvent>) -> Self {
        let groq = GroqClient::new(config.groq_api_key.clone(), config.stt_model.clone());
        if !groq.has_api_key() {
            log::warn!(
                "No API key set! Edit {} or set GROQ_API_KEY env var",
                Config::config_path().display()
            );
        }

        let recognizer = WhisperRecognizer::probe(groq, tokio_rt.handle().clone(), config.endpointing())
            .map(|r| Box::new(r) as Box<dyn SpeechRecognizer>);
        let synthesizer =
            EspeakSynthesizer::probe(&config.tts_program).map(|s| Box::new(s) as Box<dyn SpeechSynthesizer>);

        log::info!("Tutor endpoint: {}", config.endpoint);

        Self {
            window: None,
            renderer: None,
            form: FormState::new(),
            voice: VoiceAdapter::new(recognizer, synthesizer),
            tutor: TutorClient::new(config.endpoint.clone()),
            stage: AvatarStage::new(),
            teacher: None,
            asset_root: config.asset_root.clone(),
            initial_avatar: config.default_avatar(),
            hotkey_manager: None,
            tokio_rt,
            event_proxy,
            last_frame: Instant::now(),
            last_status: String::new(),
            last_speaking: false,
            in_flight: 0,
        }
    }

    fn avatar_chosen(&self) -> bool {
        self.teacher.is_some()
    }

    fn teacher_gender(&self) -> Option<Gender> {
        self.teacher
    }

    fn prompt_for_avatar(&self) {
        println!("Choose your teacher: /avatar male or /avatar female");
    }

    fn choose_avatar(&mut self, gender: Gender) {
        self.teacher = Some(gender);
        let variant = avatar::select(gender, &self.asset_root);
        let Some(generation) = self.stage.request(variant.clone()) else {
            return;
        };

        log::info!("Loading {} avatar (generation {})", gender.as_str(), generation);
        if let Some(w) = &self.window {
            w.set_title(&format!("TeacherBot - {} teacher", gender.as_str()));
        }
        println!("Loading the {} teacher...", gender.as_str());

        let proxy = self.event_proxy.clone();
        self.tokio_rt.spawn(async move {
            let result = avatar::variant::load(variant).await;
            let _ = proxy.send_event(AppEvent::AvatarLoaded { generation, result });
        });
    }

    fn toggle_listening(&mut self) {
        if !self.avatar_chosen() {
            self.prompt_for_avatar();
            return;
        }
        self.voice.toggle_listening(self.form.language());
    }

    fn send(&mut self) {
        if !self.avatar_chosen() {
            self.prompt_for_avatar();
            return;
        }
        if self.form.grade().is_none() {
            println!("Select a grade first: /grade 1, 2 or 3");
            return;
        }
        if self.form.subject().is_empty() {
            self.print_subjects();
            println!("Select a subject first: /subject <name>");
            return;
        }
        let Some(submission) = self.form.submit() else {
            println!("Nothing to send");
            return;
        };

        println!("You: {}", submission.message);
        self.in_flight += 1;

        let tutor = self.tutor.clone();
        let proxy = self.event_proxy.clone();
        self.tokio_rt.spawn(async move {
            let answer = tutor.ask(&submission).await;
            let _ = proxy.send_event(AppEvent::TutorReply { submission, answer });
        });
    }

    fn print_status(&self) {
        let grade = self.form.grade().map(|g| g.as_str()).unwrap_or("-");
        let subject = if self.form.subject().is_empty() {
            "-"
        } else {
            self.form.subject()
        };
        let teacher = self.teacher_gender().map(|g| g.as_str()).unwrap_or("not chosen");
        let load_state = match (self.stage.requested(), self.stage.is_placeholder()) {
            (_, false) => "",
            (Some(_), true) => " (loading)",
            (None, true) if self.avatar_chosen() => " (failed to load)",
            (None, true) => "",
        };
        println!(
            "Grade {} | {} medium | subject {} | voice {} | teacher {}{}",
            grade,
            self.form.medium().as_str(),
            subject,
            self.form.language(),
            teacher,
            load_state
        );
        if let Some(file) = self.form.attachment() {
            println!("Attached: {} ({} bytes)", file.file_name, file.bytes.len());
        }
        if self.in_flight > 0 {
            println!("Waiting for {} answer(s)", self.in_flight);
        }
        if !self.voice.status().is_empty() {
            println!("{}", self.voice.status());
        }
    }

    fn print_subjects(&self) {
        let subjects = self.form.available_subjects();
        if subjects.is_empty() {
            println!("Select a grade to see subjects");
        } else {
            println!("Subjects: {}", subjects.join(", "));
        }
    }

    fn handle_command(&mut self, event_loop: &ActiveEventLoop, command: ConsoleCommand) {
        match command {
            ConsoleCommand::Grade(grade) => {
                self.form.set_grade(grade);
                self.print_subjects();
            }
            ConsoleCommand::Medium(medium) => match self.form.set_medium(medium) {
                Ok(()) => {
                    println!("Medium {}, voice {}", medium.as_str(), self.form.language());
                    self.print_subjects();
                }
                Err(e) => println!("{e}"),
            },
            ConsoleCommand::Subject(subject) => match self.form.set_subject(&subject) {
                Ok(()) => println!("Subject {}", self.form.subject()),
                Err(e) => println!("{e}"),
            },
            ConsoleCommand::Subjects => self.print_subjects(),
            ConsoleCommand::Language(language) => {
                self.form.set_language(language);
                println!("Voice language {}", language);
            }
            ConsoleCommand::Avatar(gender) => self.choose_avatar(gender),
            ConsoleCommand::Attach(path) => match Attachment::from_path(&path) {
                Ok(file) => {
                    println!("Attached {}", file.file_name);
                    self.form.attach(file);
                }
                Err(e) => println!("Could not attach {}: {}", path.display(), e),
            },
            ConsoleCommand::Detach => {
                if self.form.detach().is_some() {
                    println!("Attachment removed");
                }
            }
            ConsoleCommand::Listen => {
                if !self.voice.is_listening() {
                    self.toggle_listening();
                }
            }
            ConsoleCommand::Stop => self.voice.stop_listening(),
            ConsoleCommand::Send => self.send(),
            ConsoleCommand::Say(text) => {
                self.form.set_input(text);
                self.send();
            }
            ConsoleCommand::History => {
                for message in self.form.transcript() {
                    let who = match message.role {
                        Role::User => "You",
                        Role::Bot => "Teacher",
                    };
                    println!("{}: {}", who, message.text);
                }
            }
            ConsoleCommand::Status => self.print_status(),
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => event_loop.exit(),
        }
    }

    fn frame(&self, time: f32) -> Frame {
        let mounted = self.stage.mounted();
        Frame {
            time,
            placeholder: self.stage.is_placeholder(),
            tint: mounted.map(|m| m.mesh.tint).unwrap_or(PLACEHOLDER_TINT),
            talk: mounted.map(|m| m.controller.weight(TALKING_CLIP)).unwrap_or(0.0),
            pose: self.stage.pose(),
        }
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("TeacherBot")
            .with_inner_size(LogicalSize::new(480.0, 640.0));

        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                match AvatarRenderer::new(window.clone()) {
                    Ok(r) => self.renderer = Some(r),
                    Err(e) => log::error!("Avatar view disabled: {}", e),
                }
                self.window = Some(window);
            }
            Err(e) => log::error!("Failed to create window: {}", e),
        }

        match HotkeyManager::new() {
            Ok(hk) => self.hotkey_manager = Some(hk),
            Err(e) => log::warn!("Global hotkeys unavailable: {}", e),
        }

        match self.initial_avatar.take() {
            Some(gender) => self.choose_avatar(gender),
            None => self.prompt_for_avatar(),
        }
        self.last_frame = Instant::now();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => {
                if let Some(r) = &mut self.renderer {
                    r.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = now.duration_since(self.last_frame).as_secs_f32();
                self.last_frame = now;
                self.stage.tick(dt);

                let time = self.renderer.as_ref().map(|r| r.elapsed()).unwrap_or(0.0);
                let frame = self.frame(time);
                if let Some(r) = &mut self.renderer {
                    r.render(&frame);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && !event.repeat
                    && event.logical_key == Key::Named(NamedKey::Space)
                {
                    self.toggle_listening();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(text) = self.voice.poll() {
            println!("Heard: {} (/send to ask)", text);
            self.form.set_input(text);
        }

        if self.voice.status() != self.last_status {
            self.last_status = self.voice.status().to_string();
            if !self.last_status.is_empty() {
                println!("{}", self.last_status);
            }
        }

        let speaking = self.voice.is_speaking();
        if speaking != self.last_speaking {
            self.last_speaking = speaking;
            self.stage.set_speaking(speaking);
        }

        if self.hotkey_manager.as_ref().is_some_and(|hk| hk.poll_listen()) {
            self.toggle_listening();
        }

        if let Some(w) = &self.window {
            w.request_redraw();
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + FRAME_INTERVAL));
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Console(command) => self.handle_command(event_loop, command),

            AppEvent::TutorReply { submission, answer } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                println!("Teacher: {}", answer);
                self.form.complete(&submission, answer.clone());
                let gender = self.teacher_gender();
                self.voice.speak(&answer, self.form.language(), gender);
            }

            AppEvent::AvatarLoaded { generation, result } => {
                let speaking = self.voice.is_speaking();
                if self.stage.finish(generation, result, speaking) {
                    println!("Your teacher is ready. Type a question or press Space to talk.");
                    self.last_speaking = speaking;
                } else if self.stage.is_placeholder() && generation == self.stage.generation() {
                    println!("Could not load the teacher; see the log for details");
                }
            }
        }
    }
}
