use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use winit::event_loop::EventLoop;

use teacherbot::app::{App, AppEvent};
use teacherbot::config::Config;
use teacherbot::console;

#[derive(Parser, Debug)]
#[command(name = "teacherbot")]
#[command(about = "Voice tutor with an animated teacher avatar", long_about = None)]
#[command(version)]
struct Args {
    /// Tutor backend URL
    #[arg(long, env = "TEACHERBOT_ENDPOINT")]
    endpoint: Option<String>,

    /// Directory holding models/ and animations/
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Teacher to show at startup (male or female)
    #[arg(long)]
    avatar: Option<String>,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("TeacherBot native v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(assets) = args.assets {
        config.asset_root = assets;
    }
    if let Some(avatar) = args.avatar {
        config.default_avatar = avatar;
    }

    let tokio_rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            log::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let event_loop = match EventLoop::<AppEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };

    let proxy = event_loop.create_proxy();
    let console_proxy = proxy.clone();
    if let Err(e) = console::spawn(move |command| console_proxy.send_event(AppEvent::Console(command)).is_ok()) {
        log::error!("Console unavailable: {}", e);
    }
    println!("{}", console::HELP);

    let mut app = App::new(config, tokio_rt, proxy);

    log::info!("Starting event loop");
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop failed: {}", e);
        std::process::exit(1);
    }
}
