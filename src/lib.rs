pub mod api;
pub mod app;
pub mod audio;
pub mod avatar;
pub mod config;
pub mod console;
pub mod error;
pub mod form;
pub mod renderer;
pub mod system;
pub mod voice;

pub use error::{Error, Result};
