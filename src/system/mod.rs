pub mod hotkeys;

pub use hotkeys::HotkeyManager;
