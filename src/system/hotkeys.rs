use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};

use crate::error::{Error, Result};

/// Global push-to-talk: Ctrl+Shift+Comma toggles listening from any window.
pub struct HotkeyManager {
    // Unregisters on drop
    _manager: GlobalHotKeyManager,
    listen_hotkey_id: u32,
}

impl HotkeyManager {
    pub fn new() -> Result<Self> {
        let manager =
            GlobalHotKeyManager::new().map_err(|e| Error::Config(format!("Global hotkeys: {e}")))?;

        let listen = HotKey::new(Some(Modifiers::CONTROL | Modifiers::SHIFT), Code::Comma);
        let listen_id = listen.id();
        manager
            .register(listen)
            .map_err(|e| Error::Config(format!("Ctrl+Shift+Comma: {e}")))?;

        log::info!("Global hotkey registered: Ctrl+Shift+Comma (id={})", listen_id);

        Ok(Self {
            _manager: manager,
            listen_hotkey_id: listen_id,
        })
    }

    /// Drains pending hotkey events. True if the listen key was pressed
    /// (releases are ignored).
    pub fn poll_listen(&self) -> bool {
        let mut fired = false;
        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            if event.id == self.listen_hotkey_id && event.state == HotKeyState::Pressed {
                fired = true;
            }
        }
        fired
    }
}
