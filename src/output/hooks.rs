use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// The output hooks a host exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    SendString,
    SendBackspaces,
    SendKeyCombination,
}

impl HookName {
    pub const ALL: [HookName; 3] = [
        HookName::SendString,
        HookName::SendBackspaces,
        HookName::SendKeyCombination,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HookName::SendString => "send_string",
            HookName::SendBackspaces => "send_backspaces",
            HookName::SendKeyCombination => "send_key_combination",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of host output events
pub trait OutputHooks: Send + Sync {
    fn send_string(&self, text: &str);

    fn send_backspaces(&self, count: usize);

    fn send_key_combination(&self, combo: &str);
}

/// Where output hooks get attached to the host
pub trait HookRegistry: Send + Sync {
    fn hook_connect(&self, hook: HookName, handler: Arc<dyn OutputHooks>);

    fn hook_disconnect(&self, hook: HookName);
}

/// In-process registry that dispatches to whichever handler is connected.
#[derive(Default)]
pub struct HostHooks {
    handlers: RwLock<HashMap<HookName, Arc<dyn OutputHooks>>>,
}

impl HostHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self, hook: HookName) -> bool {
        self.handler(hook).is_some()
    }

    pub fn send_string(&self, text: &str) {
        if let Some(handler) = self.handler(HookName::SendString) {
            handler.send_string(text);
        }
    }

    pub fn send_backspaces(&self, count: usize) {
        if let Some(handler) = self.handler(HookName::SendBackspaces) {
            handler.send_backspaces(count);
        }
    }

    pub fn send_key_combination(&self, combo: &str) {
        if let Some(handler) = self.handler(HookName::SendKeyCombination) {
            handler.send_key_combination(combo);
        }
    }

    fn handler(&self, hook: HookName) -> Option<Arc<dyn OutputHooks>> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let handler = handlers.get(&hook).cloned();
        if handler.is_none() {
            debug!("No handler connected to {}", hook);
        }
        handler
    }
}

impl HookRegistry for HostHooks {
    fn hook_connect(&self, hook: HookName, handler: Arc<dyn OutputHooks>) {
        info!("Hook connected: {}", hook);
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(hook, handler);
    }

    fn hook_disconnect(&self, hook: HookName) {
        info!("Hook disconnected: {}", hook);
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&hook);
    }
}
