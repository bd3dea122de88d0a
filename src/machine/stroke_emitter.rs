//! Hands decoded chords to the host.
//!
//! A [`StrokeMapping`] turns the machine keys of a chord into engine actions
//! (steno keys). Chords whose keys map to nothing are dropped quietly; every
//! other chord reaches the [`StrokeSink`] as a [`Stroke`].

use crate::config::KeymapConfig;
use crate::machine::chord_decoder::{KeySet, StenoKey};
use crate::machine::MachineError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Mapped actions of one chord
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub actions: Vec<String>,
    pub timestamp: DateTime<Local>,
}

/// Machine keys to engine actions
pub trait StrokeMapping: Send {
    fn keys_to_actions(&self, keys: &KeySet) -> Vec<String>;
}

/// Receives finished strokes
pub trait StrokeSink: Send {
    fn notify(&self, stroke: Stroke);
}

impl StrokeSink for mpsc::Sender<Stroke> {
    fn notify(&self, stroke: Stroke) {
        if let Err(e) = self.try_send(stroke) {
            warn!("Failed to deliver stroke: {}", e);
        }
    }
}

impl StrokeSink for mpsc::UnboundedSender<Stroke> {
    fn notify(&self, stroke: Stroke) {
        if let Err(e) = self.send(stroke) {
            warn!("Failed to deliver stroke: {}", e);
        }
    }
}

/// Per key action table.
///
/// Several keys may share an action (both `S` keys usually mean `S-`); the
/// action is emitted once per stroke, at the position of its first key.
#[derive(Debug, Clone)]
pub struct Keymap {
    mappings: HashMap<StenoKey, String>,
}

impl Keymap {
    /// Every key maps to its own name
    pub fn identity() -> Self {
        let mappings = StenoKey::all()
            .map(|key| (key, key.name().to_string()))
            .collect();
        Self { mappings }
    }

    /// Identity map with the entries of the config applied on top.
    /// An empty action disables the key.
    pub fn from_config(config: &KeymapConfig) -> Result<Self, MachineError> {
        let mut keymap = Self::identity();
        for (name, action) in &config.mappings {
            let key = StenoKey::from_name(name)
                .ok_or_else(|| MachineError::UnknownKey(name.clone()))?;
            if action.is_empty() {
                debug!("Key {} disabled by keymap", key);
                keymap.mappings.remove(&key);
            } else {
                keymap.mappings.insert(key, action.clone());
            }
        }
        Ok(keymap)
    }

    pub fn action(&self, key: StenoKey) -> Option<&str> {
        self.mappings.get(&key).map(String::as_str)
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::identity()
    }
}

impl StrokeMapping for Keymap {
    fn keys_to_actions(&self, keys: &KeySet) -> Vec<String> {
        let mut actions: Vec<String> = Vec::with_capacity(keys.len());
        for key in keys.keys() {
            match self.action(*key) {
                Some(action) if !actions.iter().any(|a| a == action) => {
                    actions.push(action.to_string())
                }
                Some(_) => {}
                None => debug!("No action for key {}", key),
            }
        }
        actions
    }
}

pub struct StrokeEmitter {
    mapping: Box<dyn StrokeMapping>,
    sink: Box<dyn StrokeSink>,
}

impl StrokeEmitter {
    pub fn new(mapping: Box<dyn StrokeMapping>, sink: Box<dyn StrokeSink>) -> Self {
        Self { mapping, sink }
    }

    /// Maps and forwards a chord. Returns whether a stroke was sent.
    pub fn emit(&self, keys: &KeySet) -> bool {
        if keys.is_empty() {
            return false;
        }

        let actions = self.mapping.keys_to_actions(keys);
        if actions.is_empty() {
            debug!("Chord {} maps to no actions, dropped", keys);
            return false;
        }

        info!("Stroke: {} -> {:?}", keys, actions);
        self.sink.notify(Stroke {
            actions,
            timestamp: Local::now(),
        });
        true
    }
}
