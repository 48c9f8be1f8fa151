// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Key events, their canonical labels, and the key binding index built from them.

use std::{collections::HashMap, fmt};

use crate::sound::Sound;

/// The label of the space key. Space doubles as the mass-stop shortcut.
pub const SPACE: &str = "Space";

/// A key-down event as delivered by an input driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// The produced character or the logical key name ("a", " ", "Enter").
    pub key: String,
    /// The physical key code ("KeyA", "Space", "F1"). May be empty if unknown.
    pub code: String,
}

impl KeyEvent {
    pub fn new(key: &str, code: &str) -> KeyEvent {
        KeyEvent {
            key: key.to_string(),
            code: code.to_string(),
        }
    }

    /// Builds an event from a typed token: a single character, "space", or a key name such as
    /// "F1" or "Enter". Returns None for an empty token.
    pub fn from_token(token: &str) -> Option<KeyEvent> {
        if token.is_empty() {
            return None;
        }
        if token == " " || token.eq_ignore_ascii_case("space") {
            return Some(KeyEvent::new(" ", SPACE));
        }

        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                let code = if c.is_ascii_alphabetic() {
                    format!("Key{}", c.to_ascii_uppercase())
                } else if c.is_ascii_digit() {
                    format!("Digit{}", c)
                } else {
                    String::new()
                };
                Some(KeyEvent {
                    key: c.to_string(),
                    code,
                })
            }
            _ => Some(KeyEvent::new(token, token)),
        }
    }

    /// Returns true if this is the space key, by code or by character.
    pub fn is_space(&self) -> bool {
        self.code == SPACE || self.key == " "
    }

    /// Converts the event into the only key representation that is stored and compared.
    pub fn label(&self) -> KeyLabel {
        if self.is_space() {
            return KeyLabel(SPACE.to_string());
        }
        if self.key.chars().count() == 1 {
            return KeyLabel(self.key.to_uppercase());
        }
        if !self.code.is_empty() {
            return KeyLabel(self.code.clone());
        }
        KeyLabel(self.key.clone())
    }
}

/// Canonical key label. Binding and dispatch must agree on this form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyLabel(String);

impl KeyLabel {
    /// Wraps a label that was produced by `KeyEvent::label` earlier and persisted.
    pub fn from_stored(label: &str) -> KeyLabel {
        KeyLabel(label.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_space(&self) -> bool {
        self.0 == SPACE
    }
}

impl fmt::Display for KeyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derived mapping from key label to the sounds bound to it. Never patched in place, only
/// rebuilt from the full collection.
#[derive(Debug, Default)]
pub struct KeyBindingIndex {
    bindings: HashMap<KeyLabel, Vec<Sound>>,
}

impl KeyBindingIndex {
    /// Builds the index from the given sounds. Sounds keep their collection order per key and
    /// unbound sounds are left out.
    pub fn rebuild(sounds: &[Sound]) -> KeyBindingIndex {
        let mut bindings: HashMap<KeyLabel, Vec<Sound>> = HashMap::new();
        for sound in sounds {
            if let Some(key) = &sound.key {
                bindings.entry(key.clone()).or_default().push(sound.clone());
            }
        }
        KeyBindingIndex { bindings }
    }

    /// Returns the sounds bound to the label, or an empty slice.
    pub fn resolve(&self, label: &KeyLabel) -> &[Sound] {
        self.bindings
            .get(label)
            .map(|sounds| sounds.as_slice())
            .unwrap_or(&[])
    }

    /// Number of distinct bound labels.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod test {
    use crate::sound::{Blob, SoundId};

    use super::*;

    fn sound(id: i64, key: Option<&str>) -> Sound {
        Sound {
            id: SoundId(id),
            name: format!("sound {}", id),
            key: key.map(KeyLabel::from_stored),
            blob: Blob::new("audio/wav", vec![id as u8]),
            created_at: id,
            duration: None,
        }
    }

    #[test]
    fn test_label_canonicalization() {
        assert_eq!(KeyEvent::new(" ", "Space").label().as_str(), "Space");
        assert_eq!(KeyEvent::new(" ", "").label().as_str(), "Space");
        assert_eq!(KeyEvent::new("Unidentified", "Space").label().as_str(), "Space");
        assert_eq!(KeyEvent::new("a", "KeyA").label().as_str(), "A");
        assert_eq!(KeyEvent::new("A", "KeyA").label().as_str(), "A");
        assert_eq!(KeyEvent::new("1", "Digit1").label().as_str(), "1");
        assert_eq!(KeyEvent::new("é", "").label().as_str(), "É");
        assert_eq!(KeyEvent::new("Enter", "NumpadEnter").label().as_str(), "NumpadEnter");
        assert_eq!(KeyEvent::new("F1", "").label().as_str(), "F1");
    }

    #[test]
    fn test_from_token() {
        assert_eq!(KeyEvent::from_token(""), None);
        assert_eq!(KeyEvent::from_token(" "), Some(KeyEvent::new(" ", "Space")));
        assert_eq!(KeyEvent::from_token("SPACE"), Some(KeyEvent::new(" ", "Space")));
        assert_eq!(KeyEvent::from_token("q"), Some(KeyEvent::new("q", "KeyQ")));
        assert_eq!(KeyEvent::from_token("7"), Some(KeyEvent::new("7", "Digit7")));
        assert_eq!(KeyEvent::from_token("F5"), Some(KeyEvent::new("F5", "F5")));
    }

    #[test]
    fn test_binding_and_dispatch_agree() {
        // Whatever way the space key arrives, binding and dispatch produce the same label.
        let bound = KeyEvent::from_token(" ").unwrap().label();
        let pressed = KeyEvent::new(" ", "Space").label();
        assert_eq!(bound, pressed);

        let bound = KeyEvent::new("a", "KeyA").label();
        let pressed = KeyEvent::new("A", "KeyA").label();
        assert_eq!(bound, pressed);
    }

    #[test]
    fn test_rebuild_and_resolve() {
        let sounds = vec![
            sound(1, Some("A")),
            sound(2, None),
            sound(3, Some("B")),
            sound(4, Some("A")),
        ];
        let index = KeyBindingIndex::rebuild(&sounds);

        assert_eq!(index.len(), 2);
        let a: Vec<i64> = index
            .resolve(&KeyLabel::from_stored("A"))
            .iter()
            .map(|s| s.id.0)
            .collect();
        assert_eq!(a, vec![1, 4]);
        assert_eq!(index.resolve(&KeyLabel::from_stored("B")).len(), 1);
        assert!(index.resolve(&KeyLabel::from_stored("C")).is_empty());
        assert!(index.resolve(&KeyLabel::from_stored("Space")).is_empty());
    }

    #[test]
    fn test_rebuild_empty() {
        let index = KeyBindingIndex::rebuild(&[sound(1, None)]);
        assert!(index.is_empty());
    }
}
