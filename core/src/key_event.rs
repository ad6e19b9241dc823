//! Decoded key events.
//!
//! Keycodes use X11 keysym values: printable ASCII keys are their own code
//! point, function keys live in the `0xff00` page. Only the keys the
//! predictor and the session editor look at are named in [`keysym`].

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Keysym constants.
pub mod keysym {
    pub const SPACE: u32 = 0x0020;
    pub const DIGIT_0: u32 = 0x0030;
    pub const DIGIT_9: u32 = 0x0039;
    pub const BACKSPACE: u32 = 0xff08;
    pub const TAB: u32 = 0xff09;
    pub const RETURN: u32 = 0xff0d;
    pub const ESCAPE: u32 = 0xff1b;
    pub const KP_ENTER: u32 = 0xff8d;
    pub const KP_0: u32 = 0xffb0;
    pub const KP_9: u32 = 0xffb9;
}

bitflags! {
    /// Modifier bit set attached to a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const ALT = 1 << 3;
        /// Matches the X11 super mask bit
        const SUPER = 1 << 26;
        /// The event is a key release, not a press
        const RELEASE = 1 << 30;
    }
}

/// A decoded key event: keysym plus modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    keycode: u32,
    modifiers: Modifiers,
}

impl KeyEvent {
    /// Create a key event from a keysym and modifier set.
    pub fn new(keycode: u32, modifiers: Modifiers) -> Self {
        Self { keycode, modifiers }
    }

    /// Unmodified key for a printable character.
    pub fn from_char(ch: char) -> Self {
        Self::new(ch as u32, Modifiers::empty())
    }

    /// Get the keysym.
    pub fn keycode(&self) -> u32 {
        self.keycode
    }

    /// Get the modifier set.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Whether any modifier, release included, is set.
    pub fn has_modifiers(&self) -> bool {
        !self.modifiers.is_empty()
    }

    /// The ASCII character for keycodes in `0x20..0x7f`.
    pub fn ascii(&self) -> Option<char> {
        if (0x20..0x7f).contains(&self.keycode) {
            char::from_u32(self.keycode)
        } else {
            None
        }
    }

    /// Like [`KeyEvent::ascii`] but excludes space.
    pub fn graphic_ascii(&self) -> Option<char> {
        self.ascii().filter(|ch| *ch != ' ')
    }

    /// Return or keypad Enter.
    pub fn is_return(&self) -> bool {
        self.keycode == keysym::RETURN || self.keycode == keysym::KP_ENTER
    }

    /// Digit value of a main-keyboard or keypad digit.
    pub fn digit(&self) -> Option<u32> {
        match self.keycode {
            keysym::DIGIT_0..=keysym::DIGIT_9 | keysym::KP_0..=keysym::KP_9 => {
                Some(self.keycode % 0x10)
            }
            _ => None,
        }
    }

    /// Position on a candidate page selected by a digit key:
    /// `1..9` select `0..8`, `0` selects `9`.
    pub fn digit_page_index(&self) -> Option<usize> {
        self.digit().map(|d| ((d + 9) % 10) as usize)
    }
}

/// Errors from parsing a key description.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("empty key description")]
    Empty,
    /// Anything before the last `+` that is not a modifier name
    #[error("unknown modifier '{0}'")]
    UnknownModifier(String),
    #[error("unknown key name '{0}'")]
    UnknownKey(String),
}

/// Key names that are not a single printable character.
const NAMED_KEYS: &[(&str, u32)] = &[
    ("space", keysym::SPACE),
    ("BackSpace", keysym::BACKSPACE),
    ("Tab", keysym::TAB),
    ("Return", keysym::RETURN),
    ("Escape", keysym::ESCAPE),
    ("KP_Enter", keysym::KP_ENTER),
];

fn parse_modifier(name: &str) -> Result<Modifiers, KeyParseError> {
    match name {
        "Shift" => Ok(Modifiers::SHIFT),
        "Lock" => Ok(Modifiers::LOCK),
        "Control" => Ok(Modifiers::CONTROL),
        "Alt" => Ok(Modifiers::ALT),
        "Super" => Ok(Modifiers::SUPER),
        "Release" => Ok(Modifiers::RELEASE),
        other => Err(KeyParseError::UnknownModifier(other.to_string())),
    }
}

fn parse_keycode(name: &str) -> Result<u32, KeyParseError> {
    if let Some((_, code)) = NAMED_KEYS.iter().find(|(n, _)| *n == name) {
        return Ok(*code);
    }
    if let Some(digit) = name.strip_prefix("KP_").and_then(|d| d.parse::<u32>().ok()) {
        if digit <= 9 {
            return Ok(keysym::KP_0 + digit);
        }
    }
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.is_ascii_graphic() => Ok(ch as u32),
        _ => Err(KeyParseError::UnknownKey(name.to_string())),
    }
}

impl FromStr for KeyEvent {
    type Err = KeyParseError;

    /// Parse descriptions like `a`, `Return`, `KP_3`, `Control+Shift+a`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(KeyParseError::Empty);
        }
        // a lone '+' is the plus key, "Shift++" is shift and plus
        let (mods, key) = if s == "+" {
            ("", "+")
        } else if let Some(prefix) = s.strip_suffix('+') {
            match prefix.strip_suffix('+') {
                Some(mods) if !mods.is_empty() => (mods, "+"),
                _ => return Err(KeyParseError::UnknownModifier(prefix.to_string())),
            }
        } else {
            match s.rsplit_once('+') {
                Some((mods, key)) => (mods, key),
                None => ("", s),
            }
        };
        let mut modifiers = Modifiers::empty();
        for name in mods.split('+').filter(|m| !m.is_empty()) {
            modifiers |= parse_modifier(name)?;
        }
        Ok(KeyEvent::new(parse_keycode(key)?, modifiers))
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MODS: &[(Modifiers, &str)] = &[
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::LOCK, "Lock"),
            (Modifiers::CONTROL, "Control"),
            (Modifiers::ALT, "Alt"),
            (Modifiers::SUPER, "Super"),
            (Modifiers::RELEASE, "Release"),
        ];
        for (m, name) in MODS {
            if self.modifiers.contains(*m) {
                write!(f, "{}+", name)?;
            }
        }
        if let Some((name, _)) = NAMED_KEYS.iter().find(|(_, c)| *c == self.keycode) {
            return f.write_str(name);
        }
        if (keysym::KP_0..=keysym::KP_9).contains(&self.keycode) {
            return write!(f, "KP_{}", self.keycode - keysym::KP_0);
        }
        match self.ascii() {
            Some(ch) => write!(f, "{}", ch),
            None => write!(f, "0x{:04x}", self.keycode),
        }
    }
}
