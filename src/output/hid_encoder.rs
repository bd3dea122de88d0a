//! Keyboard report encoding
//!
//! Boot protocol keyboard report, 8 bytes:
//!
//! ```text
//! 0       8       16      24      32      40      48      56      64
//! -----------------------------------------------------------------
//! |Mod Key|Reservd| Key 1 | Key 2 | Key 3 | Key 4 | Key 5 | Key 6 |
//! -----------------------------------------------------------------
//! ```
//!
//! Only the modifier byte and the first key slot are used. Every key press is
//! followed by an all zero report which releases it again.

use crate::output::OutputAction;
use bitflags::bitflags;
use std::io::{self, Write};
use tracing::{debug, info};

pub const REPORT_LEN: usize = 8;

/// All keys up
pub const RELEASE_REPORT: [u8; REPORT_LEN] = [0; REPORT_LEN];

pub const KEY_ENTER: u8 = 40;
pub const KEY_BACKSPACE: u8 = 42;
pub const KEY_TAB: u8 = 43;
pub const KEY_SPACE: u8 = 44;

/// Sent for characters without a table entry
pub const KEY_FALLBACK: u8 = 56;

bitflags! {
    /// Modifier byte of a keyboard report
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const L_CTRL = 0x01;
        const L_SHIFT = 0x02;
        const L_ALT = 0x04;
        const L_META = 0x08;
        const R_CTRL = 0x10;
        const R_SHIFT = 0x20;
        const R_ALT = 0x40;
        const R_META = 0x80;
    }
}

/// One key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidReport {
    pub modifiers: Modifiers,
    pub keycode: u8,
}

impl HidReport {
    pub fn new(modifiers: Modifiers, keycode: u8) -> Self {
        Self { modifiers, keycode }
    }

    /// Report for a character, falling back to [`KEY_FALLBACK`]
    pub fn for_char(ch: char) -> Self {
        match lookup(ch) {
            Some((modifiers, keycode)) => Self::new(modifiers, keycode),
            None => {
                debug!("No scan code for {:?}, sending fallback", ch);
                Self::new(Modifiers::empty(), KEY_FALLBACK)
            }
        }
    }

    pub fn backspace() -> Self {
        Self::new(Modifiers::empty(), KEY_BACKSPACE)
    }

    pub fn to_bytes(self) -> [u8; REPORT_LEN] {
        [self.modifiers.bits(), 0x00, self.keycode, 0x00, 0x00, 0x00, 0x00, 0x00]
    }
}

/// US ANSI layout: character to modifiers and usage id
pub fn lookup(ch: char) -> Option<(Modifiers, u8)> {
    let none = Modifiers::empty();
    let shift = Modifiers::L_SHIFT;

    let entry = match ch {
        'a'..='z' => (none, 4 + (ch as u8 - b'a')),
        'A'..='Z' => (shift, 4 + (ch as u8 - b'A')),
        '1'..='9' => (none, 30 + (ch as u8 - b'1')),
        '0' => (none, 39),
        '!' => (shift, 30),
        '@' => (shift, 31),
        '#' => (shift, 32),
        '$' => (shift, 33),
        '%' => (shift, 34),
        '^' => (shift, 35),
        '&' => (shift, 36),
        '*' => (shift, 37),
        '(' => (shift, 38),
        ')' => (shift, 39),
        '\n' => (none, KEY_ENTER),
        '\u{8}' => (none, KEY_BACKSPACE),
        '\t' => (none, KEY_TAB),
        ' ' => (none, KEY_SPACE),
        '-' => (none, 45),
        '_' => (shift, 45),
        '=' => (none, 46),
        '+' => (shift, 46),
        '[' => (none, 47),
        '{' => (shift, 47),
        ']' => (none, 48),
        '}' => (shift, 48),
        '\\' => (none, 49),
        '|' => (shift, 49),
        ';' => (none, 51),
        ':' => (shift, 51),
        '\'' => (none, 52),
        '"' => (shift, 52),
        '`' => (none, 53),
        '~' => (shift, 53),
        ',' => (none, 54),
        '<' => (shift, 54),
        '.' => (none, 55),
        '>' => (shift, 55),
        '/' => (none, 56),
        '?' => (shift, 56),
        _ => return None,
    };
    Some(entry)
}

/// Turns output actions into device writes.
///
/// Each key press is written as two separate reports (press, release) since
/// the gadget driver takes one report per write.
pub struct HidEncoder;

impl HidEncoder {
    /// Key presses an action expands to
    pub fn reports(action: &OutputAction) -> Vec<HidReport> {
        match action {
            OutputAction::Text(text) => text.chars().map(HidReport::for_char).collect(),
            OutputAction::Backspace(count) => vec![HidReport::backspace(); *count],
            OutputAction::KeyCombo(_) => Vec::new(),
        }
    }

    pub fn write_report<W: Write>(out: &mut W, report: HidReport) -> io::Result<()> {
        out.write_all(&report.to_bytes())?;
        out.write_all(&RELEASE_REPORT)
    }

    /// Writes one action and returns the number of key presses sent
    pub fn write_action<W: Write>(out: &mut W, action: &OutputAction) -> io::Result<usize> {
        if let OutputAction::KeyCombo(combo) = action {
            info!("send_key_combination: {}", combo);
            return Ok(0);
        }

        let reports = Self::reports(action);
        for report in &reports {
            Self::write_report(out, *report)?;
        }
        debug!("Wrote {} report(s) for {}", reports.len(), action);
        Ok(reports.len())
    }
}
