//! Bit to steno key decoding
//!
//! The TinyMod4 spreads its 25 switches over the two scan fields: the directly
//! wired bank (`a`) and the port expander (`b`). The table below lists every
//! switch in steno order (`STKPWHRAO*EUFRPBLGTSDZ`), which is the order keys
//! are emitted in.

use std::fmt;

/// Layout of the keys on the board, rows as they are physically arranged.
pub const KEYS_LAYOUT: &str = "
    S1- T- P- H- *1 -F -P -L -T -D
    S2- K- W- R- *2 -R -B -G -S -Z
           A- O- #1 -E -U
";

/// Which of the two scan fields a key lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Direct GPIO bank
    A,
    /// Port expander bank
    B,
}

/// A physical switch on the TinyMod4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StenoKey {
    LeftS1,
    LeftS2,
    LeftT,
    LeftK,
    LeftP,
    LeftW,
    LeftH,
    LeftR,
    LeftA,
    LeftO,
    Star1,
    Star2,
    Number1,
    RightE,
    RightU,
    RightF,
    RightR,
    RightP,
    RightB,
    RightL,
    RightG,
    RightT,
    RightS,
    RightD,
    RightZ,
}

/// Key, field and bit, in steno order.
pub const KEY_TABLE: [(StenoKey, Field, u16); 25] = [
    (StenoKey::LeftS1, Field::A, 0x0010),
    (StenoKey::LeftS2, Field::A, 0x0008),
    (StenoKey::LeftT, Field::A, 0x0020),
    (StenoKey::LeftK, Field::A, 0x0004),
    (StenoKey::LeftP, Field::A, 0x0040),
    (StenoKey::LeftW, Field::A, 0x0002),
    (StenoKey::LeftH, Field::A, 0x0080),
    (StenoKey::LeftR, Field::A, 0x0001),
    (StenoKey::LeftA, Field::B, 0x0008),
    (StenoKey::LeftO, Field::B, 0x0010),
    (StenoKey::Star1, Field::A, 0x0100),
    (StenoKey::Star2, Field::B, 0x0200),
    (StenoKey::Number1, Field::B, 0x0020),
    (StenoKey::RightE, Field::B, 0x0040),
    (StenoKey::RightU, Field::B, 0x0080),
    (StenoKey::RightF, Field::B, 0x8000),
    (StenoKey::RightR, Field::B, 0x0001),
    (StenoKey::RightP, Field::B, 0x4000),
    (StenoKey::RightB, Field::B, 0x0002),
    (StenoKey::RightL, Field::B, 0x2000),
    (StenoKey::RightG, Field::B, 0x0004),
    (StenoKey::RightT, Field::B, 0x1000),
    (StenoKey::RightS, Field::B, 0x0800),
    (StenoKey::RightD, Field::B, 0x0100),
    (StenoKey::RightZ, Field::B, 0x0400),
];

impl StenoKey {
    /// Canonical machine key name, as used in keymaps
    pub fn name(self) -> &'static str {
        match self {
            StenoKey::LeftS1 => "S1-",
            StenoKey::LeftS2 => "S2-",
            StenoKey::LeftT => "T-",
            StenoKey::LeftK => "K-",
            StenoKey::LeftP => "P-",
            StenoKey::LeftW => "W-",
            StenoKey::LeftH => "H-",
            StenoKey::LeftR => "R-",
            StenoKey::LeftA => "A-",
            StenoKey::LeftO => "O-",
            StenoKey::Star1 => "*1",
            StenoKey::Star2 => "*2",
            StenoKey::Number1 => "#1",
            StenoKey::RightE => "-E",
            StenoKey::RightU => "-U",
            StenoKey::RightF => "-F",
            StenoKey::RightR => "-R",
            StenoKey::RightP => "-P",
            StenoKey::RightB => "-B",
            StenoKey::RightL => "-L",
            StenoKey::RightG => "-G",
            StenoKey::RightT => "-T",
            StenoKey::RightS => "-S",
            StenoKey::RightD => "-D",
            StenoKey::RightZ => "-Z",
        }
    }

    pub fn from_name(name: &str) -> Option<StenoKey> {
        KEY_TABLE
            .iter()
            .map(|(key, _, _)| *key)
            .find(|key| key.name() == name)
    }

    /// All keys in steno order
    pub fn all() -> impl Iterator<Item = StenoKey> {
        KEY_TABLE.iter().map(|(key, _, _)| *key)
    }
}

impl fmt::Display for StenoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The keys of one chord, in steno order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet(Vec<StenoKey>);

impl KeySet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> &[StenoKey] {
        &self.0
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|key| key.name()).collect()
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(" "))
    }
}

/// Decodes the accumulated fields of a chord into its keys.
pub fn decode(a: u16, b: u16) -> KeySet {
    let keys = KEY_TABLE
        .iter()
        .filter(|(_, field, bit)| {
            let value = match field {
                Field::A => a,
                Field::B => b,
            };
            value & bit != 0
        })
        .map(|(key, _, _)| *key)
        .collect();
    KeySet(keys)
}
