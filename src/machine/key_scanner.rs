use crate::config::ScannerConfig;
use crate::machine::board::{KeyBoard, ScanError};
use crate::machine::chord_decoder::{self, KeySet};
use statum::{machine, state};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One reading of both banks, active high
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sample {
    pub a: u16,
    pub b: u16,
}

impl Sample {
    pub fn new(a: u16, b: u16) -> Self {
        Self { a, b }
    }

    /// True while any switch on either bank is down
    pub fn any_down(self) -> bool {
        self.a | self.b != 0
    }
}

/// Accumulated fields of a finished chord
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chord {
    pub a: u16,
    pub b: u16,
}

impl Chord {
    pub fn keys(self) -> KeySet {
        chord_decoder::decode(self.a, self.b)
    }
}

/// Press envelope of the chord currently being scanned.
///
/// Every sample is OR'd in, so the chord is the union of every key that was
/// down at some point, not just the keys still held at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChordState {
    pub pressed: bool,
    pub accumulated_a: u16,
    pub accumulated_b: u16,
}

impl ChordState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Folds a sample in and returns whether keys are still down.
    pub fn absorb(&mut self, sample: Sample) -> bool {
        self.pressed = sample.any_down();
        self.accumulated_a |= sample.a;
        self.accumulated_b |= sample.b;
        self.pressed
    }

    pub fn chord(&self) -> Chord {
        Chord {
            a: self.accumulated_a,
            b: self.accumulated_b,
        }
    }
}

// Scanner settings
#[derive(Clone, Debug)]
pub struct ScanSettings {
    pub settle_delay: Duration,
    pub idle_poll: Option<Duration>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(30),
            idle_poll: None,
        }
    }
}

impl From<&ScannerConfig> for ScanSettings {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            idle_poll: config.idle_poll(),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum ScanState {
    Connecting,
    Scanning,
}

#[machine]
pub struct KeyScanner<S: ScanState> {
    // Connected hardware
    board: Box<dyn KeyBoard>,

    settings: ScanSettings,

    // Checked while idle, a held chord always finishes
    stop: Arc<AtomicBool>,

    // Scratch state of the chord in progress
    chord: ChordState,
}

impl<S: ScanState> KeyScanner<S> {
    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }
}

impl KeyScanner<Connecting> {
    pub fn create(board: Box<dyn KeyBoard>, settings: ScanSettings, stop: Arc<AtomicBool>) -> Self {
        debug!("Creating KeyScanner with settings: {:?}", settings);
        Self::new(board, settings, stop, ChordState::default())
    }

    /// Checks the mode switch and transitions to Scanning
    pub fn initialize(mut self) -> Result<KeyScanner<Scanning>, ScanError> {
        if !self.board.nkro_selected()? {
            warn!("NKRO not selected on board. TinyMod4 disabled.");
            return Err(ScanError::NkroNotSelected);
        }

        info!("KeyScanner initialized, transitioning to Scanning state");
        Ok(self.transition())
    }
}

impl KeyScanner<Scanning> {
    /// Reads both banks once
    pub fn sample(&mut self) -> Result<Sample, ScanError> {
        let a = self.board.read_direct()?;
        let b = self.board.read_expander()?;
        Ok(Sample::new(a, b))
    }

    /// Blocks until one chord has been pressed and fully released.
    ///
    /// Returns `Ok(None)` when the stop flag is raised while no key is down.
    pub fn scan_chord(&mut self) -> Result<Option<Chord>, ScanError> {
        self.chord.reset();

        loop {
            if !self.wait_for_activity()? {
                return Ok(None);
            }

            // A key may just be starting to go down, give the rest of the chord time to land
            std::thread::sleep(self.settings.settle_delay);
            let confirm = self.sample()?;
            if self.chord.absorb(confirm) {
                break;
            }
            debug!("Activity gone after settle delay, back to idle");
        }

        while self.chord.pressed {
            let sample = self.sample()?;
            self.chord.absorb(sample);
        }

        let chord = self.chord.chord();
        debug!("Chord released: a=0x{:04x} b=0x{:04x}", chord.a, chord.b);
        Ok(Some(chord))
    }

    // Idle phase: poll until anything is down. False when stopped.
    fn wait_for_activity(&mut self) -> Result<bool, ScanError> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                debug!("Stop requested while idle");
                return Ok(false);
            }

            if self.sample()?.any_down() {
                return Ok(true);
            }

            if let Some(interval) = self.settings.idle_poll {
                std::thread::sleep(interval);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays samples, then reads idle forever.
    pub(crate) struct ScriptedBoard {
        samples: VecDeque<Result<Sample, String>>,
        current: Sample,
        nkro: bool,
    }

    impl ScriptedBoard {
        pub(crate) fn new(samples: Vec<Sample>) -> Self {
            Self {
                samples: samples.into_iter().map(Ok).collect(),
                current: Sample::default(),
                nkro: true,
            }
        }

        pub(crate) fn failing_after(samples: Vec<Sample>, message: &str) -> Self {
            let mut board = Self::new(samples);
            board.samples.push_back(Err(message.to_string()));
            board
        }

        pub(crate) fn without_nkro(mut self) -> Self {
            self.nkro = false;
            self
        }
    }

    impl KeyBoard for ScriptedBoard {
        fn read_direct(&mut self) -> Result<u16, ScanError> {
            self.current = match self.samples.pop_front() {
                Some(Ok(sample)) => sample,
                Some(Err(message)) => return Err(ScanError::ReadError(message)),
                None => Sample::default(),
            };
            Ok(self.current.a)
        }

        fn read_expander(&mut self) -> Result<u16, ScanError> {
            Ok(self.current.b)
        }

        fn nkro_selected(&mut self) -> Result<bool, ScanError> {
            Ok(self.nkro)
        }
    }

    fn no_delay() -> ScanSettings {
        ScanSettings {
            settle_delay: Duration::ZERO,
            idle_poll: None,
        }
    }

    fn scanner(board: ScriptedBoard) -> (KeyScanner<Scanning>, Arc<AtomicBool>) {
        let stop = Arc::new(AtomicBool::new(false));
        let scanner = KeyScanner::create(Box::new(board), no_delay(), stop.clone())
            .initialize()
            .unwrap();
        (scanner, stop)
    }

    #[test]
    fn any_down_checks_both_banks() {
        assert!(!Sample::new(0, 0).any_down());
        assert!(Sample::new(0x100, 0).any_down());
        assert!(Sample::new(0, 0x8000).any_down());
    }

    #[test]
    fn accumulation_is_union_of_samples() {
        let mut state = ChordState::default();
        assert!(state.absorb(Sample::new(0x10, 0)));
        assert!(state.absorb(Sample::new(0x10, 0x40)));
        assert!(state.absorb(Sample::new(0x10, 0x40)));
        assert!(!state.absorb(Sample::default()));
        assert_eq!(state.chord(), Chord { a: 0x10, b: 0x40 });

        state.reset();
        assert_eq!(state, ChordState::default());
    }

    #[test]
    fn refuses_keyboard_mode() {
        let stop = Arc::new(AtomicBool::new(false));
        let board = ScriptedBoard::new(Vec::new()).without_nkro();
        let result = KeyScanner::create(Box::new(board), no_delay(), stop).initialize();
        assert!(matches!(result, Err(ScanError::NkroNotSelected)));
    }

    #[test]
    fn keys_added_before_release_are_kept() {
        let (mut scanner, _stop) = scanner(ScriptedBoard::new(vec![
            Sample::default(),
            Sample::new(0x10, 0),
            Sample::new(0x10, 0),
            Sample::new(0x10, 0x08),
            Sample::new(0, 0x08),
            Sample::default(),
        ]));

        let chord = scanner.scan_chord().unwrap().unwrap();
        assert_eq!(chord, Chord { a: 0x10, b: 0x08 });
        assert_eq!(chord.keys().names(), vec!["S1-", "A-"]);
    }

    #[test]
    fn bounce_shorter_than_settle_delay_is_ignored() {
        let (mut scanner, _stop) = scanner(ScriptedBoard::new(vec![
            Sample::new(0x01, 0),
            Sample::default(),
            Sample::default(),
            Sample::new(0, 0x100),
            Sample::new(0, 0x100),
            Sample::default(),
        ]));

        let chord = scanner.scan_chord().unwrap().unwrap();
        assert_eq!(chord, Chord { a: 0, b: 0x100 });
    }

    #[test]
    fn consecutive_chords_do_not_leak() {
        let (mut scanner, _stop) = scanner(ScriptedBoard::new(vec![
            Sample::new(0x20, 0),
            Sample::new(0x20, 0),
            Sample::default(),
            Sample::new(0, 0x400),
            Sample::new(0, 0x400),
            Sample::default(),
        ]));

        assert_eq!(scanner.scan_chord().unwrap(), Some(Chord { a: 0x20, b: 0 }));
        assert_eq!(scanner.scan_chord().unwrap(), Some(Chord { a: 0, b: 0x400 }));
    }

    #[test]
    fn stop_while_idle_ends_scan() {
        let (mut scanner, stop) = scanner(ScriptedBoard::new(Vec::new()));
        stop.store(true, Ordering::Relaxed);
        assert_eq!(scanner.scan_chord().unwrap(), None);
    }

    #[test]
    fn read_failure_mid_chord_is_reported() {
        let (mut scanner, _stop) = scanner(ScriptedBoard::failing_after(
            vec![Sample::new(0x10, 0), Sample::new(0x10, 0)],
            "bus gone",
        ));
        assert!(matches!(scanner.scan_chord(), Err(ScanError::ReadError(_))));
    }
}
