//! TinyMod4 steno machine driver.
//!
//! [`machine`] scans the switches and turns chords into strokes, [`output`]
//! types text on the host through the USB HID gadget.

pub mod config;
pub mod machine;
pub mod output;
