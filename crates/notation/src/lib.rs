//! Notation export: MIDI to MusicXML through an external tool with a built-in
//! fallback converter, and MusicXML to PDF through the same tool.

pub mod error;
pub mod exporter;
pub mod fallback;
pub mod musicxml;
pub mod score;
pub mod tool;

pub use crate::error::NotationError;
pub use crate::exporter::NotationExporter;
pub use crate::fallback::{midi_to_musicxml, FallbackConverter};
pub use crate::tool::{MuseScoreCli, NotationTool, ToolOutcome};
