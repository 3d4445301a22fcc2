use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// A waveform written to disk by one of the stages.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioAsset {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioAsset {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, channels: u16) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            channels,
        }
    }

    /// File name without its final extension, e.g. `song.norm` for `song.norm.wav`.
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Ordinal stem identifier, rendered as `stem0`, `stem1`, ...
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StemId(pub usize);

impl StemId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stem{}", self.0)
    }
}

impl From<StemId> for String {
    fn from(id: StemId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for StemId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .strip_prefix("stem")
            .and_then(|ordinal| ordinal.parse().ok())
            .map(StemId)
            .ok_or_else(|| DomainError::validation(format!("invalid stem id {value:?}")))
    }
}

/// Fused stems keyed by ordinal. Iteration order is ordinal order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StemSet {
    stems: BTreeMap<StemId, AudioAsset>,
}

impl StemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: StemId, asset: AudioAsset) {
        self.stems.insert(id, asset);
    }

    pub fn get(&self, id: StemId) -> Option<&AudioAsset> {
        self.stems.get(&id)
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StemId, &AudioAsset)> {
        self.stems.iter().map(|(id, asset)| (*id, asset))
    }

    pub fn ids(&self) -> Vec<StemId> {
        self.stems.keys().copied().collect()
    }
}

impl FromIterator<(StemId, AudioAsset)> for StemSet {
    fn from_iter<I: IntoIterator<Item = (StemId, AudioAsset)>>(iter: I) -> Self {
        Self {
            stems: iter.into_iter().collect(),
        }
    }
}

/// Which logical track an artifact belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackSlot {
    Main,
    Stem(StemId),
}

impl TrackSlot {
    /// Directory component used under `midi/`, `xml/` and `pdf/`.
    pub fn dir_name(&self) -> String {
        match self {
            TrackSlot::Main => "main".to_string(),
            TrackSlot::Stem(id) => id.to_string(),
        }
    }
}

impl fmt::Display for TrackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// Canonical name for every artifact derived from one track.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackName {
    pub slot: TrackSlot,
    pub hint: String,
}

impl TrackName {
    pub fn main(base: &str) -> Self {
        Self {
            slot: TrackSlot::Main,
            hint: base.to_string(),
        }
    }

    pub fn stem(base: &str, id: StemId) -> Self {
        Self {
            slot: TrackSlot::Stem(id),
            hint: format!("{base}_{id}"),
        }
    }
}

impl fmt::Display for TrackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hint)
    }
}

/// Raw per-frame output of the transcription model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RawModelOutput {
    Saved(PathBuf),
    /// The model did not expose raw output; carries the zero marker.
    Placeholder(u8),
}

impl RawModelOutput {
    pub const PLACEHOLDER_MARKER: u8 = 0;

    pub fn placeholder() -> Self {
        Self::Placeholder(Self::PLACEHOLDER_MARKER)
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            RawModelOutput::Saved(path) => Some(path),
            RawModelOutput::Placeholder(_) => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptionResult {
    pub midi: PathBuf,
    pub raw_output: RawModelOutput,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum XmlSource {
    Tool,
    Fallback,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotationArtifact {
    pub name: TrackName,
    pub musicxml: PathBuf,
    pub musicxml_source: XmlSource,
    pub pdf: Option<PathBuf>,
}

/// Everything one completed run produced.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineResult {
    pub raw_audio: PathBuf,
    pub normalized: AudioAsset,
    pub stems: StemSet,
    pub main_midi: TranscriptionResult,
    pub main_notation: NotationArtifact,
    pub stems_midi: BTreeMap<StemId, TranscriptionResult>,
    pub stems_notation: BTreeMap<StemId, NotationArtifact>,
}

impl PipelineResult {
    pub fn main_xml(&self) -> &Path {
        &self.main_notation.musicxml
    }

    pub fn main_pdf(&self) -> Option<&Path> {
        self.main_notation.pdf.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_id_round_trips_through_string() {
        let id = StemId::try_from("stem12".to_string()).unwrap();
        assert_eq!(id, StemId(12));
        assert_eq!(String::from(id), "stem12");
        assert!(StemId::try_from("vocals".to_string()).is_err());
    }

    #[test]
    fn stem_set_iterates_in_ordinal_order() {
        let set: StemSet = [5, 0, 10, 2]
            .into_iter()
            .map(|i| (StemId(i), AudioAsset::new(format!("s{i}.wav"), 44_100, 2)))
            .collect();
        assert_eq!(
            set.ids(),
            vec![StemId(0), StemId(2), StemId(5), StemId(10)]
        );
    }

    #[test]
    fn track_names_follow_slot() {
        let main = TrackName::main("song");
        assert_eq!(main.hint, "song");
        assert_eq!(main.slot.dir_name(), "main");

        let stem = TrackName::stem("song", StemId(3));
        assert_eq!(stem.hint, "song_stem3");
        assert_eq!(stem.slot.dir_name(), "stem3");
    }

    #[test]
    fn placeholder_carries_zero_marker() {
        let raw = RawModelOutput::placeholder();
        assert_eq!(raw, RawModelOutput::Placeholder(0));
        assert!(raw.path().is_none());
    }

    #[test]
    fn stem_keyed_maps_serialize_to_json() {
        let mut map = BTreeMap::new();
        map.insert(
            StemId(1),
            TranscriptionResult {
                midi: PathBuf::from("midi/stem1/song_stem1.mid"),
                raw_output: RawModelOutput::placeholder(),
            },
        );
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"stem1\""));
    }
}
