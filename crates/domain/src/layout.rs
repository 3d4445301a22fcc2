//! Deterministic file naming for every stage output.
//!
//! All paths are pure functions of the output root, the input file name and
//! the track name, so rerunning on the same input overwrites in place.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assets::{StemId, TrackName, TrackSlot};

pub const NORMALIZED_SUFFIX: &str = "norm";
pub const ENSEMBLE_DIR: &str = "ensemble";

/// Where the normalized working file is written.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedPlacement {
    #[default]
    AlongsideInput,
    OutputRoot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `song.wav` becomes `song.norm.wav`, next to the input or under the root.
    ///
    /// The full file stem is kept, so `take.norm.wav` maps to
    /// `take.norm.norm.wav` and never to the input itself.
    pub fn normalized_path(&self, input: &Path, placement: NormalizedPlacement) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let file_name = format!("{stem}.{NORMALIZED_SUFFIX}.wav");
        match placement {
            NormalizedPlacement::AlongsideInput => input.with_file_name(file_name),
            NormalizedPlacement::OutputRoot => self.root.join(file_name),
        }
    }

    pub fn stems_dir(&self) -> PathBuf {
        self.root.join("stems")
    }

    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.stems_dir().join(model)
    }

    pub fn ensemble_dir(&self) -> PathBuf {
        self.stems_dir().join(ENSEMBLE_DIR)
    }

    pub fn fused_stem_path(&self, base: &str, id: StemId) -> PathBuf {
        self.ensemble_dir().join(format!("{base}_{id}.wav"))
    }

    pub fn midi_dir(&self, slot: TrackSlot) -> PathBuf {
        self.root.join("midi").join(slot.dir_name())
    }

    pub fn midi_path(&self, name: &TrackName) -> PathBuf {
        self.midi_dir(name.slot).join(format!("{}.mid", name.hint))
    }

    pub fn raw_output_path(&self, name: &TrackName) -> PathBuf {
        self.midi_dir(name.slot).join(format!("{}.npz", name.hint))
    }

    pub fn musicxml_path(&self, name: &TrackName) -> PathBuf {
        let dir = match name.slot {
            TrackSlot::Main => self.root.join("score"),
            TrackSlot::Stem(id) => self.root.join("xml").join(id.to_string()),
        };
        dir.join(format!("{}.musicxml", name.hint))
    }

    pub fn pdf_path(&self, name: &TrackName) -> PathBuf {
        let dir = match name.slot {
            TrackSlot::Main => self.root.join("score"),
            TrackSlot::Stem(id) => self.root.join("pdf").join(id.to_string()),
        };
        dir.join(format!("{}.pdf", name.hint))
    }

    /// Every file a stem track of `base` can leave under the root.
    pub fn stem_artifacts(&self, base: &str, id: StemId) -> Vec<PathBuf> {
        let name = TrackName::stem(base, id);
        vec![
            self.fused_stem_path(base, id),
            self.midi_path(&name),
            self.raw_output_path(&name),
            self.musicxml_path(&name),
            self.pdf_path(&name),
        ]
    }

    /// Stem ordinals an earlier run left behind: `stemN` directories under
    /// `midi/`, `xml/` and `pdf/`, plus fused `{base}_stemN.wav` files.
    pub fn stem_ids_on_disk(&self, base: &str) -> BTreeSet<StemId> {
        let mut ids = BTreeSet::new();
        for kind in ["midi", "xml", "pdf"] {
            for name in entry_names(&self.root.join(kind)) {
                if let Ok(id) = StemId::try_from(name) {
                    ids.insert(id);
                }
            }
        }
        let prefix = format!("{base}_");
        for name in entry_names(&self.ensemble_dir()) {
            let id = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".wav"))
                .and_then(|rest| StemId::try_from(rest.to_string()).ok());
            if let Some(id) = id {
                ids.insert(id);
            }
        }
        ids
    }
}

fn entry_names(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Logical name of an input: its file stem with any `.norm` marker removed.
pub fn base_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    stem.strip_suffix(&format!(".{NORMALIZED_SUFFIX}"))
        .map(str::to_string)
        .unwrap_or(stem)
}
