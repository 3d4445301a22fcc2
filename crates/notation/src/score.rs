//! MIDI note events quantized into measures.

use std::collections::BTreeMap;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

pub const DEFAULT_TEMPO_BPM: f64 = 120.0;
pub const DEFAULT_TIME_SIGNATURE: (u32, u32) = (4, 4);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawNote {
    pub key: u8,
    pub start_tick: u64,
    pub end_tick: u64,
}

/// Note events of a MIDI file grouped by channel, in ticks.
#[derive(Clone, Debug, PartialEq)]
pub struct MidiNotes {
    pub ticks_per_quarter: u32,
    pub tempo_bpm: f64,
    pub time_signature: (u32, u32),
    pub channels: BTreeMap<u8, Vec<RawNote>>,
}

impl MidiNotes {
    pub fn parse(bytes: &[u8]) -> Result<Self, midly::Error> {
        let smf = Smf::parse(bytes)?;
        let mut tempo_bpm = None;
        let mut time_signature = None;
        let mut channels: BTreeMap<u8, Vec<RawNote>> = BTreeMap::new();

        for track in &smf.tracks {
            let mut tick = 0u64;
            let mut open: BTreeMap<(u8, u8), Vec<u64>> = BTreeMap::new();
            for event in track {
                tick += u64::from(event.delta.as_int());
                match event.kind {
                    TrackEventKind::Midi { channel, message } => {
                        let channel = channel.as_int();
                        match message {
                            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                                open.entry((channel, key.as_int())).or_default().push(tick);
                            }
                            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                                let key = key.as_int();
                                if let Some(starts) = open.get_mut(&(channel, key)) {
                                    if !starts.is_empty() {
                                        let start_tick = starts.remove(0);
                                        channels.entry(channel).or_default().push(RawNote {
                                            key,
                                            start_tick,
                                            end_tick: tick,
                                        });
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                        let us = us_per_quarter.as_int();
                        if tempo_bpm.is_none() && us > 0 {
                            tempo_bpm = Some(60_000_000.0 / f64::from(us));
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denom_pow, _, _)) => {
                        if time_signature.is_none() && numerator > 0 && denom_pow < 7 {
                            time_signature = Some((u32::from(numerator), 1u32 << denom_pow));
                        }
                    }
                    _ => {}
                }
            }
            // notes still sounding when the track ends
            for ((channel, key), starts) in open {
                for start_tick in starts {
                    channels.entry(channel).or_default().push(RawNote {
                        key,
                        start_tick,
                        end_tick: tick.max(start_tick + 1),
                    });
                }
            }
        }

        let tempo_bpm = tempo_bpm.unwrap_or(DEFAULT_TEMPO_BPM);
        let ticks_per_quarter = match smf.header.timing {
            Timing::Metrical(tpq) => u32::from(tpq.as_int()),
            Timing::Timecode(fps, subframe) => {
                let ticks_per_second = f64::from(fps.as_f32()) * f64::from(subframe);
                (ticks_per_second * 60.0 / tempo_bpm).round() as u32
            }
        }
        .max(1);

        for notes in channels.values_mut() {
            notes.sort_by_key(|note| (note.start_tick, note.key));
        }

        Ok(Self {
            ticks_per_quarter,
            tempo_bpm,
            time_signature: time_signature.unwrap_or(DEFAULT_TIME_SIGNATURE),
            channels,
        })
    }

    pub fn note_count(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }
}

/// One `<note>` element: a rest when `pitches` is empty, a chord when it holds
/// more than one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub pitches: Vec<u8>,
    pub duration: u32,
    pub tie_start: bool,
    pub tie_stop: bool,
    pub measure_rest: bool,
}

impl Entry {
    fn rest(duration: u32) -> Self {
        Self {
            pitches: Vec::new(),
            duration,
            tie_start: false,
            tie_stop: false,
            measure_rest: false,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.pitches.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub channel: u8,
    pub bass_clef: bool,
    pub measures: Vec<Vec<Entry>>,
}

/// A quantized score, durations in `divisions` per quarter note.
#[derive(Clone, Debug, PartialEq)]
pub struct Score {
    pub divisions: u32,
    pub tempo_bpm: f64,
    pub time_signature: (u32, u32),
    pub parts: Vec<Part>,
}

impl Score {
    pub fn measure_len(&self) -> u32 {
        measure_len(self.time_signature, self.divisions)
    }
}

fn measure_len((beats, beat_type): (u32, u32), divisions: u32) -> u32 {
    let len = u64::from(beats) * u64::from(divisions) * 4 / u64::from(beat_type.max(1));
    if len == 0 {
        divisions.saturating_mul(4)
    } else {
        u32::try_from(len).unwrap_or(u32::MAX)
    }
}

/// Smallest multiple of `divisions` that makes one bar a whole number of divisions.
fn grid_for_meter((beats, beat_type): (u32, u32), divisions: u32) -> u32 {
    let beat_type = beat_type.max(1);
    let step = beat_type / gcd(beat_type, beats.max(1).saturating_mul(4));
    divisions.div_ceil(step).saturating_mul(step)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[derive(Clone, Debug)]
struct Event {
    start: u32,
    duration: u32,
    pitches: Vec<u8>,
}

/// Snaps notes to the grid and lays every channel out as one voice of
/// chords and rests split at barlines.
pub fn quantize(notes: &MidiNotes, divisions: u32) -> Score {
    let divisions = grid_for_meter(notes.time_signature, divisions.max(1));
    let grid = f64::from(notes.ticks_per_quarter) / f64::from(divisions);
    let snap = |tick: u64| (tick as f64 / grid).round() as u32;
    let bar = measure_len(notes.time_signature, divisions);

    let mut voices: Vec<(u8, Vec<Event>, bool)> = notes
        .channels
        .iter()
        .filter(|(_, raw)| !raw.is_empty())
        .map(|(channel, raw)| {
            let mut onsets: BTreeMap<u32, (u32, Vec<u8>)> = BTreeMap::new();
            for note in raw {
                let start = snap(note.start_tick);
                let end = snap(note.end_tick).max(start + 1);
                let slot = onsets.entry(start).or_insert((end, Vec::new()));
                slot.0 = slot.0.max(end);
                slot.1.push(note.key);
            }
            let mean_key =
                raw.iter().map(|n| u32::from(n.key)).sum::<u32>() / raw.len() as u32;
            (*channel, voice_events(onsets), mean_key < 60)
        })
        .collect();

    if voices.is_empty() {
        voices.push((0, Vec::new(), false));
    }

    let score_end = voices
        .iter()
        .filter_map(|(_, events, _)| events.last().map(|e| e.start + e.duration))
        .max()
        .unwrap_or(0);

    let parts = voices
        .into_iter()
        .map(|(channel, events, bass_clef)| Part {
            channel,
            bass_clef,
            measures: into_measures(events, bar, score_end),
        })
        .collect();

    Score {
        divisions,
        tempo_bpm: notes.tempo_bpm,
        time_signature: notes.time_signature,
        parts,
    }
}

fn voice_events(onsets: BTreeMap<u32, (u32, Vec<u8>)>) -> Vec<Event> {
    let starts: Vec<u32> = onsets.keys().copied().collect();
    let mut events = Vec::with_capacity(onsets.len() * 2);
    let mut cursor = 0;
    for (index, (start, (end, mut pitches))) in onsets.into_iter().enumerate() {
        if start > cursor {
            events.push(Event {
                start: cursor,
                duration: start - cursor,
                pitches: Vec::new(),
            });
        }
        let end = end.min(starts.get(index + 1).copied().unwrap_or(u32::MAX));
        pitches.sort_unstable();
        pitches.dedup();
        events.push(Event {
            start,
            duration: end - start,
            pitches,
        });
        cursor = end;
    }
    events
}

fn into_measures(mut events: Vec<Event>, bar: u32, score_end: u32) -> Vec<Vec<Entry>> {
    let end = events.last().map(|e| e.start + e.duration).unwrap_or(0);
    let padded_end = score_end.div_ceil(bar).max(1) * bar;
    if end < padded_end {
        events.push(Event {
            start: end,
            duration: padded_end - end,
            pitches: Vec::new(),
        });
    }

    let mut measures = vec![Vec::new(); (padded_end / bar) as usize];
    for event in events {
        let mut start = event.start;
        let mut remaining = event.duration;
        let mut first = true;
        while remaining > 0 {
            let room = bar - start % bar;
            let len = remaining.min(room);
            remaining -= len;
            let pitched = !event.pitches.is_empty();
            let measure = &mut measures[(start / bar) as usize];
            if !pitched && len == bar {
                measure.push(Entry {
                    measure_rest: true,
                    ..Entry::rest(len)
                });
            } else {
                measure.push(Entry {
                    pitches: event.pitches.clone(),
                    duration: len,
                    tie_start: pitched && remaining > 0,
                    tie_stop: pitched && !first,
                    measure_rest: false,
                });
            }
            start += len;
            first = false;
        }
    }
    measures
}
