//! Serializes a quantized [`Score`] as a score-partwise 3.1 document.

use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;

use crate::score::{Entry, Part, Score};

const DOCTYPE: &str = r#"score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd""#;

const STEPS: [(&str, i8); 12] = [
    ("C", 0),
    ("C", 1),
    ("D", 0),
    ("D", 1),
    ("E", 0),
    ("F", 0),
    ("F", 1),
    ("G", 0),
    ("G", 1),
    ("A", 0),
    ("A", 1),
    ("B", 0),
];

/// Note types with their length in quarter notes as a fraction.
const NOTE_TYPES: [(&str, u32, u32); 7] = [
    ("whole", 4, 1),
    ("half", 2, 1),
    ("quarter", 1, 1),
    ("eighth", 1, 2),
    ("16th", 1, 4),
    ("32nd", 1, 8),
    ("64th", 1, 16),
];

type XmlResult<T> = Result<T, quick_xml::Error>;

pub fn write_score(score: &Score, title: &str) -> XmlResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(DOCTYPE)))?;

    writer
        .create_element("score-partwise")
        .with_attribute(("version", "3.1"))
        .write_inner_content(|w| {
            w.create_element("work").write_inner_content(|w| {
                text_element(w, "work-title", title)?;
                Ok(())
            })?;
            w.create_element("part-list").write_inner_content(|w| {
                for (index, part) in score.parts.iter().enumerate() {
                    w.create_element("score-part")
                        .with_attribute(("id", part_id(index).as_str()))
                        .write_inner_content(|w| {
                            let name = format!("Channel {}", part.channel + 1);
                            text_element(w, "part-name", &name)?;
                            Ok(())
                        })?;
                }
                Ok(())
            })?;
            for (index, part) in score.parts.iter().enumerate() {
                write_part(w, score, part, &part_id(index))?;
            }
            Ok(())
        })?;

    // quick-xml only emits valid UTF-8 from &str input
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn part_id(index: usize) -> String {
    format!("P{}", index + 1)
}

fn text_element(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> XmlResult<()> {
    w.create_element(name)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn write_part(w: &mut Writer<Vec<u8>>, score: &Score, part: &Part, id: &str) -> XmlResult<()> {
    w.create_element("part")
        .with_attribute(("id", id))
        .write_inner_content(|w| {
            for (index, entries) in part.measures.iter().enumerate() {
                let number = (index + 1).to_string();
                w.create_element("measure")
                    .with_attribute(("number", number.as_str()))
                    .write_inner_content(|w| {
                        if index == 0 {
                            write_attributes(w, score, part)?;
                            write_tempo(w, score.tempo_bpm)?;
                        }
                        for entry in entries {
                            write_entry(w, entry, score.divisions)?;
                        }
                        Ok(())
                    })?;
            }
            Ok(())
        })?;
    Ok(())
}

fn write_attributes(w: &mut Writer<Vec<u8>>, score: &Score, part: &Part) -> XmlResult<()> {
    let (beats, beat_type) = score.time_signature;
    w.create_element("attributes").write_inner_content(|w| {
        text_element(w, "divisions", &score.divisions.to_string())?;
        w.create_element("key").write_inner_content(|w| {
            text_element(w, "fifths", "0")?;
            Ok(())
        })?;
        w.create_element("time").write_inner_content(|w| {
            text_element(w, "beats", &beats.to_string())?;
            text_element(w, "beat-type", &beat_type.to_string())?;
            Ok(())
        })?;
        let (sign, line) = if part.bass_clef { ("F", "4") } else { ("G", "2") };
        w.create_element("clef").write_inner_content(|w| {
            text_element(w, "sign", sign)?;
            text_element(w, "line", line)?;
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(())
}

fn write_tempo(w: &mut Writer<Vec<u8>>, bpm: f64) -> XmlResult<()> {
    let bpm = format_bpm(bpm);
    w.create_element("direction")
        .with_attribute(("placement", "above"))
        .write_inner_content(|w| {
            w.create_element("direction-type").write_inner_content(|w| {
                w.create_element("metronome").write_inner_content(|w| {
                    text_element(w, "beat-unit", "quarter")?;
                    text_element(w, "per-minute", &bpm)?;
                    Ok(())
                })?;
                Ok(())
            })?;
            w.create_element("sound")
                .with_attribute(("tempo", bpm.as_str()))
                .write_empty()?;
            Ok(())
        })?;
    Ok(())
}

fn format_bpm(bpm: f64) -> String {
    let rounded = (bpm * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

fn write_entry(w: &mut Writer<Vec<u8>>, entry: &Entry, divisions: u32) -> XmlResult<()> {
    if entry.is_rest() {
        return write_note(w, None, false, entry, divisions);
    }
    for (index, key) in entry.pitches.iter().enumerate() {
        write_note(w, Some(*key), index > 0, entry, divisions)?;
    }
    Ok(())
}

fn write_note(
    w: &mut Writer<Vec<u8>>,
    key: Option<u8>,
    chord: bool,
    entry: &Entry,
    divisions: u32,
) -> XmlResult<()> {
    w.create_element("note").write_inner_content(|w| {
        if chord {
            w.create_element("chord").write_empty()?;
        }
        match key {
            Some(key) => {
                let (step, alter) = STEPS[usize::from(key % 12)];
                let octave = i32::from(key / 12) - 1;
                w.create_element("pitch").write_inner_content(|w| {
                    text_element(w, "step", step)?;
                    if alter != 0 {
                        text_element(w, "alter", &alter.to_string())?;
                    }
                    text_element(w, "octave", &octave.to_string())?;
                    Ok(())
                })?;
            }
            None if entry.measure_rest => {
                w.create_element("rest")
                    .with_attribute(("measure", "yes"))
                    .write_empty()?;
            }
            None => {
                w.create_element("rest").write_empty()?;
            }
        }
        text_element(w, "duration", &entry.duration.to_string())?;
        if entry.tie_stop {
            w.create_element("tie").with_attribute(("type", "stop")).write_empty()?;
        }
        if entry.tie_start {
            w.create_element("tie").with_attribute(("type", "start")).write_empty()?;
        }
        text_element(w, "voice", "1")?;
        if !entry.measure_rest {
            if let Some((name, dotted)) = note_type(entry.duration, divisions) {
                text_element(w, "type", name)?;
                if dotted {
                    w.create_element("dot").write_empty()?;
                }
            }
        }
        if entry.tie_start || entry.tie_stop {
            w.create_element("notations").write_inner_content(|w| {
                if entry.tie_stop {
                    w.create_element("tied").with_attribute(("type", "stop")).write_empty()?;
                }
                if entry.tie_start {
                    w.create_element("tied").with_attribute(("type", "start")).write_empty()?;
                }
                Ok(())
            })?;
        }
        Ok(())
    })?;
    Ok(())
}

/// Graphic type for a duration, when it is exactly a plain or single-dotted value.
pub fn note_type(duration: u32, divisions: u32) -> Option<(&'static str, bool)> {
    NOTE_TYPES.iter().find_map(|&(name, quarters, per)| {
        let plain = u64::from(duration) * u64::from(per) == u64::from(divisions) * u64::from(quarters);
        let dotted = u64::from(duration) * u64::from(per) * 2
            == u64::from(divisions) * u64::from(quarters) * 3;
        if plain {
            Some((name, false))
        } else if dotted {
            Some((name, true))
        } else {
            None
        }
    })
}
