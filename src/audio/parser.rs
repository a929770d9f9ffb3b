//! Parser for the verbose `pactl list <kind>` output.
//!
//! The format is indentation based:
//!
//! ```text
//! Sink #0
//! 	State: SUSPENDED
//! 	Name: alsa_output.pci-0000_00_1f.3.analog-stereo
//! 	Properties:
//! 		device.description = "Built-in Audio"
//! ```
//!
//! It is not a stable contract, so anything that does not fit the expected
//! shape is dropped instead of failing the whole listing.

use std::collections::HashMap;

/// One top-level record of a `pactl list` listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBlock {
    /// Record type as printed before the index (`Sink`, `Source Output`, ...)
    pub kind: String,
    pub index: u32,
    /// Depth-1 `Key: Value` lines
    pub arguments: HashMap<String, String>,
    /// Depth-2 `key = "value"` lines (the proplist)
    pub properties: HashMap<String, String>,
}

impl ParsedBlock {
    pub fn argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).map(String::as_str)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

enum Line<'a> {
    Header(&'a str),
    Argument(&'a str),
    Property(&'a str),
    Other,
}

fn classify(line: &str) -> Line<'_> {
    let depth = line.chars().take_while(|c| *c == '\t').count();
    let body = &line[depth..];
    match depth {
        0 => Line::Header(body),
        1 => Line::Argument(body),
        2 => Line::Property(body),
        _ => Line::Other,
    }
}

fn parse_header(line: &str) -> Option<(String, u32)> {
    let (kind, index) = line.trim_end().rsplit_once('#')?;
    let index = index.trim().parse().ok()?;
    Some((kind.trim().to_string(), index))
}

fn parse_argument(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(": ")?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

fn parse_property(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(" = ")?;
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some((key.trim().to_string(), value.to_string()))
}

/// Turn a verbose listing into one [`ParsedBlock`] per `<Kind> #<index>` record.
pub fn parse(raw: &str) -> Vec<ParsedBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<ParsedBlock> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("Flags") {
            continue;
        }

        match classify(line) {
            Line::Header(body) => {
                blocks.extend(current.take());
                current = parse_header(body).map(|(kind, index)| ParsedBlock {
                    kind,
                    index,
                    ..Default::default()
                });
            }
            Line::Argument(body) => {
                if let (Some(block), Some((key, value))) = (current.as_mut(), parse_argument(body)) {
                    block.arguments.insert(key, value);
                }
            }
            Line::Property(body) => {
                if let (Some(block), Some((key, value))) = (current.as_mut(), parse_property(body)) {
                    block.properties.insert(key, value);
                }
            }
            Line::Other => {}
        }
    }

    blocks.extend(current);
    blocks
}
