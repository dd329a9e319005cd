// Results Module - Reading race-result text files for the board
use std::path::Path;

use crate::grid::{fit_line, NUM_ROWS};
use crate::types::BoardError;

// Tried in order; the first that decodes wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1, // also covers ISO-8859-1, accepts every byte
}

// Latin-1 maps every byte, so the list never runs out and `Decode` is unreachable
// unless a stricter encoding ends up last
pub const ENCODINGS: [TextEncoding; 2] = [TextEncoding::Utf8, TextEncoding::Latin1];

impl TextEncoding {
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

pub fn decode_text(bytes: &[u8]) -> Option<(String, TextEncoding)> {
    ENCODINGS
        .iter()
        .find_map(|enc| enc.decode(bytes).map(|text| (text, *enc)))
}

/// Display lines for a results text: at most 8 rows, the first replaced by `title`.
/// Returns fewer than 8 lines for short files; the caller leaves the rest alone.
pub fn result_lines(text: &str, title: &str) -> Vec<String> {
    let mut lines: Vec<String> = text
        .lines()
        .take(NUM_ROWS)
        .map(|line| fit_line(line.trim_end()))
        .collect();
    if let Some(first) = lines.first_mut() {
        *first = fit_line(title);
    }
    lines
}

pub fn read_results(path: &Path, title: &str) -> Result<Vec<String>, BoardError> {
    let bytes = std::fs::read(path)?;
    let (text, _encoding) = decode_text(&bytes).ok_or_else(|| BoardError::Decode {
        path: path.to_path_buf(),
    })?;
    let lines = result_lines(&text, title);
    if lines.is_empty() {
        return Err(BoardError::EmptyFile { path: path.to_path_buf() });
    }
    Ok(lines)
}
