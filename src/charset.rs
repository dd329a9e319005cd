// Charset Module - Characters the display board can show

/// Substitute shown for any character the board cannot render
pub const REPLACEMENT_CHAR: char = '?';

// Punctuation the board's font provides (space included)
const PUNCTUATION: &str = " .,!?|-:+*/\\()=#%<>";

// German umlauts, upper and lower case
const UMLAUTS: &str = "äöüÄÖÜ";

/// Returns true if the board can render `ch`
pub fn is_accepted(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || UMLAUTS.contains(ch) || PUNCTUATION.contains(ch)
}

/// Returns `ch` unchanged if accepted, otherwise the replacement character
pub fn sanitize(ch: char) -> char {
    if is_accepted(ch) {
        ch
    } else {
        REPLACEMENT_CHAR
    }
}
