// Protocol Module - Wire format of the display board's serial link
//
// Frame message:      0x01 0xFF <240 bytes, row-major, Latin-1>
// Brightness message: 0x01 0xFF 0x03
use crate::grid::{Grid, NUM_CELLS};
use std::time::Duration;

pub const BAUD_RATE: u32 = 38400;
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

pub const HEADER: [u8; 2] = [0x01, 0xFF];
pub const FRAME_LEN: usize = HEADER.len() + NUM_CELLS;

// Only one brightness level is addressable
const BRIGHTNESS_LEVEL: u8 = 0x03;

// Byte written for characters outside Latin-1
const PLACEHOLDER_BYTE: u8 = b'?';

/// Single-byte Latin-1 encoding; never fails
pub fn encode_char(ch: char) -> u8 {
    u8::try_from(u32::from(ch)).unwrap_or(PLACEHOLDER_BYTE)
}

pub fn encode_frame(grid: &Grid) -> [u8; FRAME_LEN] {
    let mut msg = [0u8; FRAME_LEN];
    msg[..HEADER.len()].copy_from_slice(&HEADER);
    for (slot, ch) in msg[HEADER.len()..].iter_mut().zip(grid.chars()) {
        *slot = encode_char(ch);
    }
    msg
}

pub fn encode_brightness() -> [u8; 3] {
    [HEADER[0], HEADER[1], BRIGHTNESS_LEVEL]
}
