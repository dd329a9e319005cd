// Animation Module - Frame script parsing and timed playback
//
// Script format (line oriented, directives case-insensitive):
//   #MODE:LOOP | #MODE:ONCE   playback policy (default LOOP)
//   #FPS:<n>                  frames per second (default 2, minimum 1)
//   FRAME                     starts a new frame, dropping any partial one
//   <8 content lines>         rows of the frame, padded/truncated to 30 columns
//   ==                        closes the frame (kept only with exactly 8 rows)
use std::time::{Duration, Instant};

use crate::grid::{fit_line, NUM_ROWS};

pub const DEFAULT_FPS: u32 = 2;
pub const DEFAULT_MODE: &str = "LOOP";
pub const ONCE_MODE: &str = "ONCE";

/// One full display image: exactly 8 lines of exactly 30 characters
pub type Frame = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationScript {
    pub frames: Vec<Frame>,
    // Kept verbatim (uppercased); anything other than ONCE loops
    pub mode: String,
    pub fps: u32,
}

impl Default for AnimationScript {
    fn default() -> Self {
        AnimationScript {
            frames: Vec::new(),
            mode: DEFAULT_MODE.to_string(),
            fps: DEFAULT_FPS,
        }
    }
}

// Case-insensitive prefix match returning the remainder
fn directive<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

// Only a line that is exactly "FRAME" starts a frame; labelled variants are content
fn is_frame_marker(line: &str) -> bool {
    line.eq_ignore_ascii_case("FRAME")
}

fn parse_fps(value: &str) -> u32 {
    match value.trim().parse::<i64>() {
        Ok(fps) => u32::try_from(fps.max(1)).unwrap_or(u32::MAX),
        Err(_) => DEFAULT_FPS,
    }
}

impl AnimationScript {
    /// Parse a script. Never fails; malformed frames are dropped and an empty
    /// frame list means there is nothing to play.
    pub fn parse(text: &str) -> Self {
        let mut script = AnimationScript::default();
        let mut current: Frame = Vec::with_capacity(NUM_ROWS);

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(mode) = directive(trimmed, "#MODE:") {
                script.mode = mode.trim().to_uppercase();
            } else if let Some(fps) = directive(trimmed, "#FPS:") {
                script.fps = parse_fps(fps);
            } else if is_frame_marker(trimmed) {
                current.clear();
            } else if trimmed == "==" {
                if current.len() == NUM_ROWS {
                    script.frames.push(std::mem::take(&mut current));
                }
                current.clear();
            } else if current.len() < NUM_ROWS {
                current.push(fit_line(line));
            }
        }

        // Trailing frame without a closing "=="
        if current.len() == NUM_ROWS {
            script.frames.push(current);
        }

        script
    }

    pub fn plays_once(&self) -> bool {
        self.mode == ONCE_MODE
    }
}

/// Milliseconds between frames, rounded
pub fn frame_delay(fps: u32) -> Duration {
    let ms = (1000.0 / f64::from(fps.max(1))).round();
    Duration::from_millis(ms as u64)
}

// Result of one player step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStep {
    pub frame: Frame,
    pub number: usize, // 1-based, for status display
    pub total: usize,
    pub finished: bool, // ONCE script just showed its last frame
}

// Timer-driven playback cursor. The owner calls `step` whenever `is_due`
// reports true; each step re-arms the timer with the delay current at that time.
#[derive(Debug, Default)]
pub struct AnimationPlayer {
    script: AnimationScript,
    running: bool,
    index: usize,
    shown: Option<usize>,
    next_due: Option<Instant>,
}

impl AnimationPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current script and arm the first step for `now`
    pub fn start(&mut self, script: AnimationScript, now: Instant) {
        self.running = !script.frames.is_empty();
        self.script = script;
        self.index = 0;
        self.shown = None;
        self.next_due = if self.running { Some(now) } else { None };
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.running && self.next_due.map_or(false, |due| now >= due)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// 1-based number of the frame currently on the board
    pub fn shown(&self) -> Option<usize> {
        self.shown
    }

    pub fn frame_count(&self) -> usize {
        self.script.frames.len()
    }

    pub fn mode(&self) -> &str {
        &self.script.mode
    }

    pub fn fps(&self) -> u32 {
        self.script.fps
    }

    pub fn delay(&self) -> Duration {
        frame_delay(self.script.fps)
    }

    /// Takes effect at the next re-arm; an already pending step keeps its time
    pub fn set_fps(&mut self, fps: u32) {
        self.script.fps = fps.max(1);
    }

    /// Emit the frame at the cursor and advance. No-op when stopped or empty.
    pub fn step(&mut self, now: Instant) -> Option<PlayerStep> {
        if !self.running {
            return None;
        }
        let total = self.script.frames.len();
        let frame = self.script.frames.get(self.index)?.clone();
        let number = self.index + 1;
        self.shown = Some(number);

        self.index += 1;
        let mut finished = false;
        if self.index >= total {
            if self.script.plays_once() {
                self.running = false;
                finished = true;
            } else {
                self.index = 0;
            }
        }

        self.next_due = if self.running { Some(now + self.delay()) } else { None };

        Some(PlayerStep { frame, number, total, finished })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::NUM_COLS;

    fn frame_text(fill: char) -> String {
        let mut text = String::from("FRAME\n");
        for _ in 0..NUM_ROWS {
            text.push_str(&fill.to_string().repeat(5));
            text.push('\n');
        }
        text.push_str("==\n");
        text
    }

    #[test]
    fn test_parse_single_frame_with_fps() {
        let text = format!("#FPS:5\nFRAME\n{}{}==\n", "x".repeat(30), "\n".repeat(8));
        let script = AnimationScript::parse(&text);
        assert_eq!(script.fps, 5);
        assert_eq!(script.mode, "LOOP");
        assert_eq!(script.frames.len(), 1);
        let frame = &script.frames[0];
        assert_eq!(frame.len(), NUM_ROWS);
        assert!(frame.iter().all(|l| l.chars().count() == NUM_COLS));
        assert_eq!(frame[0], "x".repeat(30));
        assert_eq!(frame[1], " ".repeat(30));
    }

    #[test]
    fn test_defaults() {
        let script = AnimationScript::parse("");
        assert!(script.frames.is_empty());
        assert_eq!(script.fps, DEFAULT_FPS);
        assert_eq!(script.mode, DEFAULT_MODE);
    }

    #[test]
    fn test_directives_are_case_insensitive() {
        let script = AnimationScript::parse("#mode: once\n#fps: 4\n");
        assert_eq!(script.mode, "ONCE");
        assert!(script.plays_once());
        assert_eq!(script.fps, 4);
    }

    #[test]
    fn test_unknown_mode_is_kept_and_loops() {
        let script = AnimationScript::parse("#MODE:bounce\n");
        assert_eq!(script.mode, "BOUNCE");
        assert!(!script.plays_once());
    }

    #[test]
    fn test_fps_fallbacks() {
        assert_eq!(AnimationScript::parse("#FPS:0").fps, 1);
        assert_eq!(AnimationScript::parse("#FPS:-7").fps, 1);
        assert_eq!(AnimationScript::parse("#FPS:fast").fps, 2);
        assert_eq!(AnimationScript::parse("#FPS:").fps, 2);
        assert_eq!(AnimationScript::parse("#FPS: 12 ").fps, 12);
    }

    #[test]
    fn test_short_frame_is_dropped_by_marker_and_close() {
        let text = "FRAME\na\nb\nFRAME\nc\n==\n";
        assert!(AnimationScript::parse(text).frames.is_empty());
    }

    #[test]
    fn test_trailing_frame_without_close() {
        let mut text = String::from("FRAME\n");
        for i in 0..NUM_ROWS {
            text.push_str(&format!("line {}\n", i));
        }
        let script = AnimationScript::parse(&text);
        assert_eq!(script.frames.len(), 1);
        assert_eq!(script.frames[0][7], fit_line("line 7"));

        let script = AnimationScript::parse("FRAME\nonly\nthree\nlines\n");
        assert!(script.frames.is_empty());
    }

    #[test]
    fn test_excess_lines_are_ignored() {
        let mut text = String::from("FRAME\n");
        for i in 0..12 {
            text.push_str(&format!("row {}\n", i));
        }
        text.push_str("==\n");
        let script = AnimationScript::parse(&text);
        assert_eq!(script.frames.len(), 1);
        assert_eq!(script.frames[0][7], fit_line("row 7"));
    }

    #[test]
    fn test_content_keeps_leading_spaces_and_truncates() {
        let mut text = String::from("FRAME\n   indented\n");
        text.push_str(&"y".repeat(45));
        text.push('\n');
        for _ in 0..6 {
            text.push('\n');
        }
        text.push_str("==");
        let script = AnimationScript::parse(&text);
        assert_eq!(script.frames[0][0], fit_line("   indented"));
        assert_eq!(script.frames[0][1], "y".repeat(30));
    }

    #[test]
    fn test_labelled_marker_is_frame_content() {
        let mut text = String::from("frame\nFRAME 1 - Start\n");
        for i in 0..NUM_ROWS {
            text.push_str(&format!("row {}\n", i));
        }
        text.push_str("==\n");
        let script = AnimationScript::parse(&text);
        assert_eq!(script.frames.len(), 1);
        assert_eq!(script.frames[0][0], fit_line("FRAME 1 - Start"));
        assert_eq!(script.frames[0][7], fit_line("row 6"));
    }

    #[test]
    fn test_frame_delay_rounds() {
        assert_eq!(frame_delay(2), Duration::from_millis(500));
        assert_eq!(frame_delay(3), Duration::from_millis(333));
        assert_eq!(frame_delay(6), Duration::from_millis(167));
        assert_eq!(frame_delay(0), Duration::from_millis(1000));
    }

    fn script(frames: usize, mode: &str) -> AnimationScript {
        let text: String = (0..frames).map(|i| frame_text(char::from(b'a' + i as u8))).collect();
        let mut script = AnimationScript::parse(&format!("#MODE:{}\n{}", mode, text));
        script.fps = 2;
        script
    }

    #[test]
    fn test_loop_playback_wraps() {
        let now = Instant::now();
        let mut player = AnimationPlayer::new();
        player.start(script(2, "LOOP"), now);
        assert!(player.is_due(now));
        assert_eq!(player.shown(), None);

        let first = player.step(now).unwrap();
        assert_eq!((first.number, first.total, first.finished), (1, 2, false));
        assert!(!player.is_due(now));
        assert_eq!(player.next_due(), Some(now + Duration::from_millis(500)));

        let second = player.step(now).unwrap();
        assert_eq!(second.number, 2);
        assert!(!second.finished);
        // Cursor already wrapped, the last frame is still the one on display
        assert_eq!(player.shown(), Some(2));
        assert!(player.is_running());
        assert!(player.step(now).unwrap().frame[0].starts_with("aaaaa"));
    }

    #[test]
    fn test_once_playback_stops() {
        let now = Instant::now();
        let mut player = AnimationPlayer::new();
        player.start(script(2, "ONCE"), now);
        player.step(now).unwrap();
        let last = player.step(now).unwrap();
        assert!(last.finished);
        assert!(!player.is_running());
        assert_eq!(player.next_due(), None);
        assert!(player.step(now).is_none());
    }

    #[test]
    fn test_stopped_step_is_noop() {
        let now = Instant::now();
        let mut player = AnimationPlayer::new();
        player.start(script(3, "LOOP"), now);
        player.step(now);
        player.stop();
        assert!(player.step(now).is_none());
        assert_eq!(player.shown(), Some(1));
    }

    #[test]
    fn test_fps_change_applies_to_next_rearm() {
        let now = Instant::now();
        let mut player = AnimationPlayer::new();
        player.start(script(3, "LOOP"), now);
        player.step(now);
        let pending = player.next_due();
        player.set_fps(10);
        assert_eq!(player.next_due(), pending);
        let later = now + Duration::from_millis(500);
        player.step(later);
        assert_eq!(player.next_due(), Some(later + Duration::from_millis(100)));
    }

    #[test]
    fn test_empty_script_never_runs() {
        let mut player = AnimationPlayer::new();
        player.start(AnimationScript::default(), Instant::now());
        assert!(!player.is_running());
        assert!(player.step(Instant::now()).is_none());
    }
}
