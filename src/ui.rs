// UI Module - Terminal editor for the display board (crossterm + ratatui)
use anyhow::Result;
use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction as LayoutDirection, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app::App;
use crate::engine::Direction;
use crate::grid::{NUM_COLS, NUM_ROWS};
use crate::types::{Mode, Severity};

const AMBER: Color = Color::Rgb(0xff, 0xbf, 0x00);
const CELL_BG: Color = Color::Rgb(0x1a, 0x1a, 0x1a);
const DEFECT_BG: Color = Color::Rgb(0x40, 0x00, 0x00);

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    ResultsPath,
    AnimationPath,
    SaveTemplate,
    LoadTemplate,
    WatchDir,
}

impl PromptKind {
    fn label(&self) -> &'static str {
        match self {
            PromptKind::ResultsPath => "Race results file",
            PromptKind::AnimationPath => "Animation file",
            PromptKind::SaveTemplate => "Save template as",
            PromptKind::LoadTemplate => "Load template",
            PromptKind::WatchDir => "Watch directory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub input: String,
}

/// Key handling state that lives outside the engine
#[derive(Debug, Default)]
pub struct Editor {
    prompt: Option<Prompt>,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    fn open_prompt(&mut self, kind: PromptKind, initial: String) {
        self.prompt = Some(Prompt { kind, input: initial });
    }

    /// Handle one key press, returns true when the user asked to quit
    pub fn handle_key(&mut self, app: &mut App, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
            return true;
        }

        if self.prompt.is_some() {
            self.handle_prompt_key(app, key);
            return false;
        }

        if ctrl {
            match key.code {
                KeyCode::Char('s') => {
                    let _ = app.engine.send();
                }
                KeyCode::Char('l') => {
                    let _ = app.engine.clear();
                }
                KeyCode::Char('b') => {
                    let _ = app.engine.send_brightness();
                }
                _ => {}
            }
            return false;
        }

        let (row, col) = app.engine.cursor();
        match key.code {
            KeyCode::Char(c) if app.engine.mode() == Mode::Animation && matches!(c, '+' | '-') => {
                let fps = app.engine.player().fps();
                let target = if c == '+' { fps + 1 } else { fps.saturating_sub(1) };
                let applied = app.engine.set_animation_fps(target);
                app.engine.report(format!("Animation speed: {} FPS", applied), Severity::Info);
            }
            KeyCode::Char(c) => {
                let _ = app.engine.type_char(c);
            }
            KeyCode::Left => app.engine.move_cursor(Direction::Left),
            KeyCode::Right => app.engine.move_cursor(Direction::Right),
            KeyCode::Up => app.engine.move_cursor(Direction::Up),
            KeyCode::Down => app.engine.move_cursor(Direction::Down),
            KeyCode::Backspace => {
                let _ = app.engine.backspace();
            }
            KeyCode::Home => {
                let _ = app.engine.shift_line_left(row);
            }
            KeyCode::End => {
                let _ = app.engine.shift_right_of_cursor_left(row, col);
            }
            KeyCode::Esc => {
                if app.engine.mode() == Mode::Animation {
                    app.engine.stop_animation();
                }
            }
            KeyCode::F(2) => self.open_prompt(PromptKind::ResultsPath, String::new()),
            KeyCode::F(3) => self.open_prompt(PromptKind::AnimationPath, String::new()),
            KeyCode::F(4) => self.open_prompt(PromptKind::SaveTemplate, String::new()),
            KeyCode::F(5) => match app.first_template_name() {
                Some(name) => self.open_prompt(PromptKind::LoadTemplate, name),
                None => app.load_template(""),
            },
            KeyCode::F(6) => {
                let current = app
                    .watch_dir()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default();
                self.open_prompt(PromptKind::WatchDir, current);
            }
            KeyCode::F(7) => {
                app.start_auto_scan();
            }
            KeyCode::F(8) => app.stop_auto_scan(),
            KeyCode::F(9) => {
                app.engine.set_manual_mode();
                app.engine.report("Manual mode", Severity::Info);
            }
            KeyCode::F(10) => {
                app.engine.set_race_mode();
                app.engine.report("Race results mode", Severity::Info);
            }
            _ => {}
        }
        false
    }

    fn handle_prompt_key(&mut self, app: &mut App, key: KeyEvent) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Char(c) => prompt.input.push(c),
            KeyCode::Backspace => {
                prompt.input.pop();
            }
            KeyCode::Esc => self.prompt = None,
            KeyCode::Tab if prompt.kind == PromptKind::LoadTemplate => {
                // Cycle through stored names
                let names: Vec<&str> = app.templates.names().collect();
                if let Some(pos) = names.iter().position(|n| *n == prompt.input) {
                    prompt.input = names[(pos + 1) % names.len()].to_string();
                } else if let Some(first) = names.first() {
                    prompt.input = first.to_string();
                }
            }
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take() {
                    submit_prompt(app, prompt);
                }
            }
            _ => {}
        }
    }
}

fn submit_prompt(app: &mut App, prompt: Prompt) {
    let input = prompt.input.trim();
    if input.is_empty() {
        return;
    }
    match prompt.kind {
        PromptKind::ResultsPath => {
            let _ = app.engine.load_race_results(Path::new(input));
        }
        PromptKind::AnimationPath => {
            let _ = app.engine.load_animation_file(Path::new(input));
        }
        PromptKind::SaveTemplate => app.save_template(input),
        PromptKind::LoadTemplate => app.load_template(input),
        PromptKind::WatchDir => {
            let _ = app.select_watch_dir(PathBuf::from(input));
        }
    }
}

/// Run the terminal editor until the user quits
pub fn run_editor(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, app);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    result
}

fn event_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let mut editor = Editor::new();

    // Board changes redraw immediately; header and status refresh on a slower clock
    let dirty = Arc::new(AtomicBool::new(true));
    let flag = dirty.clone();
    app.engine.set_cell_listener(move |_, _, _| flag.store(true, Ordering::Relaxed));
    let mut last_draw = Instant::now();

    loop {
        let now = Instant::now();
        app.pump(now);
        if dirty.swap(false, Ordering::Relaxed) || now.duration_since(last_draw) >= REFRESH_INTERVAL {
            terminal.draw(|f| draw(f, app, &editor))?;
            last_draw = now;
        }

        if poll(POLL_INTERVAL)? {
            if let Event::Key(key) = read()? {
                if key.kind == KeyEventKind::Press {
                    if editor.handle_key(app, key) {
                        return Ok(());
                    }
                    dirty.store(true, Ordering::Relaxed);
                }
            }
        }
    }
}

fn draw(f: &mut Frame, app: &App, editor: &Editor) {
    let chunks = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Length(3),                    // Header
            Constraint::Length(NUM_ROWS as u16 + 2), // Board
            Constraint::Length(3),                    // Status
            Constraint::Min(3),                       // Event log
            Constraint::Length(3),                    // Prompt / help
        ])
        .split(f.size());

    f.render_widget(header(app), chunks[0]);

    let board_area = Rect {
        width: chunks[1].width.min(NUM_COLS as u16 + 2),
        ..chunks[1]
    };
    let board = Paragraph::new(board_lines(app))
        .block(Block::default().borders(Borders::ALL).title("Board"));
    f.render_widget(board, board_area);

    f.render_widget(status_line(app), chunks[2]);

    let log_height = chunks[3].height.saturating_sub(2) as usize;
    let log_lines: Vec<Line> = app
        .engine
        .status()
        .history()
        .rev()
        .take(log_height)
        .map(|msg| {
            Line::from(Span::styled(
                format!("[{}] {}", msg.stamp, msg.text),
                Style::default().fg(severity_color(msg.severity)),
            ))
        })
        .collect();
    let log = Paragraph::new(log_lines).block(Block::default().borders(Borders::ALL).title("Events"));
    f.render_widget(log, chunks[3]);

    let footer_text = match editor.prompt() {
        Some(prompt) => format!("{}: {}_   (Enter confirm, Esc cancel)", prompt.kind.label(), prompt.input),
        None => "Ctrl+S send | Ctrl+L clear | Ctrl+B brightness | F2 results | F3 animation | F4/F5 save/load template | F6 dir | F7/F8 scan on/off | F9 manual | F10 race | Esc stop | Ctrl+Q quit".to_string(),
    };
    let footer = Paragraph::new(footer_text).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, chunks[4]);
}

fn header(app: &App) -> Paragraph<'static> {
    let port = app.engine.transport_name().unwrap_or_else(|| "test mode".to_string());
    let scan = match (app.is_scanning(), app.watch_dir()) {
        (true, Some(dir)) => dir.display().to_string(),
        _ => "off".to_string(),
    };
    let mut text = format!("Mode: {} | Port: {} | Auto-scan: {}", app.engine.mode(), port, scan);
    if let Some(summary) = player_summary(app) {
        text.push_str(" | ");
        text.push_str(&summary);
    }
    Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Regatta Board"))
}

// Frame currently on the board, not the one queued next
fn player_summary(app: &App) -> Option<String> {
    let player = app.engine.player();
    if !player.is_running() {
        return None;
    }
    Some(format!(
        "Frame {}/{} | {} FPS ({})",
        player.shown().unwrap_or(0),
        player.frame_count(),
        player.fps(),
        player.mode()
    ))
}

fn status_line(app: &App) -> Paragraph<'static> {
    let line = match app.engine.status().current(Instant::now()) {
        Some(msg) => Line::from(Span::styled(
            msg.text.clone(),
            Style::default().fg(severity_color(msg.severity)),
        )),
        None => Line::from("Ready"),
    };
    Paragraph::new(line).block(Block::default().borders(Borders::ALL))
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Reset,
        Severity::Warn => Color::Yellow,
        Severity::Error => Color::Red,
    }
}

fn board_lines(app: &App) -> Vec<Line<'static>> {
    let cursor = app.engine.cursor();
    let grid = app.engine.grid();
    (0..NUM_ROWS)
        .map(|row| {
            let spans: Vec<Span> = (0..NUM_COLS)
                .filter_map(|col| grid.cell(row, col).map(|cell| (col, cell)))
                .map(|(col, cell)| {
                    let style = if (row, col) == cursor {
                        Style::default().fg(Color::Black).bg(AMBER).add_modifier(Modifier::BOLD)
                    } else if cell.defective {
                        Style::default().fg(AMBER).bg(DEFECT_BG)
                    } else {
                        Style::default().fg(AMBER).bg(CELL_BG)
                    };
                    Span::styled(cell.ch.to_string(), style)
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;
    use crate::transport::testing::RecordingTransport;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn test_app(dir: &Path) -> (App, RecordingTransport) {
        let mut config = BoardConfig::default();
        config.templates_file = dir.join("templates.json").to_string_lossy().to_string();
        let recorder = RecordingTransport::default();
        let app = App::new(config, Some(Box::new(recorder.clone()))).unwrap();
        (app, recorder)
    }

    fn type_text(editor: &mut Editor, app: &mut App, text: &str) {
        for c in text.chars() {
            assert!(!editor.handle_key(app, press(KeyCode::Char(c))));
        }
    }

    #[test]
    fn test_typing_and_send() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, recorder) = test_app(dir.path());
        let mut editor = Editor::new();

        type_text(&mut editor, &mut app, "Lauf 2");
        assert_eq!(&app.engine.grid().row_text(0).unwrap()[..6], "Lauf 2");
        assert_eq!(app.engine.cursor(), (0, 6));

        editor.handle_key(&mut app, press(KeyCode::Backspace));
        assert_eq!(app.engine.cursor(), (0, 5));

        editor.handle_key(&mut app, ctrl('s'));
        assert_eq!(recorder.messages().len(), 1);

        editor.handle_key(&mut app, ctrl('b'));
        assert_eq!(recorder.messages().last().unwrap(), &vec![0x01, 0xFF, 0x03]);
    }

    #[test]
    fn test_quit_keys() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = test_app(dir.path());
        let mut editor = Editor::new();
        assert!(editor.handle_key(&mut app, ctrl('q')));
        assert!(editor.handle_key(&mut app, ctrl('c')));
        assert!(!editor.handle_key(&mut app, press(KeyCode::Char('q'))));
    }

    #[test]
    fn test_home_and_end_shift() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = test_app(dir.path());
        let mut editor = Editor::new();
        type_text(&mut editor, &mut app, "abcd");

        editor.handle_key(&mut app, press(KeyCode::Home));
        assert_eq!(&app.engine.grid().row_text(0).unwrap()[..4], "bcd ");

        app.engine.set_cursor(0, 1);
        editor.handle_key(&mut app, press(KeyCode::End));
        assert_eq!(&app.engine.grid().row_text(0).unwrap()[..4], "bd  ");
    }

    #[test]
    fn test_template_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = test_app(dir.path());
        let mut editor = Editor::new();
        type_text(&mut editor, &mut app, "Start");

        editor.handle_key(&mut app, press(KeyCode::F(4)));
        assert_eq!(editor.prompt().unwrap().kind, PromptKind::SaveTemplate);
        type_text(&mut editor, &mut app, "vorlauf");
        editor.handle_key(&mut app, press(KeyCode::Enter));
        assert!(editor.prompt().is_none());
        assert_eq!(app.first_template_name(), Some("vorlauf".to_string()));

        editor.handle_key(&mut app, ctrl('l'));
        assert_eq!(app.engine.grid().get(0, 0).unwrap(), ' ');

        editor.handle_key(&mut app, press(KeyCode::F(5)));
        assert_eq!(editor.prompt().unwrap().input, "vorlauf");
        editor.handle_key(&mut app, press(KeyCode::Enter));
        assert_eq!(app.engine.grid().get(0, 0).unwrap(), 'S');
    }

    #[test]
    fn test_prompt_escape_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = test_app(dir.path());
        let mut editor = Editor::new();
        editor.handle_key(&mut app, press(KeyCode::F(2)));
        type_text(&mut editor, &mut app, "/nonexistent.txt");
        editor.handle_key(&mut app, press(KeyCode::Esc));
        assert!(editor.prompt().is_none());
        assert_eq!(app.engine.mode(), Mode::Manual);
        assert_eq!(app.engine.grid().get(0, 0).unwrap(), ' ');
    }

    #[test]
    fn test_animation_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.txt");
        let mut script = String::from("#FPS:3\n");
        for frame in 0..2 {
            script.push_str("FRAME\n");
            for row in 0..NUM_ROWS {
                script.push_str(&format!("frame {} row {}\n", frame, row));
            }
            script.push_str("==\n");
        }
        std::fs::write(&path, script).unwrap();

        let (mut app, _) = test_app(dir.path());
        let mut editor = Editor::new();
        editor.handle_key(&mut app, press(KeyCode::F(3)));
        type_text(&mut editor, &mut app, path.to_str().unwrap());
        editor.handle_key(&mut app, press(KeyCode::Enter));
        assert_eq!(app.engine.mode(), Mode::Animation);

        assert_eq!(player_summary(&app).unwrap(), "Frame 1/2 | 3 FPS (LOOP)");

        editor.handle_key(&mut app, press(KeyCode::Char('+')));
        assert_eq!(app.engine.player().fps(), 4);
        editor.handle_key(&mut app, press(KeyCode::Char('-')));
        editor.handle_key(&mut app, press(KeyCode::Char('-')));
        assert_eq!(app.engine.player().fps(), 2);

        editor.handle_key(&mut app, press(KeyCode::Esc));
        assert_eq!(app.engine.mode(), Mode::Manual);
    }

    #[test]
    fn test_mode_keys() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _) = test_app(dir.path());
        let mut editor = Editor::new();
        editor.handle_key(&mut app, press(KeyCode::F(10)));
        assert_eq!(app.engine.mode(), Mode::RaceResults);
        editor.handle_key(&mut app, press(KeyCode::Char('x')));
        assert_eq!(app.engine.grid().get(0, 0).unwrap(), ' ');
        editor.handle_key(&mut app, press(KeyCode::F(9)));
        assert_eq!(app.engine.mode(), Mode::Manual);
    }
}
