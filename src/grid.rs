// Grid Module - The 8x30 character matrix shown on the board
use crate::charset;
use crate::types::BoardError;

pub const NUM_ROWS: usize = 8;
pub const NUM_COLS: usize = 30;
pub const NUM_CELLS: usize = NUM_ROWS * NUM_COLS;

/// First row is defective except its last 4 columns, last row except its last 5.
/// Only affects styling; defective cells are stored and sent like any other.
pub fn is_defective(row: usize, col: usize) -> bool {
    (row == 0 && col < NUM_COLS - 4) || (row == NUM_ROWS - 1 && col < NUM_COLS - 5)
}

/// Pad with spaces or truncate to exactly `NUM_COLS` characters
pub fn fit_line(line: &str) -> String {
    let mut fitted: String = line.chars().take(NUM_COLS).collect();
    let len = fitted.chars().count();
    fitted.extend(std::iter::repeat(' ').take(NUM_COLS - len));
    fitted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub defective: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cells: [[Cell; NUM_COLS]; NUM_ROWS],
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl Grid {
    pub fn new() -> Self {
        let mut cells = [[Cell { ch: ' ', defective: false }; NUM_COLS]; NUM_ROWS];
        for (row, cols) in cells.iter_mut().enumerate() {
            for (col, cell) in cols.iter_mut().enumerate() {
                cell.defective = is_defective(row, col);
            }
        }
        Grid { cells }
    }

    fn check(row: usize, col: usize) -> Result<(), BoardError> {
        if row < NUM_ROWS && col < NUM_COLS {
            Ok(())
        } else {
            Err(BoardError::InvalidPosition { row, col })
        }
    }

    /// Store the sanitized character, returning what was actually stored
    pub fn set(&mut self, row: usize, col: usize, ch: char) -> Result<char, BoardError> {
        Self::check(row, col)?;
        let stored = charset::sanitize(ch);
        self.cells[row][col].ch = stored;
        Ok(stored)
    }

    pub fn get(&self, row: usize, col: usize) -> Result<char, BoardError> {
        Self::check(row, col)?;
        Ok(self.cells[row][col].ch)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|cols| cols.get(col))
    }

    pub fn clear(&mut self) {
        self.fill(' ');
    }

    pub fn fill(&mut self, ch: char) {
        let stored = charset::sanitize(ch);
        for cell in self.cells.iter_mut().flatten() {
            cell.ch = stored;
        }
    }

    /// Row-major iterator over every character
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.cells.iter().flatten().map(|cell| cell.ch)
    }

    pub fn row_text(&self, row: usize) -> Option<String> {
        self.cells.get(row).map(|cols| cols.iter().map(|cell| cell.ch).collect())
    }

    /// Export all rows as exactly 30-character lines
    pub fn snapshot(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|cols| cols.iter().map(|cell| cell.ch).collect())
            .collect()
    }

    /// Import up to 8 lines, each padded/truncated to 30 columns.
    /// Rows beyond the input keep their current content.
    pub fn restore<S: AsRef<str>>(&mut self, lines: &[S]) {
        for (row, line) in lines.iter().take(NUM_ROWS).enumerate() {
            for (col, ch) in fit_line(line.as_ref()).chars().enumerate() {
                self.cells[row][col].ch = charset::sanitize(ch);
            }
        }
    }

    /// Move every character in `row` from `from_col` onward one column left,
    /// blanking the last column
    pub fn shift_left_from(&mut self, row: usize, from_col: usize) -> Result<(), BoardError> {
        Self::check(row, from_col)?;
        let cols = &mut self.cells[row];
        for col in from_col..NUM_COLS - 1 {
            cols[col].ch = cols[col + 1].ch;
        }
        cols[NUM_COLS - 1].ch = ' ';
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_mask() {
        for col in 0..NUM_COLS {
            assert_eq!(is_defective(0, col), col <= 25, "row 0 col {}", col);
            assert_eq!(is_defective(7, col), col <= 24, "row 7 col {}", col);
            for row in 1..7 {
                assert!(!is_defective(row, col));
            }
        }
    }

    #[test]
    fn test_new_grid_is_blank_with_mask() {
        let grid = Grid::new();
        assert!(grid.chars().all(|c| c == ' '));
        assert_eq!(grid.chars().count(), NUM_CELLS);
        assert_eq!(grid.cell(0, 0).map(|c| c.defective), Some(true));
        assert_eq!(grid.cell(0, 29).map(|c| c.defective), Some(false));
        assert!(grid.cell(8, 0).is_none());
    }

    #[test]
    fn test_set_sanitizes() {
        let mut grid = Grid::new();
        assert_eq!(grid.set(2, 3, 'A').unwrap(), 'A');
        assert_eq!(grid.set(2, 4, '@').unwrap(), '?');
        assert_eq!(grid.get(2, 3).unwrap(), 'A');
        assert_eq!(grid.get(2, 4).unwrap(), '?');
    }

    #[test]
    fn test_out_of_range() {
        let mut grid = Grid::new();
        assert!(matches!(grid.set(8, 0, 'x'), Err(BoardError::InvalidPosition { row: 8, col: 0 })));
        assert!(grid.get(0, 30).is_err());
    }

    #[test]
    fn test_fit_line() {
        assert_eq!(fit_line("abc"), format!("abc{}", " ".repeat(27)));
        assert_eq!(fit_line(&"x".repeat(40)), "x".repeat(30));
        assert_eq!(fit_line("äöü").chars().count(), 30);
    }

    #[test]
    fn test_restore_keeps_trailing_rows() {
        let mut grid = Grid::new();
        grid.fill('1');
        grid.restore(&["Hello", "World"]);
        let snap = grid.snapshot();
        assert_eq!(snap[0], fit_line("Hello"));
        assert_eq!(snap[1], fit_line("World"));
        assert_eq!(snap[2], "1".repeat(30));
        assert_eq!(snap[7], "1".repeat(30));
    }

    #[test]
    fn test_restore_ignores_extra_rows_and_sanitizes() {
        let mut grid = Grid::new();
        let lines: Vec<String> = (0..10).map(|i| format!("row {}_", i)).collect();
        grid.restore(&lines);
        assert_eq!(grid.row_text(7).unwrap(), fit_line("row 7?"));
        assert_eq!(grid.snapshot().len(), NUM_ROWS);
    }

    #[test]
    fn test_snapshot_restore_identity() {
        let mut grid = Grid::new();
        grid.restore(&["Platz 1  Berlin", "Platz 2  Hamburg", "", "Zeit: 6:12,4"]);
        let snap = grid.snapshot();
        let mut other = Grid::new();
        other.restore(&snap);
        assert_eq!(other, grid);
    }

    #[test]
    fn test_shift_left_from() {
        let mut grid = Grid::new();
        grid.restore(&["ABCDEFGHIJKLMNOPQRSTUVWXYZ0123"]);
        grid.shift_left_from(0, 0).unwrap();
        assert_eq!(grid.row_text(0).unwrap(), "BCDEFGHIJKLMNOPQRSTUVWXYZ0123 ");
        grid.shift_left_from(0, 3).unwrap();
        assert_eq!(grid.row_text(0).unwrap(), "BCDFGHIJKLMNOPQRSTUVWXYZ0123  ");
    }
}
