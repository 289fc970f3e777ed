/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// How it works:
///   1. Build the next frame into `front` buffer (array of Cell)
///   2. Compare each cell with `back` buffer (previous frame)
///   3. Only emit terminal commands for cells that changed
///   4. All commands are batched with `queue!`, flushed once at the end
///   5. Swap front/back
///
/// This eliminates flicker caused by full-screen redraws.
///
/// Layout: status header on row 0, the map from MAP_ROW down, then the
/// command line and the last command result below the map.

use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{self, MoveTo},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use crate::domain::cell::CellKind;
use crate::domain::options::GameOption;
use crate::sim::game::Game;

// ── Cell: the unit of the back-buffer ──

#[derive(Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

impl Cell {
    const BLANK: Cell = Cell { ch: ' ', fg: Color::White, bg: Color::Reset };

    /// Sentinel cell used to invalidate the back buffer.
    /// Different from any real cell, so every position will be diff'd.
    const INVALID: Cell = Cell { ch: '\0', fg: Color::Magenta, bg: Color::Magenta };

    fn new(ch: char, fg: Color) -> Self {
        Cell { ch, fg, bg: Color::Reset }
    }
}

// ── FrameBuffer: a 2D grid of Cells ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer { width: w, height: h, cells: vec![Cell::BLANK; w * h] }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![Cell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            Cell::BLANK
        }
    }

    fn put_str(&mut self, x: usize, y: usize, s: &str, fg: Color) {
        let mut cx = x;
        for ch in s.chars() {
            if cx >= self.width {
                break;
            }
            self.set(cx, y, Cell::new(ch, fg));
            cx += 1;
        }
    }
}

// ── Glyph and color tables ──

const HEADER_ROW: usize = 0;
const MAP_ROW: usize = 2;

fn static_visual(kind: &CellKind) -> Cell {
    match kind {
        CellKind::Wall => Cell::new('#', Color::DarkGrey),
        CellKind::Cage => Cell::new('*', Color::DarkGreen),
        CellKind::Plate { .. } => Cell::new('_', Color::DarkCyan),
        CellKind::Key { .. } => Cell::new('+', Color::Yellow),
        CellKind::Door { .. } => Cell::new('|', Color::DarkYellow),
        CellKind::Bomb => Cell::new('=', Color::Red),
        CellKind::Portal { .. } => Cell::new('0', Color::Cyan),
        // Dynamic kinds never appear in the static layer
        CellKind::Crate | CellKind::Player(_) => Cell::BLANK,
    }
}

/// Visual for a dynamic cell standing on `below`. A crate turns green once
/// it rests on a cage, so progress is readable at a glance.
fn dynamic_visual(kind: &CellKind, below: Option<&CellKind>) -> Cell {
    match kind {
        CellKind::Crate => {
            if matches!(below, Some(CellKind::Cage)) {
                Cell::new('%', Color::Green)
            } else {
                Cell::new('%', Color::White)
            }
        }
        CellKind::Player(_) => Cell::new('@', Color::Yellow),
        _ => Cell::BLANK,
    }
}

// ── Renderer ──

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            Clear(ClearType::All)
        )?;

        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.term_w = tw as usize;
        self.term_h = th as usize;
        self.front.resize(self.term_w, self.term_h);
        self.back.resize(self.term_w, self.term_h);
        // Force full repaint on first frame: back ≠ front for every cell.
        self.back.cells.fill(Cell::INVALID);

        Ok(())
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        execute!(
            self.writer,
            ResetColor,
            cursor::Show,
            terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()
    }

    pub fn render(&mut self, game: &Game, command: &str, result: &str) -> io::Result<()> {
        // Detect terminal resize
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.term_w = tw as usize;
            self.term_h = th as usize;
            self.front.resize(self.term_w, self.term_h);
            self.back.resize(self.term_w, self.term_h);
            // Force full repaint after resize.
            self.back.cells.fill(Cell::INVALID);
            queue!(self.writer, Clear(ClearType::All))?;
        }

        self.front.clear();
        self.compose_header(game);
        self.compose_map(game);
        self.compose_footer(game, command, result);
        self.flush_diff()?;

        // Swap: current front becomes next back
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    // ── Compose: build front buffer content ──

    fn compose_header(&mut self, game: &Game) {
        if game.map.dynamics.player().is_none() {
            self.front.put_str(1, HEADER_ROW, "crateshift", Color::Yellow);
            return;
        }
        let player = game.map.player();
        let moves = if game.options.contains(&GameOption::MoveLimit) {
            format!("Moves:{}/{}", player.moves, player.max_moves)
        } else {
            format!("Moves:{}", player.moves)
        };
        let keys = if player.keys.is_empty() {
            "Keys:-".to_string()
        } else {
            let ids: Vec<String> = player.keys.iter().map(|k| k.to_string()).collect();
            format!("Keys:{}", ids.join(","))
        };
        let status = if game.playable() { "RUN!" } else { "over" };
        let header = format!(
            "crateshift  {}  Force:{}  {}  Bombs:{}  {}",
            moves, player.force, keys, player.bombs, status
        );
        let status_fg = if game.playable() { Color::Green } else { Color::Red };
        self.front.put_str(1, HEADER_ROW, &header, Color::White);
        // Recolor the trailing status word
        let status_x = 1 + header.len() - status.len();
        self.front.put_str(status_x, HEADER_ROW, status, status_fg);
    }

    fn compose_map(&mut self, game: &Game) {
        let map = &game.map;
        for cell in map.statics.cells() {
            let row = MAP_ROW + cell.pos.y as usize;
            self.front.set(cell.pos.x as usize, row, static_visual(&cell.kind));
        }
        // Dynamics draw over terrain
        for cell in map.dynamics.cells() {
            let below = map.statics.cell_at(cell.pos).map(|c| &c.kind);
            let row = MAP_ROW + cell.pos.y as usize;
            self.front.set(cell.pos.x as usize, row, dynamic_visual(&cell.kind, below));
        }
    }

    fn compose_footer(&mut self, game: &Game, command: &str, result: &str) {
        let prompt_row = MAP_ROW + game.map.height().max(0) as usize + 1;
        let prompt = format!("> {}_", command);
        self.front.put_str(1, prompt_row, &prompt, Color::White);
        if !result.is_empty() {
            self.front.put_str(1, prompt_row + 1, result, Color::Cyan);
        }
    }

    // ── Diff flush: only write changed cells ──

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = Color::Reset;
        let mut need_move = true;
        let mut last_x: usize = 0;
        let mut last_y: usize = 0;

        queue!(
            self.writer,
            SetForegroundColor(Color::White),
            SetBackgroundColor(Color::Reset)
        )?;

        for y in 0..self.front.height {
            for x in 0..self.front.width {
                let cell = self.front.get(x, y);
                if cell == self.back.get(x, y) {
                    need_move = true;
                    continue;
                }

                if need_move || x != last_x + 1 || y != last_y {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                    need_move = false;
                }
                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }
                let mut buf = [0u8; 4];
                queue!(self.writer, Print(&*cell.ch.encode_utf8(&mut buf)))?;
                last_x = x;
                last_y = y;
            }
        }

        self.writer.flush()
    }
}
