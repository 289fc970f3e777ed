/// One layer of the map: a position-sorted sparse collection of cells.
///
/// Cells are kept sorted by (y, x) with no duplicate positions, so lookup
/// by position is a binary search. The player's index is cached and
/// refreshed whenever the collection changes, like any other derived data.
///
/// Mutation within a tick is two-phase: rule evaluation stages actions on
/// cells, `resolve_actions` commits them all in one pass. Evaluation
/// therefore always sees the consistent "before" state of the tick.

use crate::domain::cell::{Cell, PlayerState, Transform};
use crate::domain::point::Point;

#[derive(Clone, Debug)]
pub struct Layer {
    cells: Vec<Cell>,
    width: i32,
    height: i32,
    player_idx: Option<usize>,
}

impl Layer {
    pub fn new(width: i32, height: i32) -> Self {
        Layer {
            cells: Vec::new(),
            width,
            height,
            player_idx: None,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, pos: Point) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Insert a cell, keeping the collection sorted.
    /// Rejects a cell whose position is already occupied.
    pub fn add_cell(&mut self, cell: Cell) -> bool {
        match self.search(cell.pos) {
            Ok(_) => false,
            Err(at) => {
                self.cells.insert(at, cell);
                self.refresh_player_idx();
                true
            }
        }
    }

    pub fn index_of(&self, pos: Point) -> Option<usize> {
        self.search(pos).ok()
    }

    pub fn cell_at(&self, pos: Point) -> Option<&Cell> {
        self.index_of(pos).map(|i| &self.cells[i])
    }

    pub fn cell(&self, idx: usize) -> &Cell {
        &self.cells[idx]
    }

    pub fn cell_mut(&mut self, idx: usize) -> &mut Cell {
        &mut self.cells[idx]
    }

    pub fn player_index(&self) -> Option<usize> {
        self.player_idx
    }

    pub fn player(&self) -> Option<&PlayerState> {
        self.player_idx.and_then(|i| self.cells[i].player())
    }

    pub fn player_mut(&mut self) -> Option<&mut PlayerState> {
        match self.player_idx {
            Some(i) => self.cells[i].player_mut(),
            None => None,
        }
    }

    pub fn player_cell(&self) -> Option<&Cell> {
        self.player_idx.map(|i| &self.cells[i])
    }

    /// Is some cell's pending action going to land it on `pos`?
    /// Removals do not claim a position.
    pub fn move_staged_onto(&self, pos: Point) -> bool {
        self.cells.iter().any(|c| match &c.action {
            Some(a) => !matches!(a.transform, Transform::Remove) && c.pos + a.shift == pos,
            None => false,
        })
    }

    /// Commit every pending action in one pass.
    ///
    /// Removal drops the cell; otherwise a non-zero shift moves it (a moving
    /// player counts one move) and a transform replaces the kind in place.
    /// Returns whether anything visibly changed; the collection is re-sorted
    /// and the cached player index refreshed afterwards.
    pub fn resolve_actions(&mut self) -> bool {
        let mut changed = false;
        let mut i = 0;
        while i < self.cells.len() {
            let action = match self.cells[i].action.take() {
                Some(a) => a,
                None => {
                    i += 1;
                    continue;
                }
            };
            if action.transform == Transform::Remove {
                self.cells.remove(i);
                changed = true;
                continue; // the next cell slid into slot i
            }
            if !action.shift.is_zero() {
                self.cells[i].pos += action.shift;
                if let Some(player) = self.cells[i].player_mut() {
                    player.moves += 1;
                }
                changed = true;
            }
            if let Transform::Into(kind) = action.transform {
                self.cells[i].kind = kind;
                changed = true;
            }
            i += 1;
        }
        if changed {
            self.restore_order();
        }
        changed
    }

    // ── Internal ──

    fn search(&self, pos: Point) -> Result<usize, usize> {
        self.cells
            .binary_search_by_key(&pos.row_major(), |c| c.pos.row_major())
    }

    fn restore_order(&mut self) {
        self.cells.sort_by_key(|c| c.pos.row_major());
        self.refresh_player_idx();
    }

    fn refresh_player_idx(&mut self) {
        self.player_idx = self.cells.iter().position(|c| c.kind.is_player());
    }
}

/// Test support: is the layer sorted by (y, x) without duplicate positions?
#[cfg(test)]
pub fn is_strictly_sorted(layer: &Layer) -> bool {
    layer
        .cells()
        .windows(2)
        .all(|w| w[0].pos.row_major() < w[1].pos.row_major())
}
