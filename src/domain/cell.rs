/// Cells and their pending actions.
///
/// A cell is one occupant of one grid position in one layer. The kind is a
/// sum type rather than a trait object: entry rules need to inspect other
/// kinds concretely (a plate scans for doors by id), which pattern matching
/// expresses directly.

use crate::domain::point::Point;

/// Hard ceiling for the player's move budget.
pub const MOVE_LIMIT: u32 = 99_999;
/// Hard ceiling for push force.
pub const FORCE_LIMIT: u32 = 100;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CellKind {
    // Static layer (terrain)
    Wall,
    Cage,
    Plate { id: u32 },
    Key { id: u32 },
    Door { id: u32 },
    Bomb,
    Portal { dest: Point },
    // Dynamic layer (movable objects)
    Crate,
    Player(PlayerState),
}

impl CellKind {
    /// Symbol used in the save-file grid body and unique-cell records.
    pub fn glyph(&self) -> char {
        match self {
            CellKind::Wall => '#',
            CellKind::Cage => '*',
            CellKind::Plate { .. } => '_',
            CellKind::Key { .. } => '+',
            CellKind::Door { .. } => '|',
            CellKind::Bomb => '=',
            CellKind::Portal { .. } => '0',
            CellKind::Crate => '%',
            CellKind::Player(_) => '@',
        }
    }

    /// Does this kind carry an id or destination that the one-character
    /// grid body cannot encode? Such cells are written as '?' in the grid
    /// and fully specified in the unique-cell list.
    pub fn needs_record(&self) -> bool {
        matches!(
            self,
            CellKind::Plate { .. }
                | CellKind::Key { .. }
                | CellKind::Door { .. }
                | CellKind::Portal { .. }
        )
    }

    pub fn is_crate(&self) -> bool {
        matches!(self, CellKind::Crate)
    }

    pub fn is_player(&self) -> bool {
        matches!(self, CellKind::Player(_))
    }
}

/// Player stats carried inside the player's dynamic cell.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PlayerState {
    pub moves: u32,
    pub max_moves: u32,
    pub force: u32,
    pub bombs: u32,
    pub keys: Vec<u32>,
}

impl PlayerState {
    pub fn new() -> Self {
        PlayerState {
            moves: 0,
            max_moves: 0,
            force: 1,
            bombs: 0,
            keys: Vec::new(),
        }
    }

    /// Raise the move budget by `count`. Fails for zero or negative counts.
    /// The budget is capped at [`MOVE_LIMIT`]; returns the amount actually
    /// added after clamping.
    pub fn add_moves(&mut self, count: i32) -> Option<u32> {
        if count <= 0 {
            return None;
        }
        let added = (count as u32).min(MOVE_LIMIT - self.max_moves.min(MOVE_LIMIT));
        self.max_moves += added;
        Some(added)
    }

    /// Set push force. Fails for zero or negative values; values above
    /// [`FORCE_LIMIT`] are clamped to it.
    pub fn set_force(&mut self, force: i32) -> bool {
        if force <= 0 {
            return false;
        }
        self.force = (force as u32).min(FORCE_LIMIT);
        true
    }
}

/// What happens to a cell when its pending action resolves.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Transform {
    /// Kind unchanged.
    Keep,
    /// Cell removed from its layer (opened door, picked-up key, bombed wall).
    Remove,
    /// Kind replaced in place, position preserved.
    Into(CellKind),
}

/// One pending effect, staged during rule evaluation and committed by the
/// layer's resolution pass. At most one per cell per tick.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CellAction {
    pub shift: Point,
    pub transform: Transform,
}

impl CellAction {
    pub fn movement(shift: Point) -> Self {
        CellAction { shift, transform: Transform::Keep }
    }

    pub fn removal() -> Self {
        CellAction { shift: crate::domain::point::ZERO, transform: Transform::Remove }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Cell {
    pub pos: Point,
    pub kind: CellKind,
    pub action: Option<CellAction>,
}

impl Cell {
    pub fn new(pos: Point, kind: CellKind) -> Self {
        Cell { pos, kind, action: None }
    }

    pub fn player(&self) -> Option<&PlayerState> {
        match &self.kind {
            CellKind::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.kind {
            CellKind::Player(state) => Some(state),
            _ => None,
        }
    }

    /// Stage a step move unless an action is already pending. A portal may
    /// have routed this cell already; its staged jump takes precedence over
    /// the plain step that triggered it.
    pub fn stage_move(&mut self, shift: Point) {
        if self.action.is_none() {
            self.action = Some(CellAction::movement(shift));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_moves_clamps_at_limit() {
        let mut p = PlayerState::new();
        p.max_moves = 99_000;
        assert_eq!(p.add_moves(2000), Some(999));
        assert_eq!(p.max_moves, MOVE_LIMIT);
        // At the cap, further additions succeed but add nothing
        assert_eq!(p.add_moves(5), Some(0));
        assert_eq!(p.max_moves, MOVE_LIMIT);
    }

    #[test]
    fn add_moves_rejects_non_positive() {
        let mut p = PlayerState::new();
        p.max_moves = 40;
        assert_eq!(p.add_moves(0), None);
        assert_eq!(p.add_moves(-3), None);
        assert_eq!(p.max_moves, 40);
    }

    #[test]
    fn set_force_clamps_at_limit() {
        let mut p = PlayerState::new();
        assert!(p.set_force(200));
        assert_eq!(p.force, FORCE_LIMIT);
        assert!(p.set_force(3));
        assert_eq!(p.force, 3);
    }

    #[test]
    fn set_force_rejects_non_positive() {
        let mut p = PlayerState::new();
        assert!(!p.set_force(0));
        assert!(!p.set_force(-1));
        assert_eq!(p.force, 1);
    }

    #[test]
    fn stage_move_keeps_existing_action() {
        use crate::domain::point::{Point, RIGHT};
        let mut cell = Cell::new(Point::new(1, 1), CellKind::Crate);
        cell.action = Some(CellAction::movement(Point::new(4, 0)));
        cell.stage_move(RIGHT);
        assert_eq!(cell.action, Some(CellAction::movement(Point::new(4, 0))));
    }
}
