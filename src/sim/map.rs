/// The map: one static layer (terrain) and one dynamic layer (player and
/// crates), plus the rules for entering static cells and pushing crates.
///
/// Entry rules are centralized here instead of on the cells themselves:
/// several of them cut across cells (a plate opens doors elsewhere in the
/// layer, a portal inspects both layers at its destination), which a single
/// dispatch point over `&mut Map` expresses without aliasing trouble. All
/// effects are staged as pending actions; nothing is committed until the
/// layers resolve.

use crate::domain::cell::{Cell, CellAction, CellKind, PlayerState};
use crate::domain::options::{GameOption, OptionSet};
use crate::domain::point::Point;
use crate::sim::layer::Layer;

#[derive(Clone, Debug)]
pub struct Map {
    pub statics: Layer,
    pub dynamics: Layer,
}

impl Map {
    pub fn new(width: i32, height: i32) -> Self {
        Map {
            statics: Layer::new(width, height),
            dynamics: Layer::new(width, height),
        }
    }

    /// Placeholder map before any level is loaded.
    pub fn empty() -> Self {
        Map::new(0, 0)
    }

    pub fn width(&self) -> i32 {
        self.statics.width()
    }

    pub fn height(&self) -> i32 {
        self.statics.height()
    }

    pub fn position_possible(&self, pos: Point) -> bool {
        self.statics.in_bounds(pos)
    }

    /// The player's stats. A loaded map always contains exactly one player
    /// cell; anything else is a broken invariant, not a recoverable state.
    pub fn player(&self) -> &PlayerState {
        self.dynamics
            .player()
            .expect("dynamic layer must contain a player")
    }

    pub fn player_mut(&mut self) -> &mut PlayerState {
        self.dynamics
            .player_mut()
            .expect("dynamic layer must contain a player")
    }

    pub fn player_pos(&self) -> Point {
        self.dynamics
            .player_cell()
            .expect("dynamic layer must contain a player")
            .pos
    }

    /// May the dynamic cell at index `entering` end its move on `target`?
    ///
    /// Side effects are part of the contract: the entering cell may be
    /// granted a key or a bomb, the static cell may stage its own removal,
    /// a plate may stage the removal of matching doors, and a portal may
    /// stage a jump on the entering cell itself. Positions without a static
    /// cell always admit entry.
    pub fn allows_to_enter(&mut self, target: Point, entering: usize, options: &OptionSet) -> bool {
        let static_idx = match self.statics.index_of(target) {
            Some(i) => i,
            None => return true,
        };
        match self.statics.cell(static_idx).kind.clone() {
            CellKind::Wall => self.enter_wall(static_idx, entering, options),
            CellKind::Cage => true,
            CellKind::Plate { id } => self.enter_plate(id, entering),
            CellKind::Key { id } => self.enter_key(static_idx, id, entering),
            CellKind::Door { id } => self.enter_door(static_idx, id, entering),
            CellKind::Bomb => self.enter_bomb(static_idx, entering),
            CellKind::Portal { dest } => self.enter_portal(dest, entering, options),
            // Dynamic kinds never appear in the static layer
            CellKind::Crate | CellKind::Player(_) => false,
        }
    }

    /// How many crates would a push into `target` along `dir` displace?
    ///
    /// -1 means the push is illegal: the chain is longer than the player's
    /// force, or runs off the map, or the cell past the last crate denies
    /// that crate entry. 0 means there is nothing to push (the caller still
    /// has to check the static cell at `target` for the player itself).
    pub fn movable_boxes(&mut self, target: Point, dir: Point, options: &OptionSet) -> i32 {
        let mut crates = 0;
        let mut pos = target;
        while self.position_possible(pos)
            && self
                .dynamics
                .cell_at(pos)
                .map_or(false, |c| c.kind.is_crate())
        {
            crates += 1;
            pos += dir;
        }
        if crates > self.player().force as i32 {
            return -1;
        }
        if crates == 0 {
            return 0;
        }
        if !self.position_possible(pos) {
            return -1;
        }
        let last_crate = self
            .dynamics
            .index_of(pos - dir)
            .expect("crate chain ends in a crate");
        if self.statics.index_of(pos).is_none() || self.allows_to_enter(pos, last_crate, options) {
            crates
        } else {
            -1
        }
    }

    // ── Entry rules per static kind ──

    fn enter_wall(&mut self, static_idx: usize, entering: usize, options: &OptionSet) -> bool {
        let Some(player) = self.dynamics.cell_mut(entering).player_mut() else {
            return false;
        };
        if options.contains(&GameOption::Iddqd) {
            return true;
        }
        if player.bombs > 0 {
            player.bombs -= 1;
            self.statics.cell_mut(static_idx).action = Some(CellAction::removal());
            return true;
        }
        false
    }

    fn enter_plate(&mut self, id: u32, entering: usize) -> bool {
        let kind = &self.dynamics.cell(entering).kind;
        if kind.is_player() || kind.is_crate() {
            for cell in self.statics.cells_mut() {
                if cell.kind == (CellKind::Door { id }) {
                    cell.action = Some(CellAction::removal());
                }
            }
        }
        true
    }

    fn enter_key(&mut self, static_idx: usize, id: u32, entering: usize) -> bool {
        if let Some(player) = self.dynamics.cell_mut(entering).player_mut() {
            player.keys.push(id);
        }
        // Picked up (or crushed) no matter who entered
        self.statics.cell_mut(static_idx).action = Some(CellAction::removal());
        true
    }

    fn enter_door(&mut self, static_idx: usize, id: u32, entering: usize) -> bool {
        let Some(player) = self.dynamics.cell_mut(entering).player_mut() else {
            return false;
        };
        if let Some(slot) = player.keys.iter().position(|&k| k == id) {
            player.keys.remove(slot);
            self.statics.cell_mut(static_idx).action = Some(CellAction::removal());
            return true;
        }
        false
    }

    fn enter_bomb(&mut self, static_idx: usize, entering: usize) -> bool {
        if let Some(player) = self.dynamics.cell_mut(entering).player_mut() {
            player.bombs += 1;
        }
        self.statics.cell_mut(static_idx).action = Some(CellAction::removal());
        true
    }

    /// One-way teleport. If the destination is free, the entering cell's
    /// pending move is extended so that it lands on the destination this
    /// tick, and the portal reports not-blocking. If the destination is
    /// unavailable, the portal tile is impassable this tick.
    ///
    /// A destination claimed by an already-staged move counts as occupied,
    /// so two portals sharing one destination forward a single cell per
    /// tick instead of stacking two cells on it. An off-map destination
    /// blocks permanently; the loader rejects such levels, but maps built
    /// in code get the same guard.
    ///
    /// A destination holding another portal counts as free without being
    /// invoked: no chaining within a tick, the second hop happens on the
    /// next tick's portal pass.
    fn enter_portal(&mut self, dest: Point, entering: usize, options: &OptionSet) -> bool {
        if !self.position_possible(dest) {
            return false;
        }
        if self.dynamics.cell_at(dest).is_some() || self.dynamics.move_staged_onto(dest) {
            return false;
        }
        let dest_admits = match self.statics.cell_at(dest).map(|c| c.kind.clone()) {
            None => true,
            Some(CellKind::Portal { .. }) => true,
            Some(_) => self.allows_to_enter(dest, entering, options),
        };
        if !dest_admits {
            return false;
        }
        let cell = self.dynamics.cell_mut(entering);
        let jump = dest - cell.pos;
        match &mut cell.action {
            Some(action) => action.shift = jump,
            None => cell.action = Some(CellAction::movement(jump)),
        }
        true
    }
}

// ── Construction helpers ──

impl Map {
    /// Add a static cell at `pos`. Duplicate positions are rejected.
    pub fn add_static(&mut self, pos: Point, kind: CellKind) -> bool {
        self.statics.add_cell(Cell::new(pos, kind))
    }

    /// Add a dynamic cell at `pos`. Duplicate positions are rejected.
    pub fn add_dynamic(&mut self, pos: Point, kind: CellKind) -> bool {
        self.dynamics.add_cell(Cell::new(pos, kind))
    }
}
