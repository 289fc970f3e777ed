/// Turn orchestration: player movement, the periodic cell update
/// (gravity, portals), win/loss evaluation and option toggling.
///
/// A game is `Loading -> Playable -> Won | Lost`; only loading a new level
/// re-enters Playable. While not playable, movement input is ignored.
///
/// Processing order per player move:
///   1. Push feasibility (`movable_boxes`)
///   2. Entry query on the target terrain cell (side effects stage here)
///   3. Stage player + crate moves
///   4. Resolve static layer, then dynamic layer
///
/// Per periodic tick: gravity pass (optional), portal pass, resolution.

use crate::domain::cell::CellKind;
use crate::domain::options::{GameOption, OptionSet};
use crate::domain::point::{Point, DOWN};
use crate::sim::map::Map;

pub struct Game {
    pub map: Map,
    pub options: OptionSet,
    playable: bool,
    /// Set whenever a resolution pass changed anything visible.
    /// The renderer clears it after redrawing.
    pub map_changed: bool,
}

impl Game {
    /// A game with nothing loaded. Not playable until a level is installed.
    pub fn new() -> Self {
        Game {
            map: Map::empty(),
            options: OptionSet::new(),
            playable: false,
            map_changed: false,
        }
    }

    pub fn playable(&self) -> bool {
        self.playable
    }

    /// Replace the running level. Used by the loader after a successful
    /// parse, so a failed load never touches the previous state.
    pub fn install(&mut self, map: Map, options: OptionSet) {
        self.map = map;
        self.options = options;
        self.playable = false;
        self.map_changed = true;
    }

    /// Begin play and evaluate terminal conditions once, so a level that is
    /// already solved on load reports the win immediately.
    pub fn start(&mut self) -> Option<&'static str> {
        self.playable = true;
        self.check_game_state()
    }

    // ── Movement ──

    pub fn move_player(&mut self, direction: Point) {
        if !self.playable {
            return;
        }
        let new_pos = self.map.player_pos() + direction;
        let options = self.options.clone();
        let crates = self.map.movable_boxes(new_pos, direction, &options);
        if !self.map.position_possible(new_pos) || crates < 0 {
            return;
        }
        let player_idx = self
            .map
            .dynamics
            .player_index()
            .expect("dynamic layer must contain a player");
        if self.map.statics.index_of(new_pos).is_none()
            || self.map.allows_to_enter(new_pos, player_idx, &options)
        {
            self.map.dynamics.cell_mut(player_idx).stage_move(direction);
        }
        let mut pos = new_pos;
        for _ in 0..crates {
            let idx = self
                .map
                .dynamics
                .index_of(pos)
                .expect("validated crate chain");
            self.map.dynamics.cell_mut(idx).stage_move(direction);
            pos += direction;
        }
        self.perform_cell_actions();
    }

    // ── Periodic update ──

    pub fn update_cells(&mut self) {
        if self.options.contains(&GameOption::Gravity) {
            self.apply_gravity();
        }
        self.portal_pass();
        self.perform_cell_actions();
    }

    /// Unsupported crates fall one row per tick. Rows are processed
    /// bottom-up and resolved one at a time, so a stacked column drops as a
    /// unit instead of falling through itself.
    fn apply_gravity(&mut self) {
        let options = self.options.clone();
        for y in (0..self.map.height() - 1).rev() {
            for x in 0..self.map.width() {
                let pos = Point::new(x, y);
                let below = pos + DOWN;
                let idx = match self.map.dynamics.index_of(pos) {
                    Some(i) if self.map.dynamics.cell(i).kind.is_crate() => i,
                    _ => continue,
                };
                if self.map.dynamics.cell_at(below).is_some() {
                    continue;
                }
                if self.map.statics.index_of(below).is_none()
                    || self.map.allows_to_enter(below, idx, &options)
                {
                    self.map.dynamics.cell_mut(idx).stage_move(DOWN);
                }
            }
            self.perform_cell_actions();
        }
    }

    /// Forward any dynamic cell standing on a portal tile. The entry query
    /// stages the jump; the general resolution afterwards commits it.
    fn portal_pass(&mut self) {
        let options = self.options.clone();
        let portals: Vec<Point> = self
            .map
            .statics
            .cells()
            .iter()
            .filter(|c| matches!(c.kind, CellKind::Portal { .. }))
            .map(|c| c.pos)
            .collect();
        for pos in portals {
            if let Some(idx) = self.map.dynamics.index_of(pos) {
                let _ = self.map.allows_to_enter(pos, idx, &options);
            }
        }
    }

    fn perform_cell_actions(&mut self) {
        let statics_changed = self.map.statics.resolve_actions();
        let dynamics_changed = self.map.dynamics.resolve_actions();
        if statics_changed || dynamics_changed {
            self.map_changed = true;
        }
    }

    // ── Terminal conditions ──

    pub fn check_game_state(&mut self) -> Option<&'static str> {
        if !self.playable {
            return None;
        }
        if self.player_win() {
            self.playable = false;
            self.map_changed = true;
            return Some("Player win!");
        }
        if self.move_limit_reached() {
            self.playable = false;
            self.map_changed = true;
            return Some("No more moves");
        }
        None
    }

    /// Win iff every crate rests on a cage. Vacuously true with no crates.
    fn player_win(&self) -> bool {
        self.map.dynamics.cells().iter().all(|cell| {
            !cell.kind.is_crate()
                || matches!(
                    self.map.statics.cell_at(cell.pos).map(|c| &c.kind),
                    Some(CellKind::Cage)
                )
        })
    }

    fn move_limit_reached(&self) -> bool {
        self.options.contains(&GameOption::MoveLimit)
            && self.map.player().moves >= self.map.player().max_moves
    }

    // ── Options and player adjustments ──

    /// Toggle an option by name. Returns the confirmation message, or None
    /// for an unknown name (no state change).
    pub fn toggle_option(&mut self, name: &str) -> Option<String> {
        let option = GameOption::from_name(name)?;
        if self.options.remove(&option) {
            Some(format!("Option {} switched off", option.name()))
        } else {
            self.options.insert(option);
            Some(format!("Option {} switched on", option.name()))
        }
    }

    pub fn option_list(&self) -> String {
        if self.options.is_empty() {
            return "No active options".to_string();
        }
        let mut names: Vec<&str> = self.options.iter().map(|o| o.name()).collect();
        names.sort();
        names.join(", ")
    }

    pub fn add_moves(&mut self, count: i32) -> Option<u32> {
        self.map.player_mut().add_moves(count)
    }

    pub fn set_force(&mut self, force: i32) -> bool {
        self.map.player_mut().set_force(force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cell::PlayerState;
    use crate::domain::point::{LEFT, RIGHT, UP};
    use crate::sim::layer::is_strictly_sorted;

    fn game_with_player(w: i32, h: i32, x: i32, y: i32, force: u32) -> Game {
        let mut game = Game::new();
        let mut map = Map::new(w, h);
        let mut player = PlayerState::new();
        player.force = force;
        map.add_dynamic(Point::new(x, y), CellKind::Player(player));
        game.install(map, OptionSet::new());
        // Callers add crates and terrain, then call start() themselves:
        // starting an empty map would count as an instant (vacuous) win.
        game
    }

    fn crate_pos(game: &Game) -> Vec<Point> {
        game.map
            .dynamics
            .cells()
            .iter()
            .filter(|c| c.kind.is_crate())
            .map(|c| c.pos)
            .collect()
    }

    #[test]
    fn multi_crate_push_moves_the_whole_chain() {
        let mut game = game_with_player(5, 1, 1, 0, 3);
        game.map.add_dynamic(Point::new(2, 0), CellKind::Crate);
        game.map.add_dynamic(Point::new(3, 0), CellKind::Crate);
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(2, 0));
        assert_eq!(crate_pos(&game), vec![Point::new(3, 0), Point::new(4, 0)]);
        assert_eq!(game.map.player().moves, 1);
    }

    #[test]
    fn push_beyond_force_is_a_no_op() {
        let mut game = game_with_player(5, 1, 1, 0, 1);
        game.map.add_dynamic(Point::new(2, 0), CellKind::Crate);
        game.map.add_dynamic(Point::new(3, 0), CellKind::Crate);
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(1, 0));
        assert_eq!(crate_pos(&game), vec![Point::new(2, 0), Point::new(3, 0)]);
        assert_eq!(game.map.player().moves, 0);
    }

    #[test]
    fn push_without_landing_room_is_a_no_op() {
        let mut game = game_with_player(4, 1, 1, 0, 2);
        game.map.add_dynamic(Point::new(2, 0), CellKind::Crate);
        game.map.add_dynamic(Point::new(3, 0), CellKind::Crate);
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(1, 0));
        assert_eq!(crate_pos(&game), vec![Point::new(2, 0), Point::new(3, 0)]);
    }

    #[test]
    fn move_off_the_map_is_a_no_op() {
        let mut game = game_with_player(3, 3, 0, 0, 1);
        game.map.add_dynamic(Point::new(2, 2), CellKind::Crate);
        game.start();
        game.move_player(LEFT);
        game.move_player(UP);
        assert_eq!(game.map.player_pos(), Point::new(0, 0));
        assert_eq!(game.map.player().moves, 0);
    }

    #[test]
    fn wall_blocks_the_player() {
        let mut game = game_with_player(3, 1, 0, 0, 1);
        game.map.add_static(Point::new(1, 0), CellKind::Wall);
        game.map.add_dynamic(Point::new(2, 0), CellKind::Crate);
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(0, 0));
    }

    #[test]
    fn locked_door_blocks_until_key_collected() {
        let mut game = game_with_player(5, 1, 0, 0, 1);
        game.map.add_static(Point::new(1, 0), CellKind::Door { id: 3 });
        game.map.add_static(Point::new(2, 0), CellKind::Key { id: 3 });
        game.map.add_dynamic(Point::new(4, 0), CellKind::Crate);
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(0, 0));

        // Hand the player the key directly, then the door opens and is gone
        game.map.player_mut().keys.push(3);
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(1, 0));
        assert!(game.map.player().keys.is_empty());
        assert!(game.map.statics.cell_at(Point::new(1, 0)).is_none());
    }

    #[test]
    fn key_cell_is_consumed_on_pickup() {
        let mut game = game_with_player(5, 1, 0, 0, 1);
        game.map.add_static(Point::new(1, 0), CellKind::Key { id: 9 });
        game.map.add_dynamic(Point::new(4, 0), CellKind::Crate);
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.map.player().keys, vec![9]);
        assert!(game.map.statics.cell_at(Point::new(1, 0)).is_none());
    }

    #[test]
    fn crate_pushed_onto_plate_opens_linked_door() {
        let mut game = game_with_player(6, 1, 0, 0, 1);
        game.map.add_dynamic(Point::new(1, 0), CellKind::Crate);
        game.map.add_static(Point::new(2, 0), CellKind::Plate { id: 4 });
        game.map.add_static(Point::new(4, 0), CellKind::Door { id: 4 });
        game.start();
        game.move_player(RIGHT);
        assert_eq!(crate_pos(&game), vec![Point::new(2, 0)]);
        assert!(game.map.statics.cell_at(Point::new(4, 0)).is_none());
        // The plate itself survives
        assert!(game.map.statics.cell_at(Point::new(2, 0)).is_some());
    }

    #[test]
    fn win_when_all_crates_rest_on_cages() {
        let mut game = game_with_player(4, 1, 0, 0, 1);
        game.map.add_dynamic(Point::new(1, 0), CellKind::Crate);
        game.map.add_static(Point::new(2, 0), CellKind::Cage);
        assert_eq!(game.start(), None);
        game.move_player(RIGHT);
        assert_eq!(game.check_game_state(), Some("Player win!"));
        assert!(!game.playable());
        // Input is ignored once the game is over
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(1, 0));
    }

    #[test]
    fn win_is_vacuous_without_crates() {
        let mut game = game_with_player(3, 3, 1, 1, 1);
        assert_eq!(game.start(), Some("Player win!"));
    }

    #[test]
    fn move_limit_loss_freezes_input() {
        let mut game = game_with_player(6, 1, 0, 0, 1);
        game.map.add_dynamic(Point::new(5, 0), CellKind::Crate); // keeps win off
        game.map.player_mut().max_moves = 2;
        game.options.insert(GameOption::MoveLimit);
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.check_game_state(), None);
        game.move_player(RIGHT);
        assert_eq!(game.check_game_state(), Some("No more moves"));
        assert!(!game.playable());
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(2, 0));
    }

    #[test]
    fn gravity_moves_a_stack_as_a_unit() {
        let mut game = game_with_player(2, 4, 1, 3, 1);
        game.map.add_dynamic(Point::new(0, 0), CellKind::Crate);
        game.map.add_dynamic(Point::new(0, 1), CellKind::Crate);
        game.options.insert(GameOption::Gravity);
        // Rows resolve bottom-up, so the whole column drops one row per
        // tick without the crates interpenetrating.
        game.update_cells();
        assert_eq!(crate_pos(&game), vec![Point::new(0, 1), Point::new(0, 2)]);
        game.update_cells();
        assert_eq!(crate_pos(&game), vec![Point::new(0, 2), Point::new(0, 3)]);
        game.update_cells();
        assert_eq!(crate_pos(&game), vec![Point::new(0, 2), Point::new(0, 3)]);
    }

    #[test]
    fn gravity_stops_on_walls_and_without_the_option() {
        let mut game = game_with_player(2, 4, 1, 3, 1);
        game.map.add_dynamic(Point::new(0, 0), CellKind::Crate);
        game.map.add_static(Point::new(0, 2), CellKind::Wall);
        game.update_cells(); // gravity off
        assert_eq!(crate_pos(&game), vec![Point::new(0, 0)]);
        game.options.insert(GameOption::Gravity);
        game.update_cells();
        game.update_cells();
        assert_eq!(crate_pos(&game), vec![Point::new(0, 1)]);
    }

    #[test]
    fn falling_crate_triggers_plate() {
        let mut game = game_with_player(2, 3, 1, 2, 1);
        game.map.add_dynamic(Point::new(0, 0), CellKind::Crate);
        game.map.add_static(Point::new(0, 2), CellKind::Plate { id: 6 });
        game.map.add_static(Point::new(1, 0), CellKind::Door { id: 6 });
        game.options.insert(GameOption::Gravity);
        game.update_cells();
        game.update_cells();
        assert_eq!(crate_pos(&game), vec![Point::new(0, 2)]);
        assert!(game.map.statics.cell_at(Point::new(1, 0)).is_none());
    }

    #[test]
    fn walking_into_a_portal_relocates_within_the_move() {
        let mut game = game_with_player(6, 1, 0, 0, 1);
        game.map
            .add_static(Point::new(1, 0), CellKind::Portal { dest: Point::new(4, 0) });
        game.map.add_dynamic(Point::new(5, 0), CellKind::Crate);
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(4, 0));
        assert_eq!(game.map.player().moves, 1);
    }

    #[test]
    fn blocked_portal_tile_is_impassable() {
        let mut game = game_with_player(6, 1, 0, 0, 1);
        game.map.add_dynamic(Point::new(4, 0), CellKind::Crate);
        game.map
            .add_static(Point::new(1, 0), CellKind::Portal { dest: Point::new(4, 0) });
        game.start();
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(0, 0));
        assert_eq!(game.map.player().moves, 0);
    }

    #[test]
    fn portal_pass_forwards_a_resting_crate() {
        let mut game = game_with_player(6, 1, 0, 0, 1);
        game.map.add_dynamic(Point::new(2, 0), CellKind::Crate);
        game.map
            .add_static(Point::new(2, 0), CellKind::Portal { dest: Point::new(5, 0) });
        game.update_cells();
        assert_eq!(crate_pos(&game), vec![Point::new(5, 0)]);
    }

    #[test]
    fn portals_sharing_a_destination_forward_one_cell_per_tick() {
        let mut game = game_with_player(8, 1, 0, 0, 1);
        game.map
            .add_static(Point::new(2, 0), CellKind::Portal { dest: Point::new(5, 0) });
        game.map
            .add_static(Point::new(3, 0), CellKind::Portal { dest: Point::new(5, 0) });
        game.map.add_dynamic(Point::new(2, 0), CellKind::Crate);
        game.map.add_dynamic(Point::new(3, 0), CellKind::Crate);
        game.update_cells();
        // Only the first portal's crate jumps; the destination is claimed
        // for the rest of the tick, never stacked on.
        assert_eq!(crate_pos(&game), vec![Point::new(3, 0), Point::new(5, 0)]);
        assert!(is_strictly_sorted(&game.map.dynamics));
        game.update_cells();
        // The destination is still occupied, so the second crate waits
        assert_eq!(crate_pos(&game), vec![Point::new(3, 0), Point::new(5, 0)]);
    }

    #[test]
    fn layers_stay_sorted_through_play() {
        let mut game = game_with_player(5, 3, 0, 0, 2);
        game.map.add_dynamic(Point::new(1, 0), CellKind::Crate);
        game.map.add_dynamic(Point::new(2, 1), CellKind::Crate);
        game.map.add_static(Point::new(4, 2), CellKind::Cage);
        game.options.insert(GameOption::Gravity);
        game.start();
        for dir in [RIGHT, RIGHT, LEFT, UP] {
            game.move_player(dir);
            game.update_cells();
            assert!(is_strictly_sorted(&game.map.statics));
            assert!(is_strictly_sorted(&game.map.dynamics));
        }
    }

    #[test]
    fn toggle_option_round_trip_and_unknown_name() {
        let mut game = game_with_player(3, 1, 0, 0, 1);
        assert_eq!(
            game.toggle_option("gravity").as_deref(),
            Some("Option Gravity switched on")
        );
        assert_eq!(game.option_list(), "Gravity");
        assert_eq!(
            game.toggle_option("GRAVITY").as_deref(),
            Some("Option Gravity switched off")
        );
        assert_eq!(game.option_list(), "No active options");
        assert_eq!(game.toggle_option("warpspeed"), None);
    }

    #[test]
    fn unplayable_game_ignores_input() {
        let mut game = Game::new();
        let mut map = Map::new(3, 1);
        map.add_dynamic(Point::new(0, 0), CellKind::Player(PlayerState::new()));
        game.install(map, OptionSet::new());
        // Not started: movement must be ignored
        game.move_player(RIGHT);
        assert_eq!(game.map.player_pos(), Point::new(0, 0));
    }
}
