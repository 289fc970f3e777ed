/// Level persistence.
///
/// ## File format:
///   Semicolon-separated lines behind a `crateshift 1;` header.
///
/// ```text
///   crateshift 1;
///   options;<count>;<name>;...
///   staticcells;<width>;<height>
///   <height grid rows, one glyph per cell, '?' for id-bearing cells>
///   uniquecells;<count>          then one record per '?' in the grid
///   dynamiccells;<count>         then %;x;y per crate and the @ record
///   keys;<count>;<id>;...
/// ```
///
/// The grid body carries walls, cages and bombs directly; plates, keys,
/// doors and portals need an id or destination, so the grid marks them '?'
/// and a unique-cell record spells them out. Loading builds a fresh map and
/// option set, so a malformed file never disturbs the running game.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::domain::cell::{CellKind, PlayerState};
use crate::domain::options::{GameOption, OptionSet};
use crate::domain::point::Point;
use crate::sim::map::Map;

const HEADER: &str = "crateshift 1;";
pub const LEVEL_EXTENSION: &str = "sok";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("not a crateshift save (missing '{HEADER}' header)")]
    BadHeader,
    #[error("line {line}: expected '{section}' section")]
    BadSection { line: usize, section: &'static str },
    #[error("line {line}: truncated record")]
    Truncated { line: usize },
    #[error("line {line}: invalid number '{value}'")]
    BadNumber { line: usize, value: String },
    #[error("line {line}: unknown cell glyph '{glyph}'")]
    UnknownGlyph { line: usize, glyph: char },
    #[error("line {line}: unknown option '{name}'")]
    UnknownOption { line: usize, name: String },
    #[error("line {line}: position ({x}, {y}) lies outside the grid")]
    OutOfBounds { line: usize, x: i32, y: i32 },
    #[error("grid cell at ({x}, {y}) has no matching unique record")]
    MissingRecord { x: i32, y: i32 },
    #[error("duplicate cell at ({x}, {y})")]
    DuplicateCell { x: i32, y: i32 },
    #[error("save contains no player record")]
    NoPlayer,
    #[error("could not read save file: {0}")]
    Io(#[from] std::io::Error),
}

// ══════════════════════════════════════════════════════════════
// Serialization
// ══════════════════════════════════════════════════════════════

pub fn serialize(map: &Map, options: &OptionSet) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str(HEADER);
    out.push('\n');

    let mut names: Vec<&str> = options.iter().map(|o| o.name()).collect();
    names.sort();
    out.push_str(&format!("options;{}", names.len()));
    for name in names {
        out.push_str(&format!(";{}", name));
    }
    out.push('\n');

    let (w, h) = (map.width(), map.height());
    out.push_str(&format!("staticcells;{};{}\n", w, h));
    let mut grid = vec![vec![' '; w.max(0) as usize]; h.max(0) as usize];
    let mut records: Vec<String> = Vec::new();
    for cell in map.statics.cells() {
        let (x, y) = (cell.pos.x as usize, cell.pos.y as usize);
        if cell.kind.needs_record() {
            grid[y][x] = '?';
            records.push(match &cell.kind {
                CellKind::Plate { id } | CellKind::Key { id } | CellKind::Door { id } => {
                    format!("{};{};{};{}", cell.kind.glyph(), cell.pos.x, cell.pos.y, id)
                }
                CellKind::Portal { dest } => {
                    format!("0;{};{};{};{}", cell.pos.x, cell.pos.y, dest.x, dest.y)
                }
                _ => unreachable!("needs_record covers only id-bearing kinds"),
            });
        } else {
            grid[y][x] = cell.kind.glyph();
        }
    }
    for row in &grid {
        out.push_str(&row.iter().collect::<String>());
        out.push('\n');
    }

    out.push_str(&format!("uniquecells;{}\n", records.len()));
    for record in &records {
        out.push_str(record);
        out.push('\n');
    }

    out.push_str(&format!("dynamiccells;{}\n", map.dynamics.cells().len()));
    let mut keys: Vec<u32> = Vec::new();
    for cell in map.dynamics.cells() {
        match &cell.kind {
            CellKind::Crate => out.push_str(&format!("%;{};{}\n", cell.pos.x, cell.pos.y)),
            CellKind::Player(p) => {
                out.push_str(&format!(
                    "@;{};{};{};{};{};{}\n",
                    cell.pos.x, cell.pos.y, p.moves, p.max_moves, p.force, p.bombs
                ));
                keys = p.keys.clone();
            }
            _ => {}
        }
    }
    out.push_str(&format!("keys;{}", keys.len()));
    for id in keys {
        out.push_str(&format!(";{}", id));
    }
    out.push('\n');
    out
}

// ══════════════════════════════════════════════════════════════
// Parsing
// ══════════════════════════════════════════════════════════════

/// Line cursor carrying the 1-based line number for error context.
struct Lines<'a> {
    inner: std::str::Lines<'a>,
    number: usize,
}

impl<'a> Lines<'a> {
    fn new(content: &'a str) -> Self {
        Lines { inner: content.lines(), number: 0 }
    }

    fn next(&mut self) -> Result<&'a str, LoadError> {
        self.number += 1;
        match self.inner.next() {
            Some(line) => Ok(line),
            None => Err(LoadError::Truncated { line: self.number }),
        }
    }
}

fn num<T: FromStr>(value: &str, line: usize) -> Result<T, LoadError> {
    value.trim().parse().map_err(|_| LoadError::BadNumber {
        line,
        value: value.to_string(),
    })
}

fn field<'a>(fields: &[&'a str], idx: usize, line: usize) -> Result<&'a str, LoadError> {
    fields.get(idx).copied().ok_or(LoadError::Truncated { line })
}

/// Read a section header line `name;...` and return its fields.
fn section<'a>(lines: &mut Lines<'a>, name: &'static str) -> Result<Vec<&'a str>, LoadError> {
    let fields: Vec<&str> = lines.next()?.split(';').collect();
    if fields[0] != name {
        return Err(LoadError::BadSection { line: lines.number, section: name });
    }
    Ok(fields)
}

pub fn parse(content: &str) -> Result<(Map, OptionSet), LoadError> {
    let mut lines = Lines::new(content);
    if lines.next()?.trim_end() != HEADER {
        return Err(LoadError::BadHeader);
    }

    // options
    let fields = section(&mut lines, "options")?;
    let option_count: usize = num(field(&fields, 1, lines.number)?, lines.number)?;
    let mut options = OptionSet::new();
    for i in 0..option_count {
        let name = field(&fields, 2 + i, lines.number)?;
        match GameOption::from_name(name) {
            Some(option) => {
                options.insert(option);
            }
            None => {
                return Err(LoadError::UnknownOption {
                    line: lines.number,
                    name: name.to_string(),
                })
            }
        }
    }

    // static grid
    let fields = section(&mut lines, "staticcells")?;
    let width: i32 = num(field(&fields, 1, lines.number)?, lines.number)?;
    let height: i32 = num(field(&fields, 2, lines.number)?, lines.number)?;
    let mut map = Map::new(width, height);
    let mut pending: Vec<Point> = Vec::new();
    for y in 0..height {
        let row = lines.next()?;
        for (x, glyph) in row.chars().enumerate().take(width as usize) {
            let pos = Point::new(x as i32, y);
            let kind = match glyph {
                ' ' => continue,
                '?' => {
                    pending.push(pos);
                    continue;
                }
                '#' => CellKind::Wall,
                '*' => CellKind::Cage,
                '=' => CellKind::Bomb,
                other => {
                    return Err(LoadError::UnknownGlyph { line: lines.number, glyph: other })
                }
            };
            if !map.add_static(pos, kind) {
                return Err(LoadError::DuplicateCell { x: pos.x, y: pos.y });
            }
        }
    }

    // unique records for the '?' positions
    let fields = section(&mut lines, "uniquecells")?;
    let record_count: usize = num(field(&fields, 1, lines.number)?, lines.number)?;
    for _ in 0..record_count {
        let fields: Vec<&str> = lines.next()?.split(';').collect();
        let line = lines.number;
        let glyph = field(&fields, 0, line)?.chars().next().unwrap_or(' ');
        let x: i32 = num(field(&fields, 1, line)?, line)?;
        let y: i32 = num(field(&fields, 2, line)?, line)?;
        let pos = Point::new(x, y);
        if !map.position_possible(pos) {
            return Err(LoadError::OutOfBounds { line, x, y });
        }
        let kind = match glyph {
            '_' => CellKind::Plate { id: num(field(&fields, 3, line)?, line)? },
            '+' => CellKind::Key { id: num(field(&fields, 3, line)?, line)? },
            '|' => CellKind::Door { id: num(field(&fields, 3, line)?, line)? },
            '0' => {
                let dest = Point::new(
                    num(field(&fields, 3, line)?, line)?,
                    num(field(&fields, 4, line)?, line)?,
                );
                // An off-map destination would send cells off the grid
                if !map.position_possible(dest) {
                    return Err(LoadError::OutOfBounds { line, x: dest.x, y: dest.y });
                }
                CellKind::Portal { dest }
            }
            other => return Err(LoadError::UnknownGlyph { line, glyph: other }),
        };
        if !map.add_static(pos, kind) {
            return Err(LoadError::DuplicateCell { x, y });
        }
        pending.retain(|&p| p != pos);
    }
    if let Some(orphan) = pending.first() {
        return Err(LoadError::MissingRecord { x: orphan.x, y: orphan.y });
    }

    // dynamic cells, then the key list for the player
    let fields = section(&mut lines, "dynamiccells")?;
    let dynamic_count: usize = num(field(&fields, 1, lines.number)?, lines.number)?;
    let mut player: Option<(Point, PlayerState)> = None;
    for _ in 0..dynamic_count {
        let fields: Vec<&str> = lines.next()?.split(';').collect();
        let line = lines.number;
        let glyph = field(&fields, 0, line)?.chars().next().unwrap_or(' ');
        let x: i32 = num(field(&fields, 1, line)?, line)?;
        let y: i32 = num(field(&fields, 2, line)?, line)?;
        if !map.position_possible(Point::new(x, y)) {
            return Err(LoadError::OutOfBounds { line, x, y });
        }
        match glyph {
            '%' => {
                if !map.add_dynamic(Point::new(x, y), CellKind::Crate) {
                    return Err(LoadError::DuplicateCell { x, y });
                }
            }
            '@' => {
                let state = PlayerState {
                    moves: num(field(&fields, 3, line)?, line)?,
                    max_moves: num(field(&fields, 4, line)?, line)?,
                    force: num(field(&fields, 5, line)?, line)?,
                    bombs: num(field(&fields, 6, line)?, line)?,
                    keys: Vec::new(),
                };
                player = Some((Point::new(x, y), state));
            }
            other => return Err(LoadError::UnknownGlyph { line, glyph: other }),
        }
    }
    let (pos, mut state) = player.ok_or(LoadError::NoPlayer)?;
    let fields = section(&mut lines, "keys")?;
    let key_count: usize = num(field(&fields, 1, lines.number)?, lines.number)?;
    for i in 0..key_count {
        state.keys.push(num(field(&fields, 2 + i, lines.number)?, lines.number)?);
    }
    if !map.add_dynamic(pos, CellKind::Player(state)) {
        return Err(LoadError::DuplicateCell { x: pos.x, y: pos.y });
    }

    Ok((map, options))
}

// ══════════════════════════════════════════════════════════════
// File operations
// ══════════════════════════════════════════════════════════════

pub fn load_file(path: &Path) -> Result<(Map, OptionSet), LoadError> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn save_file(path: &Path, map: &Map, options: &OptionSet) -> std::io::Result<()> {
    std::fs::write(path, serialize(map, options))
}

/// Resolve a level name against the levels directory, adding the default
/// extension when none is given.
pub fn level_path(dir: &Path, name: &str) -> PathBuf {
    let mut path = dir.join(name);
    if path.extension().is_none() {
        path.set_extension(LEVEL_EXTENSION);
    }
    path
}

/// Level files in `dir`: right extension and a valid header.
pub fn list_levels(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return names;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(LEVEL_EXTENSION) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        if content.lines().next().map(str::trim_end) != Some(HEADER) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    names
}

// ══════════════════════════════════════════════════════════════
// Built-in level
// ══════════════════════════════════════════════════════════════

/// Starter level loaded when no file is configured: a small room with a
/// crate to cage, a keyed door, a plate-operated door, a bomb and a portal.
const STARTER: &str = "\
crateshift 1;
options;0
staticcells;8;5
########
#    * #
#? ? = #
#? ? ? #
########
uniquecells;5
+;1;2;1
|;3;2;1
_;1;3;2
|;3;3;2
0;5;3;6;1
dynamiccells;2
%;3;1
@;1;1;0;0;1;0
keys;0
";

pub fn starter_level() -> (Map, OptionSet) {
    parse(STARTER).expect("built-in level must parse")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> (Map, OptionSet) {
        let mut map = Map::new(6, 4);
        map.add_static(Point::new(0, 0), CellKind::Wall);
        map.add_static(Point::new(1, 0), CellKind::Cage);
        map.add_static(Point::new(2, 0), CellKind::Bomb);
        map.add_static(Point::new(3, 0), CellKind::Plate { id: 2 });
        map.add_static(Point::new(0, 1), CellKind::Key { id: 7 });
        map.add_static(Point::new(1, 1), CellKind::Door { id: 7 });
        map.add_static(Point::new(2, 1), CellKind::Portal { dest: Point::new(5, 3) });
        map.add_dynamic(Point::new(4, 2), CellKind::Crate);
        let mut player = PlayerState::new();
        player.moves = 12;
        player.max_moves = 50;
        player.force = 3;
        player.bombs = 2;
        player.keys = vec![7, 9];
        map.add_dynamic(Point::new(1, 2), CellKind::Player(player));
        let mut options = OptionSet::new();
        options.insert(GameOption::Gravity);
        options.insert(GameOption::MoveLimit);
        (map, options)
    }

    #[test]
    fn round_trip_preserves_everything() {
        let (map, options) = sample_map();
        let text = serialize(&map, &options);
        let (loaded, loaded_options) = parse(&text).unwrap();
        assert_eq!(loaded.width(), 6);
        assert_eq!(loaded.height(), 4);
        assert_eq!(loaded.statics.cells(), map.statics.cells());
        assert_eq!(loaded.dynamics.cells(), map.dynamics.cells());
        assert_eq!(loaded_options, options);
    }

    #[test]
    fn header_is_mandatory() {
        assert!(matches!(parse("sokoban 1;\n"), Err(LoadError::BadHeader)));
        assert!(matches!(parse(""), Err(LoadError::Truncated { .. })));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let text = "crateshift 1;\noptions;1;warpspeed\n";
        assert!(matches!(parse(text), Err(LoadError::UnknownOption { .. })));
    }

    #[test]
    fn grid_marker_without_record_is_rejected() {
        let text = "\
crateshift 1;
options;0
staticcells;3;1
? #
uniquecells;0
dynamiccells;1
@;1;0;0;0;1;0
keys;0
";
        assert!(matches!(
            parse(text),
            Err(LoadError::MissingRecord { x: 0, y: 0 })
        ));
    }

    #[test]
    fn out_of_bounds_positions_are_rejected() {
        let crate_off_grid = "\
crateshift 1;
options;0
staticcells;3;1
###
uniquecells;0
dynamiccells;2
%;7;0
@;1;0;0;0;1;0
keys;0
";
        assert!(matches!(
            parse(crate_off_grid),
            Err(LoadError::OutOfBounds { x: 7, y: 0, .. })
        ));

        let record_off_grid = "\
crateshift 1;
options;0
staticcells;3;1
?
uniquecells;1
+;9;0;1
dynamiccells;1
@;1;0;0;0;1;0
keys;0
";
        assert!(matches!(
            parse(record_off_grid),
            Err(LoadError::OutOfBounds { x: 9, y: 0, .. })
        ));

        let portal_dest_off_grid = "\
crateshift 1;
options;0
staticcells;4;1
?
uniquecells;1
0;0;0;10;0
dynamiccells;1
@;1;0;0;0;1;0
keys;0
";
        assert!(matches!(
            parse(portal_dest_off_grid),
            Err(LoadError::OutOfBounds { x: 10, y: 0, .. })
        ));
    }

    #[test]
    fn missing_player_is_rejected() {
        let text = "\
crateshift 1;
options;0
staticcells;2;1
##
uniquecells;0
dynamiccells;1
%;0;0
keys;0
";
        assert!(matches!(parse(text), Err(LoadError::NoPlayer)));
    }

    #[test]
    fn bad_number_names_the_line() {
        let text = "crateshift 1;\noptions;many\n";
        match parse(text) {
            Err(LoadError::BadNumber { line, value }) => {
                assert_eq!(line, 2);
                assert_eq!(value, "many");
            }
            other => panic!("expected BadNumber, got {:?}", other.err()),
        }
    }

    #[test]
    fn starter_level_is_playable() {
        let (map, options) = starter_level();
        assert_eq!(map.width(), 8);
        assert_eq!(map.height(), 5);
        assert!(options.is_empty());
        assert_eq!(map.player_pos(), Point::new(1, 1));
        assert_eq!(
            map.dynamics.cells().iter().filter(|c| c.kind.is_crate()).count(),
            1
        );
        // Every mechanic appears at least once
        let kinds: Vec<_> = map.statics.cells().iter().map(|c| &c.kind).collect();
        assert!(kinds.iter().any(|k| matches!(k, CellKind::Key { .. })));
        assert!(kinds.iter().any(|k| matches!(k, CellKind::Door { .. })));
        assert!(kinds.iter().any(|k| matches!(k, CellKind::Plate { .. })));
        assert!(kinds.iter().any(|k| matches!(k, CellKind::Portal { .. })));
        assert!(kinds.iter().any(|k| matches!(k, CellKind::Bomb)));
        assert!(kinds.iter().any(|k| matches!(k, CellKind::Cage)));
    }

    #[test]
    fn level_path_adds_the_extension() {
        let dir = Path::new("levels");
        assert_eq!(level_path(dir, "intro"), dir.join("intro.sok"));
        assert_eq!(level_path(dir, "intro.sok"), dir.join("intro.sok"));
    }
}
