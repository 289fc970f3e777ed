/// Toggleable game rules.

use std::collections::HashSet;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GameOption {
    /// Unsupported crates fall one row per tick.
    Gravity,
    /// The level is lost when the player's move budget runs out.
    MoveLimit,
    /// No-clip cheat: the player walks through walls.
    Iddqd,
}

pub type OptionSet = HashSet<GameOption>;

impl GameOption {
    /// Parse an option name as typed on the command line. Case-insensitive;
    /// unknown names are rejected.
    pub fn from_name(name: &str) -> Option<GameOption> {
        match name.to_ascii_lowercase().as_str() {
            "gravity" => Some(GameOption::Gravity),
            "movelimit" => Some(GameOption::MoveLimit),
            "iddqd" => Some(GameOption::Iddqd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GameOption::Gravity => "Gravity",
            GameOption::MoveLimit => "MoveLimit",
            GameOption::Iddqd => "Iddqd",
        }
    }
}
