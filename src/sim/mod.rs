pub mod game;
pub mod layer;
pub mod map;
pub mod save;
