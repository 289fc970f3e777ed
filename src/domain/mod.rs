pub mod cell;
pub mod options;
pub mod point;
