pub mod board;
pub mod mg;
pub mod repr;

mod index;
