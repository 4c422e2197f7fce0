pub mod game;
pub mod shared;
pub use game::Game;
pub use shared::*;
