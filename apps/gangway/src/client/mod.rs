pub mod input;
pub mod terminal;
pub mod transcript;
pub mod tui;
