pub mod animation;
pub mod api;
pub mod config;
pub mod garage;
pub mod race;
pub mod shell;
pub mod terminal;
pub mod wheel;
pub mod winners;

#[cfg(test)]
mod testing;
