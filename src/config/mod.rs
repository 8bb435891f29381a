// src/config/mod.rs
pub mod settings;
pub mod watchlist;

pub use settings::Settings;
pub use watchlist::WatchlistConfig;
