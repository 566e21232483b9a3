pub mod cli;
pub mod config;
pub mod core;
pub mod platform;
pub mod player;
