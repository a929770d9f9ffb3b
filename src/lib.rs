pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod exec;
pub mod global;
pub mod video;
