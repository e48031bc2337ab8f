pub mod api;
pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod global;
pub mod logs;
pub mod meeting;
pub mod protocol;
pub mod recording;
