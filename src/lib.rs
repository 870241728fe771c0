//! Terminal client for a self-hosted bilibili video library.

pub mod api;
pub mod app;
pub mod config;
pub mod covers;
pub mod player;
pub mod render;
pub mod tui;
