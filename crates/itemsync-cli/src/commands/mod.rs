pub mod config;
pub mod items;
pub mod shell;
