pub mod config;
pub mod webhook;

pub use config::*;
pub use webhook::*;
