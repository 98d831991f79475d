pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod parser;
pub mod schedule;
pub mod store;
pub mod web;

pub use engine::Engine;
pub use error::{MatchError, Result};
