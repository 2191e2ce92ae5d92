pub mod collab;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod host;
pub mod io;
pub mod paths;
pub mod recipe;
pub mod registry;
pub mod run;
pub mod ssh;
pub mod task;

#[cfg(test)]
mod testing;

pub use engine::Engine;
pub use error::{Result, RolloutError};
