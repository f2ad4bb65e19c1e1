// Slide layout engine: pattern selection, grid placement, validation, refinement, variety.
// CPU-bound refinement must run inside tokio::task::spawn_blocking.

pub mod balance;
pub mod engine;
pub mod grid;
pub mod handlers;
pub mod pattern;
pub mod positions;
pub mod prompts;
pub mod proposal;
pub mod refinement;
pub mod strategy;
pub mod validator;
pub mod variety;

// Re-export the public API consumed by startup and app state.
pub use engine::LayoutEngine;
pub use strategy::{HeuristicStrategyProvider, LlmStrategyProvider, StrategyProvider};
