//! Stock Research Agent
//!
//! A conversational agent that answers natural-language questions about
//! public companies:
//! - Classifies user intent (research vs. comparison) via LLM
//! - Resolves ticker symbols, including follow-ups from session context
//! - Gathers quote, ratios, ratings, and news data concurrently
//! - Synthesizes an LLM narrative over the gathered data
//! - Carries conversational context across turns in a session store
//!
//! TURN PIPELINE:
//! CLASSIFY → RESOLVE → ROUTE → GATHER → SYNTHESIZE → COMMIT SESSION

pub mod agent;
pub mod aggregator;
pub mod api;
pub mod classifier;
pub mod error;
pub mod gemini;
pub mod models;
pub mod providers;
pub mod resolver;
pub mod session;
pub mod synthesizer;

pub use error::Result;

// Re-export common types
pub use agent::ResearchOrchestrator;
pub use models::*;
