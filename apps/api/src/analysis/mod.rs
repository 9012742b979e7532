//! Résumé analysis: one generic pipeline, instantiated per task kind.

pub mod extract;
pub mod fingerprint;
pub mod handlers;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod schema;
pub mod single_flight;

#[cfg(test)]
pub mod testing;
