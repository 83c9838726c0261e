//! Data contracts for multi-platform content generation: topics, generation
//! requests, job state, result normalization, the platform render registry
//! and the result store.

pub mod content;
pub mod events;
pub mod jobs;
pub mod platforms;
pub mod requests;
pub mod topics;
