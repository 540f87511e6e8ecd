//! Agent and cli for tracking local development activity. The agent watches git
//! repositories for new commits and uncommitted changes, classifies the activity
//! into work/overtime hours, and the cli renders summaries from the collected
//! buckets.
//!

pub mod agent;
pub mod cli;
pub mod tracker;
pub mod utils;
