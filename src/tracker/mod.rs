//! Work-hour tracking. Activity signals are classified per hour and accumulated
//! into buckets:
//!  - There is a directory with a json document per local day.
//!  - Each document holds the [buckets::WorkHourBucket] values for that day.
//!  - Summaries are pure computations over extracted buckets.

pub mod aggregator;
pub mod buckets;
pub mod classifier;
pub mod summary;
