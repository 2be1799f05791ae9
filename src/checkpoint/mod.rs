//! Durable per-job progress tracking.
//!
//! Each job records the creation timestamp of the last asset it finished
//! processing. The next run resumes from that point, so a crash or a failed
//! request only replays the records after the last advanced checkpoint.
//! All jobs in a process share a single `last_created.json` file.

pub(crate) mod error;
pub(crate) mod store;

pub(crate) use error::CheckpointError;
pub(crate) use store::{CheckpointStore, JsonCheckpointStore};
