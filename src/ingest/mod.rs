//! Reading ingest
//!
//! Turns raw transport payloads into validated [`crate::data::Reading`]s. The
//! transport itself (HTTP today) lives in [`crate::api`].

pub mod normalize;

pub use normalize::{parse_timestamp, ReadingValidator, RejectionReason};
