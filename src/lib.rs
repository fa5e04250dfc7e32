// src/lib.rs
pub mod candidate_generation;
pub mod clustering;
pub mod error;
pub mod matching;
pub mod merging;
pub mod models;
pub mod storage;
pub mod utils;

pub use error::DedupeError;
pub use models::record::{Ascent, Record, RecordId};
