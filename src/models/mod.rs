pub mod record;
pub mod requests;
pub mod stats_models;
