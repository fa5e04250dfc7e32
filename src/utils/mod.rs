// src/utils/mod.rs
pub mod db_connect;
pub mod dedupe_config;
pub mod env;
pub mod progress_config;
