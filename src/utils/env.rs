// src/utils/env.rs

use log::{debug, info, warn};

/// Loads `.env` from the working directory (or a parent) if present.
/// Variables already set in the process environment win.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment variables from {}", path.display()),
        Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No .env file found; using process environment")
        }
        Err(e) => warn!(
            "Could not load .env file: {}. Proceeding with system environment variables.",
            e
        ),
    }
}

/// Loads a specific env file, e.g. one passed on the command line.
pub fn load_env_from_file(file_path: &str) {
    info!("Attempting to load environment variables from: {}", file_path);
    if let Err(e) = dotenv::from_filename(file_path) {
        warn!(
            "Could not load env file '{}': {}. Proceeding with system environment variables.",
            file_path, e
        );
    }
}
