// src/utils/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;

/// Configuration for progress bars shown by long passes.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show per-partition sub-progress bars
    pub detailed: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
        }
    }
}

impl ProgressConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("PROGRESS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            detailed: env::var("PROGRESS_DETAILED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }

    /// Create a MultiProgress instance if progress is enabled, None otherwise
    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    /// Handle for per-partition bars: `multi_progress` itself when detailed
    /// progress is on, `None` otherwise.
    pub fn partition_progress(
        &self,
        multi_progress: Option<&MultiProgress>,
    ) -> Option<MultiProgress> {
        if self.should_show_detailed() {
            multi_progress.cloned()
        } else {
            None
        }
    }
}

/// Adds a bar to `multi_progress` with the shared pipeline style, or returns
/// `None` when progress is disabled.
pub fn add_bar(multi_progress: Option<&MultiProgress>, len: u64, message: &str) -> Option<ProgressBar> {
    multi_progress.map(|mp| {
        let pb = mp.add(ProgressBar::new(len));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.blue} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message(message.to_string());
        pb
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(config.detailed);
        assert!(config.should_show_detailed());
    }

    #[test]
    fn test_env_config() {
        env::set_var("PROGRESS_ENABLED", "false");
        env::set_var("PROGRESS_DETAILED", "true");

        let config = ProgressConfig::from_env();
        assert!(!config.enabled);
        assert!(!config.should_show_detailed());
        assert!(config.create_multi_progress().is_none());

        env::remove_var("PROGRESS_ENABLED");
        env::remove_var("PROGRESS_DETAILED");
    }

    #[test]
    fn test_partition_progress_follows_detailed_flag() {
        let mp = MultiProgress::new();
        let detailed = ProgressConfig::default();
        assert!(detailed.partition_progress(Some(&mp)).is_some());
        assert!(detailed.partition_progress(None).is_none());

        let summary_only = ProgressConfig {
            enabled: true,
            detailed: false,
        };
        assert!(summary_only.partition_progress(Some(&mp)).is_none());
    }

    #[test]
    fn test_add_bar_without_multi_progress() {
        assert!(add_bar(None, 10, "noop").is_none());
    }
}
