// src/utils/dedupe_config.rs
use std::env;
use std::time::Duration;

use log::{info, warn};

use crate::candidate_generation::candidate_generation::{
    CandidateFilter, DEFAULT_PLACEHOLDER_PATTERNS,
};
use crate::error::DedupeError;
use crate::matching::similarity::Algorithm;
use crate::models::requests::{BatchDuplicateParams, SingleTargetParams};

/// Process-level defaults for both dedupe paths, read from the environment.
#[derive(Debug, Clone)]
pub struct DedupeConfig {
    pub batch: BatchDuplicateParams,
    pub single_target: SingleTargetParams,
    pub placeholder_patterns: Vec<String>,
    pub pass_deadline: Option<Duration>,
    pub parallel_partitions: bool,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            batch: BatchDuplicateParams::default(),
            single_target: SingleTargetParams::default(),
            placeholder_patterns: DEFAULT_PLACEHOLDER_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            pass_deadline: None,
            parallel_partitions: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable value '{}' for {}", raw, key);
                default
            }
        },
        Err(_) => default,
    }
}

impl DedupeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let batch = BatchDuplicateParams {
            area_slug: None,
            min_similarity: env_parse("DEDUPE_MIN_SIMILARITY", defaults.batch.min_similarity),
            grade_tolerance: env_parse("DEDUPE_GRADE_TOLERANCE", defaults.batch.grade_tolerance),
            algorithm: env::var("DEDUPE_ALGORITHM")
                .map(Algorithm::from)
                .unwrap_or(defaults.batch.algorithm),
            group_by_site: env_parse("DEDUPE_GROUP_BY_SITE", defaults.batch.group_by_site),
        };

        let single_target = SingleTargetParams {
            min_similarity: env_parse("MATCH_MIN_SIMILARITY", defaults.single_target.min_similarity),
            grade_tolerance: env_parse(
                "MATCH_GRADE_TOLERANCE",
                defaults.single_target.grade_tolerance,
            ),
            algorithm: env::var("MATCH_ALGORITHM")
                .map(Algorithm::from)
                .unwrap_or(defaults.single_target.algorithm),
            max_results: env_parse("MATCH_MAX_RESULTS", defaults.single_target.max_results),
        };

        let placeholder_patterns = match env::var("DEDUPE_PLACEHOLDER_PATTERNS") {
            Ok(raw) => raw
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            Err(_) => defaults.placeholder_patterns,
        };

        let pass_deadline = env::var("DEDUPE_PASS_DEADLINE_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            batch,
            single_target,
            placeholder_patterns,
            pass_deadline,
            parallel_partitions: env_parse("DEDUPE_PARALLEL_PARTITIONS", true),
        }
    }

    /// Candidate filter for a pass scoped to `area_slug`.
    pub fn candidate_filter(&self, area_slug: Option<String>) -> Result<CandidateFilter, DedupeError> {
        CandidateFilter::new(area_slug, &self.placeholder_patterns[..])
    }

    pub fn log_config(&self) {
        info!("🔍 Duplicate detection configuration");
        info!(
            "   Batch pass: min_similarity={}, grade_tolerance={}, algorithm={}, group_by_site={}",
            self.batch.min_similarity,
            self.batch.grade_tolerance,
            self.batch.algorithm,
            self.batch.group_by_site
        );
        info!(
            "   Single target: min_similarity={}, grade_tolerance={}, algorithm={}, max_results={}",
            self.single_target.min_similarity,
            self.single_target.grade_tolerance,
            self.single_target.algorithm,
            self.single_target.max_results
        );
        info!("   Placeholder patterns: {:?}", self.placeholder_patterns);
        match self.pass_deadline {
            Some(deadline) => info!("   Pass deadline: {}s", deadline.as_secs()),
            None => info!("   Pass deadline: none"),
        }
        info!(
            "   Partition workers: {}",
            if self.parallel_partitions {
                "parallel"
            } else {
                "sequential"
            }
        );
        if self.placeholder_patterns.is_empty() {
            warn!("   No placeholder patterns configured; unnamed routes may be clustered");
        }
    }
}
