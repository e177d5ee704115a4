//! Stability gate for files that may still be copying.
//!
//! Before encoding, the source size is sampled twice across a fixed wait;
//! a change means the file is still being written and the job is skipped
//! until a later scan.

use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Result of a stability check on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityResult {
    /// File size remained unchanged across the wait window.
    Stable,
    /// File size changed across the wait window.
    Unstable {
        /// Size at the first sample.
        initial_size: u64,
        /// Size at the second sample.
        current_size: u64,
    },
}

/// Check if a file is stable by sampling its size before and after a wait.
pub async fn check_stability(path: &Path, wait_secs: u64) -> Result<StabilityResult, std::io::Error> {
    let initial_size = tokio::fs::metadata(path).await?.len();

    sleep(Duration::from_secs(wait_secs)).await;

    let current_size = tokio::fs::metadata(path).await?.len();

    Ok(compare_sizes(initial_size, current_size))
}

/// Compare two size samples and return the corresponding StabilityResult.
#[inline]
pub fn compare_sizes(initial_size: u64, current_size: u64) -> StabilityResult {
    if initial_size == current_size {
        StabilityResult::Stable
    } else {
        StabilityResult::Unstable {
            initial_size,
            current_size,
        }
    }
}
