//! Size gate module.
//!
//! Post-encode check that the output earned its keep: the new file must be
//! no larger than `max_size_ratio` of the original.

/// Result of the size gate check.
#[derive(Debug, Clone, PartialEq)]
pub enum SizeGateResult {
    /// Output size is acceptable.
    Accept,
    /// Output size exceeds the threshold.
    Reject {
        original_bytes: u64,
        output_bytes: u64,
        ratio: f64,
    },
}

/// Check if the output file size passes the size gate.
///
/// Accepts when `output_bytes <= original_bytes * max_ratio`; exact equality
/// passes. Returns `Reject` with both sizes and the actual ratio otherwise.
pub fn check_size_gate(original_bytes: u64, output_bytes: u64, max_ratio: f64) -> SizeGateResult {
    let max_allowed = original_bytes as f64 * max_ratio;

    if output_bytes as f64 <= max_allowed {
        SizeGateResult::Accept
    } else {
        let actual_ratio = if original_bytes > 0 {
            output_bytes as f64 / original_bytes as f64
        } else {
            f64::INFINITY
        };
        SizeGateResult::Reject {
            original_bytes,
            output_bytes,
            ratio: actual_ratio,
        }
    }
}
