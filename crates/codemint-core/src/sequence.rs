//! # Sequence Allocator
//!
//! Pure half of allocation: decides the next sequence of a pool and the
//! counters that must be written back. Persisting those counters under a write
//! lock is the job of `codemint-db`.
//!
//! ## Algorithm
//! ```text
//! allocate(pool)
//!      │
//!      ├── next_sequence != used_count + 1 ?  → CorruptCounters
//!      ├── used_count >= capacity ?           → CapacityExhausted
//!      ├── width = total - len(prefix) - 1
//!      ├── digits(next_sequence) > width ?    → SequenceOverflow
//!      │
//!      └── Allocation {
//!              padded_sequence: zero-pad(next_sequence, width),
//!              updated_pool:    used_count + 1, next_sequence + 1,
//!          }
//! ```

use crate::checksum::CheckDigit;
use crate::error::{IssuanceError, IssuanceResult};
use crate::types::{Allocation, CodePool};

/// Left-pads `sequence` with zeros to `width` digits.
///
/// ## Errors
/// `SequenceOverflow` when `sequence` needs more than `width` digits or is
/// not positive.
pub fn pad_sequence(pool_id: &str, sequence: i64, width: usize) -> IssuanceResult<String> {
    let overflow = || IssuanceError::SequenceOverflow {
        pool_id: pool_id.to_string(),
        sequence,
        width,
    };

    if sequence < 1 || width == 0 {
        return Err(overflow());
    }

    let digits = sequence.to_string();
    if digits.len() > width {
        return Err(overflow());
    }

    Ok(format!("{:0>width$}", digits, width = width))
}

/// Draws the next sequence from `pool`.
///
/// The returned `updated_pool` carries the advanced counters; the caller is
/// responsible for persisting them atomically with the issued code.
pub fn allocate(pool: &CodePool) -> IssuanceResult<Allocation> {
    if pool.next_sequence != pool.used_count + 1 {
        return Err(IssuanceError::CorruptCounters {
            pool_id: pool.id.clone(),
            used_count: pool.used_count,
            next_sequence: pool.next_sequence,
        });
    }

    if pool.is_exhausted() {
        return Err(IssuanceError::CapacityExhausted {
            pool_id: pool.id.clone(),
            capacity: pool.capacity,
            used_count: pool.used_count,
        });
    }

    let sequence = pool.next_sequence;
    let padded_sequence = pad_sequence(&pool.id, sequence, pool.sequence_width())?;

    let mut updated_pool = pool.clone();
    updated_pool.used_count += 1;
    updated_pool.next_sequence += 1;

    Ok(Allocation {
        sequence,
        padded_sequence,
        updated_pool,
    })
}

/// Builds `prefix + padded sequence + check digit`.
pub fn build_full_code(
    checksum: &dyn CheckDigit,
    prefix_digits: &str,
    padded_sequence: &str,
) -> IssuanceResult<String> {
    let mut code = String::with_capacity(prefix_digits.len() + padded_sequence.len() + 1);
    code.push_str(prefix_digits);
    code.push_str(padded_sequence);
    let check = checksum.check_digit(&code)?;
    code.push(check);
    Ok(code)
}

// =============================================================================
// Unit Tests
// =============================================================================
