//! Bitmask construction helpers for cron fields.
//!
//! A field mask is a `u64` in which bit *i* set means "value *i* is
//! permitted". All helpers here are pure functions over bit positions;
//! the offset conventions for day and month live in the parser.

/// Mask with every bit in `min..=max` set, stepping by `step`.
pub(crate) fn range_bits(min: u32, max: u32, step: u32) -> u64 {
    debug_assert!(min <= max && max < 64 && step > 0);
    if step == 1 {
        // contiguous run: (all bits through max) minus (all bits below min)
        let upper = if max + 1 == 64 {
            u64::MAX
        } else {
            (1u64 << (max + 1)) - 1
        };
        let lower = (1u64 << min) - 1;
        return upper & !lower;
    }

    let mut mask = 0u64;
    let mut i = min;
    while i <= max {
        mask |= 1 << i;
        i += step;
    }
    mask
}

/// Mask with exactly the given bit positions set.
pub(crate) fn value_bits(values: &[u32]) -> u64 {
    values.iter().fold(0u64, |mask, &v| {
        debug_assert!(v < 64);
        mask | (1 << v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_range() {
        assert_eq!(range_bits(0, 5, 1), 0b111111);
        assert_eq!(range_bits(2, 4, 1), 0b11100);
        assert_eq!(range_bits(0, 59, 1), (1u64 << 60) - 1);
        assert_eq!(range_bits(0, 63, 1), u64::MAX);
    }

    #[test]
    fn stepped_range() {
        assert_eq!(range_bits(0, 10, 5), 0b100_0010_0001);
        assert_eq!(range_bits(1, 7, 3), (1 << 1) | (1 << 4) | (1 << 7));
        // step larger than the span only sets the low end
        assert_eq!(range_bits(3, 5, 10), 1 << 3);
    }

    #[test]
    fn explicit_values() {
        assert_eq!(value_bits(&[0]), 1);
        assert_eq!(value_bits(&[0, 10, 20]), 1 | (1 << 10) | (1 << 20));
        assert_eq!(value_bits(&[]), 0);
    }
}
