//! 32-bit sequence numbers relative to an initial sequence number.
//!
//! The wire only carries 32 bits while a stream may exceed 4 GiB, so every
//! conversion back to an absolute 64-bit index needs a checkpoint: a recent
//! absolute index that the answer is known to lie close to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

const SPAN: u64 = 1 << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Wrap32(u32);

impl Wrap32 {
    pub const fn new(raw_value: u32) -> Self {
        Self(raw_value)
    }

    pub fn raw_value(self) -> u32 {
        self.0
    }

    /// Absolute sequence number `n` expressed relative to `zero_point`.
    pub fn wrap(n: u64, zero_point: Wrap32) -> Self {
        zero_point + n as u32
    }

    /// The absolute sequence number that wraps to `self` and is closest to
    /// `checkpoint`. An exact tie resolves to the smaller candidate.
    pub fn unwrap(self, zero_point: Wrap32, checkpoint: u64) -> u64 {
        let offset = u64::from(self.0.wrapping_sub(zero_point.0));
        let candidate = (checkpoint & !(SPAN - 1)) | offset;
        let distance = |n: u64| n.abs_diff(checkpoint);

        let mut best = candidate;
        if candidate >= SPAN && distance(candidate - SPAN) <= distance(best) {
            best = candidate - SPAN;
        }
        if let Some(above) = candidate.checked_add(SPAN)
            && distance(above) < distance(best)
        {
            best = above;
        }
        best
    }
}

impl Add<u32> for Wrap32 {
    type Output = Wrap32;

    fn add(self, rhs: u32) -> Self::Output {
        Wrap32(self.0.wrapping_add(rhs))
    }
}

impl fmt::Display for Wrap32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_adds_modulo() {
        assert_eq!(Wrap32::wrap(3 * SPAN, Wrap32::new(0)), Wrap32::new(0));
        assert_eq!(Wrap32::wrap(3 * SPAN + 17, Wrap32::new(15)), Wrap32::new(32));
        assert_eq!(Wrap32::wrap(7 * SPAN - 2, Wrap32::new(15)), Wrap32::new(13));
        assert_eq!(
            Wrap32::wrap(5, Wrap32::new(u32::MAX - 1)),
            Wrap32::new(3)
        );
    }

    #[test]
    fn unwrap_picks_nearest_block() {
        let isn = Wrap32::new(0);
        assert_eq!(Wrap32::new(1).unwrap(isn, 0), 1);
        // One step past a wrap with checkpoint just before it.
        assert_eq!(Wrap32::new(1).unwrap(isn, u64::from(u32::MAX)), SPAN + 1);
        assert_eq!(
            Wrap32::new(u32::MAX - 1).unwrap(isn, 3 * SPAN),
            3 * SPAN - 2
        );
        assert_eq!(Wrap32::new(u32::MAX).unwrap(isn, 0), u64::from(u32::MAX));
        assert_eq!(
            Wrap32::new(16).unwrap(Wrap32::new(16), 0),
            0
        );
        assert_eq!(
            Wrap32::new(15).unwrap(Wrap32::new(16), 0),
            u64::from(u32::MAX)
        );
        assert_eq!(
            Wrap32::new(0).unwrap(Wrap32::new(i32::MAX as u32), 0),
            u64::from(i32::MAX as u32) + 2
        );
    }

    #[test]
    fn unwrap_breaks_ties_downward() {
        let isn = Wrap32::new(0);
        // Both SPAN/2 and SPAN + SPAN/2 sit exactly SPAN/2 away from SPAN.
        assert_eq!(Wrap32::new(1 << 31).unwrap(isn, SPAN), SPAN / 2);
    }

    #[test]
    fn unwrap_near_top_of_range() {
        let isn = Wrap32::new(0);
        let checkpoint = u64::MAX - 10;
        let n = Wrap32::wrap(u64::MAX - 3, isn);
        assert_eq!(n.unwrap(isn, checkpoint), u64::MAX - 3);
    }

    #[test]
    fn round_trip_over_random_values() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let absolute = rng.random::<u64>() >> rng.random_range(0..64);
            let zero_point = Wrap32::new(rng.random());
            let wrapped = Wrap32::wrap(absolute, zero_point);
            assert_eq!(wrapped.unwrap(zero_point, absolute), absolute);
            // A nearby checkpoint lands on the same value.
            let checkpoint = absolute.saturating_add(rng.random_range(0..(1u64 << 30)));
            assert_eq!(wrapped.unwrap(zero_point, checkpoint), absolute);
        }
    }
}
