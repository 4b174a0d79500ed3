//! Demand accounting for backpressure
//!
//! A `Demand` is a saturating non-negative count of values a downstream is
//! willing to accept, with an `unlimited` sentinel. All backpressure in the
//! runtime is expressed by adding and subtracting demands.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// How many additional values a downstream may receive
///
/// Demands add and subtract with saturation: finite overflow saturates to
/// `UNLIMITED`, subtraction clamps at zero, and `UNLIMITED` absorbs both
/// addition and subtraction. `Demand::NONE` is a valid value but must never
/// be passed to [`request`](crate::Subscription::request).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Demand(usize);

impl Demand {
    /// No demand
    pub const NONE: Demand = Demand(0);

    /// Unlimited demand — the downstream accepts every value
    pub const UNLIMITED: Demand = Demand(usize::MAX);

    /// Demand for at most `count` additional values
    ///
    /// `usize::MAX` is the unlimited sentinel, so a count of `usize::MAX`
    /// is indistinguishable from `UNLIMITED`.
    pub const fn max(count: usize) -> Demand {
        Demand(count)
    }

    /// True if this demand is the unlimited sentinel
    pub const fn is_unlimited(&self) -> bool {
        self.0 == usize::MAX
    }

    /// True if no values may be delivered against this demand
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// The finite count, or `None` for unlimited
    pub const fn value(&self) -> Option<usize> {
        if self.is_unlimited() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        // Saturation lands exactly on the sentinel, which also gives
        // `unlimited + x = unlimited` for free.
        Demand(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        *self = *self + rhs;
    }
}

impl Sub for Demand {
    type Output = Demand;

    fn sub(self, rhs: Demand) -> Demand {
        if self.is_unlimited() {
            // unlimited − x = unlimited, including x = unlimited
            Demand::UNLIMITED
        } else if rhs.is_unlimited() {
            // finite − unlimited clamps to zero
            Demand::NONE
        } else {
            Demand(self.0.saturating_sub(rhs.0))
        }
    }
}

impl SubAssign for Demand {
    fn sub_assign(&mut self, rhs: Demand) {
        *self = *self - rhs;
    }
}

impl Mul<usize> for Demand {
    type Output = Demand;

    fn mul(self, rhs: usize) -> Demand {
        if self.is_unlimited() {
            Demand::UNLIMITED
        } else {
            Demand(self.0.saturating_mul(rhs))
        }
    }
}

impl fmt::Debug for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            write!(f, "Demand::UNLIMITED")
        } else {
            write!(f, "Demand::max({})", self.0)
        }
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            write!(f, "unlimited")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addition_is_commutative_and_associative() {
        let a = Demand::max(3);
        let b = Demand::max(7);
        let c = Demand::max(11);
        assert_eq!(a + b, b + a);
        assert_eq!((a + b) + c, a + (b + c));
    }

    #[test]
    fn test_unlimited_absorbs_addition() {
        assert_eq!(Demand::UNLIMITED + Demand::max(5), Demand::UNLIMITED);
        assert_eq!(Demand::max(5) + Demand::UNLIMITED, Demand::UNLIMITED);
        assert_eq!(Demand::UNLIMITED + Demand::UNLIMITED, Demand::UNLIMITED);
    }

    #[test]
    fn test_unlimited_absorbs_subtraction() {
        assert_eq!(Demand::UNLIMITED - Demand::max(5), Demand::UNLIMITED);
        assert_eq!(Demand::UNLIMITED - Demand::UNLIMITED, Demand::UNLIMITED);
    }

    #[test]
    fn test_finite_minus_unlimited_is_zero() {
        assert_eq!(Demand::max(5) - Demand::UNLIMITED, Demand::NONE);
        assert_eq!(Demand::NONE - Demand::UNLIMITED, Demand::NONE);
    }

    #[test]
    fn test_subtraction_clamps_at_zero() {
        assert_eq!(Demand::max(3) - Demand::max(10), Demand::NONE);
        assert_eq!(Demand::max(3) - Demand::max(3), Demand::NONE);
    }

    #[test]
    fn test_finite_overflow_saturates_to_unlimited() {
        let nearly = Demand::max(usize::MAX - 1);
        assert_eq!(nearly + Demand::max(10), Demand::UNLIMITED);
        assert_eq!(Demand::max(usize::MAX / 2) * 3, Demand::UNLIMITED);
    }

    #[test]
    fn test_multiplication() {
        assert_eq!(Demand::max(4) * 3, Demand::max(12));
        assert_eq!(Demand::max(4) * 0, Demand::NONE);
        assert_eq!(Demand::UNLIMITED * 0, Demand::UNLIMITED);
    }

    #[test]
    fn test_ordering() {
        assert!(Demand::NONE < Demand::max(1));
        assert!(Demand::max(1) < Demand::UNLIMITED);
        assert!(Demand::UNLIMITED <= Demand::UNLIMITED);
    }

    #[test]
    fn test_value_accessor() {
        assert_eq!(Demand::max(9).value(), Some(9));
        assert_eq!(Demand::UNLIMITED.value(), None);
    }
}
