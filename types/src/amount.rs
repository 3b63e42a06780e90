//! Monetary amounts in indivisible base units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Base units per whole OBL.
pub const COIN: u64 = 100_000_000;

/// A monetary amount in base units (1 OBL = 10^8 units).
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(pub u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_obol(whole: u64) -> Self {
        Self(whole * COIN)
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Self) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Self) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08} OBL", self.0 / COIN, self.0 % COIN)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_fraction() {
        assert_eq!(Amount(150_000_000).to_string(), "1.50000000 OBL");
        assert_eq!(Amount::from_obol(2500).to_string(), "2500.00000000 OBL");
    }

    #[test]
    fn arithmetic() {
        let a = Amount::from_obol(3) + Amount(1);
        assert_eq!(a.0, 3 * COIN + 1);
        assert_eq!(Amount(5).saturating_sub(Amount(9)), Amount::ZERO);
    }
}
