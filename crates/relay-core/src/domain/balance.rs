//! Balance ledger amounts.
//!
//! 金額は浮動小数点ではなく整数（paise）で保持します。
//! 0.16 ルピー/通 を f64 で足し続けると誤差が出るため。

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(u64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub const fn from_paise(paise: u64) -> Self {
        Self(paise)
    }

    pub fn as_paise(self) -> u64 {
        self.0
    }
}

impl Add for Credits {
    type Output = Credits;

    fn add(self, rhs: Credits) -> Credits {
        Credits(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_rupees() {
        assert_eq!(Credits::from_paise(16).to_string(), "₹0.16");
        assert_eq!(Credits::from_paise(1234).to_string(), "₹12.34");
        assert_eq!(Credits::ZERO.to_string(), "₹0.00");
    }

    #[test]
    fn sixteen_paise_credits_add_exactly() {
        let total = (0..25).fold(Credits::ZERO, |acc, _| acc + Credits::from_paise(16));
        assert_eq!(total, Credits::from_paise(400));
    }
}
