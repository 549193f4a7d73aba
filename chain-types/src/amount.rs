//! Amounts: unsigned 64-bit atoms, never floating point. Arithmetic that
//! could overflow widens to `u128` and is bounds-checked against
//! [`MAX_SUPPLY`] before narrowing back.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::Canonical;
use crate::error::CodecError;

/// Total issuance ceiling, in atoms. No sum of amounts may exceed this.
pub const MAX_SUPPLY: u64 = 21_000_000 * 100_000_000;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AmountError {
    #[error("amount {0} exceeds MAX_SUPPLY ({MAX_SUPPLY})")]
    ExceedsMaxSupply(u128),
    #[error("arithmetic overflow computing an amount")]
    Overflow,
}

/// Marker for an [`Amount`] that is never allowed to be negative. There is
/// only one marker in this node because every amount in this data model
/// — outputs, fees, subsidies — is inherently unsigned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NonNegative;

/// An amount of atoms, bounds-checked against [`MAX_SUPPLY`] on
/// construction and on every arithmetic operation.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Amount<S = NonNegative>(u64, #[serde(skip)] PhantomData<S>);

impl<S> Amount<S> {
    pub fn zero() -> Self {
        Amount(0, PhantomData)
    }

    pub fn new(atoms: u64) -> Result<Self, AmountError> {
        if atoms as u128 > MAX_SUPPLY as u128 {
            return Err(AmountError::ExceedsMaxSupply(atoms as u128));
        }
        Ok(Amount(atoms, PhantomData))
    }

    pub fn atoms(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, AmountError> {
        let sum = self.0 as u128 + rhs.0 as u128;
        if sum > MAX_SUPPLY as u128 {
            return Err(AmountError::ExceedsMaxSupply(sum));
        }
        Ok(Amount(sum as u64, PhantomData))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, AmountError> {
        self.0
            .checked_sub(rhs.0)
            .map(|v| Amount(v, PhantomData))
            .ok_or(AmountError::Overflow)
    }
}

impl<S> fmt::Debug for Amount<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl<S> fmt::Display for Amount<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S> Canonical for Amount<S> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out)
    }
    fn decode(buf: &mut &[u8]) -> Result<Self, CodecError> {
        let atoms = u64::decode(buf)?;
        Amount::new(atoms).map_err(|_| CodecError::OutOfRange)
    }
}

/// Sum a slice of amounts, checking for overflow and the supply ceiling
/// at every step rather than only at the end.
pub fn sum_amounts<S>(amounts: impl IntoIterator<Item = Amount<S>>) -> Result<Amount<S>, AmountError> {
    let mut total = Amount::zero();
    for amount in amounts {
        total = total.checked_add(amount)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_amount_over_max_supply() {
        assert!(Amount::<NonNegative>::new(MAX_SUPPLY + 1).is_err());
        assert!(Amount::<NonNegative>::new(MAX_SUPPLY).is_ok());
    }

    #[test]
    fn checked_add_rejects_overflow_of_supply() {
        let a = Amount::<NonNegative>::new(MAX_SUPPLY).unwrap();
        let one = Amount::<NonNegative>::new(1).unwrap();
        assert!(a.checked_add(one).is_err());
    }

    #[test]
    fn sum_amounts_matches_manual_total() {
        let amounts = vec![
            Amount::<NonNegative>::new(10).unwrap(),
            Amount::<NonNegative>::new(20).unwrap(),
            Amount::<NonNegative>::new(30).unwrap(),
        ];
        assert_eq!(sum_amounts(amounts).unwrap().atoms(), 60);
    }
}
