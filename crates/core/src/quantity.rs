//! Quantity and divisor value objects.
//!
//! Value objects have **no identity**: two divisors with the same factor are the
//! same divisor. They are immutable and cheap to copy.

use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Marker trait for value objects (compared by value, immutable).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Stock quantity for a (node, location).
///
/// Platforms report signed values (oversold stock can go negative), so the
/// reconciliation arithmetic is done in `i64`.
pub type Quantity = i64;

/// Integer factor relating a child's quantity to its master's quantity.
///
/// A child with divisor `d` holds `master / d` units (truncated). Invalid raw
/// values (absent, zero, negative) collapse to `1`, so a divisor can never
/// cause a division by zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Divisor(NonZeroU32);

impl Divisor {
    pub const ONE: Divisor = Divisor(NonZeroU32::MIN);

    /// Build a divisor from a loosely-typed platform value.
    pub fn from_raw(raw: Option<i64>) -> Self {
        raw.and_then(|v| u32::try_from(v).ok())
            .and_then(NonZeroU32::new)
            .map(Self)
            .unwrap_or(Self::ONE)
    }

    pub fn new(factor: u32) -> Self {
        Self::from_raw(Some(i64::from(factor)))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn is_one(self) -> bool {
        self.get() == 1
    }

    /// Quantity a child should hold for a given master quantity.
    ///
    /// Truncates toward zero (`floor` for non-negative operands).
    pub fn child_quantity(self, master: Quantity) -> Quantity {
        if self.is_one() {
            master
        } else {
            master / Quantity::from(self.get())
        }
    }

    /// Master-side delta caused by a child-side delta.
    pub fn scale_delta(self, child_delta: Quantity) -> Quantity {
        child_delta.saturating_mul(Quantity::from(self.get()))
    }
}

impl Default for Divisor {
    fn default() -> Self {
        Self::ONE
    }
}

impl core::fmt::Display for Divisor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl ValueObject for Divisor {}
