//! # Tax Arithmetic Module
//!
//! IVA splits and retail price rounding for Chilean pesos.
//!
//! ## Why Integer Pesos?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    15990 / 1.19 = 13436.974789915966...                                 │
//! │    round(net) + round(net * 0.19) = 13437 + 2553 = 15990?  SOMETIMES.  │
//! │                                                                         │
//! │  Rounding net and IVA independently produces off-by-one totals that    │
//! │  the tax authority rejects. A rejected folio cannot be un-issued.      │
//! │                                                                         │
//! │  OUR SOLUTION: anchor one side, derive the other as the residual       │
//! │    net = round_half_up(gross / 1.19)                                   │
//! │    iva = gross - net          ← NEVER rounded independently            │
//! │    net + iva + exempt == total, exactly, always                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The Chilean peso has no subunit, so every amount in the system is an
//! `i64` count of whole pesos. Rounding is "round half up", applied exactly
//! once per computed field.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Constants
// =============================================================================

/// IVA rate in basis points (1900 = 19%).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000. Integer basis points keep every tax
/// computation in integer arithmetic.
pub const IVA_RATE_BPS: i64 = 1900;

/// Denominator for gross → net conversion: 10000 + IVA_RATE_BPS.
/// gross = net * (1 + 19%) = net * 11900 / 10000.
const GROSS_BPS: i64 = 10000 + IVA_RATE_BPS;

/// Retail prices are rounded up to the next multiple of 50 pesos.
const PRICE_STEP: i64 = 50;

// =============================================================================
// Tax Breakdown
// =============================================================================

/// The net / IVA / exempt / total split of a document.
///
/// ## Invariant
/// `net + iva + exempt == total`, exactly. Construction is only possible
/// through [`TaxBreakdown::from_gross`], [`TaxBreakdown::from_net`] and
/// [`TaxBreakdown::with_exempt`], all of which derive one side as the
/// residual of the other, so the invariant holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    /// Net (taxable) amount in pesos.
    pub net: i64,
    /// IVA amount in pesos. Always the residual, never independently rounded.
    pub iva: i64,
    /// Tax-exempt amount in pesos.
    pub exempt: i64,
    /// Document total in pesos.
    pub total: i64,
}

impl TaxBreakdown {
    /// Splits a tax-inclusive (gross) amount into net + IVA.
    ///
    /// `net = round_half_up(gross / 1.19)`, `iva = gross - net`.
    ///
    /// ## Example
    /// ```rust
    /// use timbre_core::tax::TaxBreakdown;
    ///
    /// let b = TaxBreakdown::from_gross(119).unwrap();
    /// assert_eq!((b.net, b.iva, b.total), (100, 19, 119));
    ///
    /// // IVA is the residual: 100/1.19 = 84.03 → net 84, iva 16 (not 15.97 rounded)
    /// let b = TaxBreakdown::from_gross(100).unwrap();
    /// assert_eq!((b.net, b.iva, b.total), (84, 16, 100));
    /// ```
    pub fn from_gross(gross: i64) -> CoreResult<Self> {
        if gross < 0 {
            return Err(CoreError::NegativeAmount { amount: gross });
        }
        let net = div_round_half_up(gross * 10000, GROSS_BPS);
        Ok(TaxBreakdown {
            net,
            iva: gross - net,
            exempt: 0,
            total: gross,
        })
    }

    /// Builds the split from a net amount: `iva = round_half_up(net * 19%)`.
    pub fn from_net(net: i64) -> CoreResult<Self> {
        if net < 0 {
            return Err(CoreError::NegativeAmount { amount: net });
        }
        let iva = div_round_half_up(net * IVA_RATE_BPS, 10000);
        Ok(TaxBreakdown {
            net,
            iva,
            exempt: 0,
            total: net + iva,
        })
    }

    /// Splits a gross taxable amount and adds an exempt line sum on top.
    ///
    /// Used for documents mixing taxable and exempt items (e.g. a pharmacy
    /// sale containing an exempt magistral preparation).
    pub fn with_exempt(gross_taxable: i64, exempt: i64) -> CoreResult<Self> {
        if exempt < 0 {
            return Err(CoreError::NegativeAmount { amount: exempt });
        }
        let base = Self::from_gross(gross_taxable)?;
        Ok(TaxBreakdown {
            net: base.net,
            iva: base.iva,
            exempt,
            total: base.total + exempt,
        })
    }

    /// Checks the reconciliation invariant. Always true for values built
    /// through the constructors; used as a belt in tests and at the
    /// deserialization boundary.
    pub fn reconciles(&self) -> bool {
        self.net + self.iva + self.exempt == self.total
    }
}

// =============================================================================
// Price Recommendation
// =============================================================================

/// Suggests a retail price from a cost and a margin percentage.
///
/// ## Arguments
/// * `cost` - acquisition cost in pesos
/// * `tax_inclusive` - whether `cost` already includes IVA; when `false`
///   the cost is grossed up first so the recommended price is always a
///   tax-inclusive shelf price
/// * `margin_percent` - margin applied over the (grossed-up) cost
///
/// The raw result is rounded **up** to the next multiple of 50 pesos
/// ([`smart_round`]) — the retail psychological-pricing rule. Shares the
/// integer rounding discipline of the tax math but is otherwise independent
/// of it.
///
/// ## Example
/// ```rust
/// use timbre_core::tax::recommended_price;
///
/// // 700 (IVA included) + 40% margin = 980 → next multiple of 50 = 1000
/// assert_eq!(recommended_price(700, true, 40).unwrap(), 1000);
/// ```
pub fn recommended_price(cost: i64, tax_inclusive: bool, margin_percent: i64) -> CoreResult<i64> {
    if cost < 0 {
        return Err(CoreError::NegativeAmount { amount: cost });
    }
    if margin_percent < 0 {
        return Err(CoreError::InvalidMargin {
            margin: margin_percent,
        });
    }

    // Shelf prices include IVA; gross up a net cost before applying margin.
    let gross_cost = if tax_inclusive {
        cost
    } else {
        div_round_half_up(cost * GROSS_BPS, 10000)
    };

    let raw = div_round_half_up(gross_cost * (100 + margin_percent), 100);
    Ok(smart_round(raw))
}

/// Rounds a price UP to the nearest multiple of 50 pesos.
///
/// ```rust
/// use timbre_core::tax::smart_round;
///
/// assert_eq!(smart_round(1001), 1050);
/// assert_eq!(smart_round(1050), 1050);
/// assert_eq!(smart_round(1051), 1100);
/// ```
pub fn smart_round(amount: i64) -> i64 {
    if amount <= 0 {
        return 0;
    }
    ((amount + PRICE_STEP - 1) / PRICE_STEP) * PRICE_STEP
}

// =============================================================================
// Rounding Primitive
// =============================================================================

/// Integer division with "round half up" semantics for non-negative input.
///
/// Uses i128 internally so document-sized amounts can never overflow.
fn div_round_half_up(numerator: i64, denominator: i64) -> i64 {
    debug_assert!(denominator > 0);
    let n = numerator as i128;
    let d = denominator as i128;
    ((2 * n + d) / (2 * d)) as i64
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_gross_reference_vectors() {
        let b = TaxBreakdown::from_gross(119).unwrap();
        assert_eq!((b.net, b.iva, b.exempt, b.total), (100, 19, 0, 119));

        // IVA is the residual, not independently rounded
        let b = TaxBreakdown::from_gross(100).unwrap();
        assert_eq!((b.net, b.iva, b.total), (84, 16, 100));

        // Typical pharmacy ticket
        let b = TaxBreakdown::from_gross(15990).unwrap();
        assert_eq!((b.net, b.iva, b.total), (13437, 2553, 15990));
    }

    #[test]
    fn test_from_gross_always_reconciles() {
        // The invariant must hold for every amount, not just nice ones
        for gross in 0..5000 {
            let b = TaxBreakdown::from_gross(gross).unwrap();
            assert!(b.reconciles(), "gross={gross} does not reconcile");
            assert!(b.iva >= 0, "gross={gross} produced negative IVA");
        }
    }

    #[test]
    fn test_from_net() {
        let b = TaxBreakdown::from_net(100).unwrap();
        assert_eq!((b.net, b.iva, b.total), (100, 19, 119));

        // 84 * 0.19 = 15.96 → 16
        let b = TaxBreakdown::from_net(84).unwrap();
        assert_eq!((b.net, b.iva, b.total), (84, 16, 100));
        assert!(b.reconciles());
    }

    #[test]
    fn test_with_exempt() {
        let b = TaxBreakdown::with_exempt(119, 500).unwrap();
        assert_eq!((b.net, b.iva, b.exempt, b.total), (100, 19, 500, 619));
        assert!(b.reconciles());
    }

    #[test]
    fn test_negative_amounts_rejected() {
        assert!(TaxBreakdown::from_gross(-1).is_err());
        assert!(TaxBreakdown::from_net(-1).is_err());
        assert!(TaxBreakdown::with_exempt(100, -1).is_err());
    }

    #[test]
    fn test_smart_round() {
        assert_eq!(smart_round(1001), 1050);
        assert_eq!(smart_round(1050), 1050);
        assert_eq!(smart_round(1051), 1100);
        assert_eq!(smart_round(1), 50);
        assert_eq!(smart_round(0), 0);
    }

    #[test]
    fn test_recommended_price_tax_inclusive() {
        // 700 * 1.40 = 980 → rounds up to 1000
        assert_eq!(recommended_price(700, true, 40).unwrap(), 1000);
    }

    #[test]
    fn test_recommended_price_grosses_up_net_cost() {
        // 700 net → 833 gross; 833 * 1.40 = 1166.2 → 1166 → 1200
        assert_eq!(recommended_price(700, false, 40).unwrap(), 1200);
    }

    #[test]
    fn test_recommended_price_rejects_bad_input() {
        assert!(recommended_price(-1, true, 40).is_err());
        assert!(recommended_price(700, true, -5).is_err());
    }

    #[test]
    fn test_round_half_up_boundary() {
        // 100.5 rounds up, 100.49 rounds down
        assert_eq!(div_round_half_up(201, 2), 101);
        assert_eq!(div_round_half_up(200, 2), 100);
        assert_eq!(div_round_half_up(1004, 10), 100);
        assert_eq!(div_round_half_up(1005, 10), 101);
    }
}
