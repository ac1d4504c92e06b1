//! Fee estimates and replacement bumps.

use chainpilot_core::Wei;
use chainpilot_rpc_client::TransactionRequest;

/// Fee parameters for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeEstimate {
    /// Base fee plus tip.
    Eip1559 {
        /// Fee cap
        max_fee_per_gas: Wei,
        /// Tip
        max_priority_fee_per_gas: Wei,
    },
    /// Single gas price.
    Legacy {
        /// Gas price
        gas_price: Wei,
    },
}

/// Fee pair for a block with `base_fee`.
///
/// The tip is never below the network floor; the cap leaves room for the base
/// fee to grow by half before inclusion.
#[must_use]
pub fn compute_eip1559(base_fee: Wei, observed_priority_fee: Wei, floor: Wei) -> FeeEstimate {
    let priority = observed_priority_fee.max(floor);
    let max_fee = base_fee.saturating_mul(3) / 2 + priority;
    FeeEstimate::Eip1559 {
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: priority,
    }
}

fn bump(value: Wei) -> Wei {
    value.saturating_add((value / 8).max(1))
}

impl FeeEstimate {
    /// Highest price per gas the transaction may pay.
    #[must_use]
    pub const fn max_price_per_gas(&self) -> Wei {
        match self {
            Self::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
            Self::Legacy { gas_price } => *gas_price,
        }
    }

    /// Writes the fee fields into `tx`, clearing those of the other model.
    pub fn apply(&self, tx: &mut TransactionRequest) {
        match *self {
            Self::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                tx.max_fee_per_gas = Some(max_fee_per_gas);
                tx.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
                tx.gas_price = None;
            }
            Self::Legacy { gas_price } => {
                tx.gas_price = Some(gas_price);
                tx.max_fee_per_gas = None;
                tx.max_priority_fee_per_gas = None;
            }
        }
    }

    /// Raises every component by at least 12.5%, the minimum nodes accept for
    /// a same-nonce replacement.
    #[must_use]
    pub fn bumped(&self) -> Self {
        match *self {
            Self::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => Self::Eip1559 {
                max_fee_per_gas: bump(max_fee_per_gas),
                max_priority_fee_per_gas: bump(max_priority_fee_per_gas),
            },
            Self::Legacy { gas_price } => Self::Legacy {
                gas_price: bump(gas_price),
            },
        }
    }

    /// Component-wise maximum with a fresh estimate of the same model.
    #[must_use]
    pub fn at_least(&self, fresh: &Self) -> Self {
        match (*self, *fresh) {
            (
                Self::Eip1559 {
                    max_fee_per_gas: a_max,
                    max_priority_fee_per_gas: a_tip,
                },
                Self::Eip1559 {
                    max_fee_per_gas: b_max,
                    max_priority_fee_per_gas: b_tip,
                },
            ) => Self::Eip1559 {
                max_fee_per_gas: a_max.max(b_max),
                max_priority_fee_per_gas: a_tip.max(b_tip),
            },
            (Self::Legacy { gas_price: a }, Self::Legacy { gas_price: b }) => {
                Self::Legacy { gas_price: a.max(b) }
            }
            (current, _) => current,
        }
    }
}
