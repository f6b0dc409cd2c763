//! Invoice totals.

use serde::{Deserialize, Serialize};

use crate::models::{LineItem, LineItemInput};

/// Anything that carries a quantity and a unit price.
pub trait Priced {
    fn quantity(&self) -> f64;
    fn price(&self) -> f64;
}

impl Priced for LineItem {
    fn quantity(&self) -> f64 {
        self.quantity
    }

    fn price(&self) -> f64 {
        self.price
    }
}

/// Blank fields count as zero so partially filled forms can be previewed.
impl Priced for LineItemInput {
    fn quantity(&self) -> f64 {
        self.quantity.unwrap_or(0.0)
    }

    fn price(&self) -> f64 {
        self.price.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
}

/// `subtotal = Σ quantity * price`, `tax = subtotal * rate / 100`,
/// `total = subtotal + tax`. No rounding is applied.
pub fn calculate_totals<P: Priced>(items: &[P], tax_rate: f64) -> Totals {
    let subtotal = items
        .iter()
        .fold(0.0, |acc, i| acc + i.quantity() * i.price());
    let tax_amount = subtotal * tax_rate / 100.0;
    Totals {
        subtotal,
        tax_amount,
        total: subtotal + tax_amount,
    }
}
