//! Line items shared by invoices and recurring templates.
//!
//! Items travel in two shapes. [`LineItemInput`] is what a client sends and
//! tolerates blanks so totals can be previewed while a form is half filled.
//! [`LineItems`] is the validated, non-empty list that is allowed to reach
//! storage, where it is kept as a JSON array in a TEXT column.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use thiserror::Error;

/// A line item as submitted; any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItemInput {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
}

/// A complete line item: `quantity > 0`, `price >= 0`, both finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    pub quantity: f64,
    pub price: f64,
}

impl LineItem {
    pub fn amount(&self) -> f64 {
        self.quantity * self.price
    }

    fn check(&self, index: usize) -> Result<(), LineItemError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(LineItemError::InvalidQuantity {
                index,
                value: self.quantity,
            });
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(LineItemError::InvalidPrice {
                index,
                value: self.price,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LineItemError {
    #[error("At least one item is required")]
    Empty,

    #[error("Item {index} is missing a quantity")]
    MissingQuantity { index: usize },

    #[error("Item {index} is missing a price")]
    MissingPrice { index: usize },

    #[error("Item {index} has an invalid quantity {value}; it must be greater than 0")]
    InvalidQuantity { index: usize, value: f64 },

    #[error("Item {index} has an invalid price {value}; it must be 0 or more")]
    InvalidPrice { index: usize, value: f64 },

    #[error("Malformed line items: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Validated, non-empty, ordered list of line items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LineItems(Vec<LineItem>);

impl LineItems {
    pub fn new(items: Vec<LineItem>) -> Result<Self, LineItemError> {
        if items.is_empty() {
            return Err(LineItemError::Empty);
        }
        for (index, item) in items.iter().enumerate() {
            item.check(index + 1)?;
        }
        Ok(Self(items))
    }

    /// Reject incomplete input before anything is persisted.
    pub fn from_inputs(inputs: &[LineItemInput]) -> Result<Self, LineItemError> {
        let items = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let index = i + 1;
                Ok(LineItem {
                    description: input.description.clone().unwrap_or_default(),
                    quantity: input
                        .quantity
                        .ok_or(LineItemError::MissingQuantity { index })?,
                    price: input.price.ok_or(LineItemError::MissingPrice { index })?,
                })
            })
            .collect::<Result<Vec<_>, LineItemError>>()?;

        Self::new(items)
    }

    /// Decode the stored JSON column. Missing fields or bad values are errors,
    /// never an empty list.
    pub fn from_stored(raw: &str) -> Result<Self, LineItemError> {
        let items: Vec<LineItem> = serde_json::from_str(raw)?;
        Self::new(items)
    }

    pub fn to_stored(&self) -> Result<String, LineItemError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn as_slice(&self) -> &[LineItem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<LineItem> {
        self.0
    }
}

impl LineItemError {
    /// Caller supplied bad items.
    pub fn into_bad_request(self) -> AppError {
        AppError::BadRequest(anyhow::anyhow!(self.to_string()))
    }

    /// A stored row could not be decoded.
    pub fn into_corrupt_row(self, table: &str, id: impl std::fmt::Display) -> AppError {
        AppError::DatabaseError(anyhow::anyhow!(
            "Stored items for {} {} are invalid: {}",
            table,
            id,
            self
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(quantity: Option<f64>, price: Option<f64>) -> LineItemInput {
        LineItemInput {
            description: Some("Design work".to_string()),
            quantity,
            price,
        }
    }

    #[test]
    fn rejects_missing_price_and_quantity() {
        let err = LineItems::from_inputs(&[input(Some(1.0), Some(10.0)), input(Some(2.0), None)])
            .unwrap_err();
        assert!(matches!(err, LineItemError::MissingPrice { index: 2 }));

        let err = LineItems::from_inputs(&[input(None, Some(10.0))]).unwrap_err();
        assert!(matches!(err, LineItemError::MissingQuantity { index: 1 }));
    }

    #[test]
    fn rejects_empty_and_out_of_range_values() {
        assert!(matches!(
            LineItems::from_inputs(&[]).unwrap_err(),
            LineItemError::Empty
        ));
        assert!(matches!(
            LineItems::from_inputs(&[input(Some(0.0), Some(10.0))]).unwrap_err(),
            LineItemError::InvalidQuantity { .. }
        ));
        assert!(matches!(
            LineItems::from_inputs(&[input(Some(1.0), Some(-1.0))]).unwrap_err(),
            LineItemError::InvalidPrice { .. }
        ));
        assert!(matches!(
            LineItems::from_inputs(&[input(Some(f64::NAN), Some(1.0))]).unwrap_err(),
            LineItemError::InvalidQuantity { .. }
        ));
    }

    #[test]
    fn zero_price_is_allowed() {
        let items = LineItems::from_inputs(&[input(Some(3.0), Some(0.0))]).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn stored_form_keeps_every_field() {
        let items = LineItems::from_inputs(&[
            input(Some(2.0), Some(50.0)),
            LineItemInput {
                description: None,
                quantity: Some(0.5),
                price: Some(19.99),
            },
        ])
        .unwrap();

        let raw = items.to_stored().unwrap();
        let decoded = LineItems::from_stored(&raw).unwrap();
        assert_eq!(decoded, items);
        assert_eq!(decoded.as_slice()[1].description, "");
    }

    #[test]
    fn corrupt_stored_items_are_rejected_loudly() {
        assert!(matches!(
            LineItems::from_stored("not json").unwrap_err(),
            LineItemError::Malformed(_)
        ));
        assert!(matches!(
            LineItems::from_stored(r#"[{"description":"x","quantity":1}]"#).unwrap_err(),
            LineItemError::Malformed(_)
        ));
        assert!(matches!(
            LineItems::from_stored("[]").unwrap_err(),
            LineItemError::Empty
        ));
        assert!(matches!(
            LineItems::from_stored("null").unwrap_err(),
            LineItemError::Malformed(_)
        ));
    }
}
