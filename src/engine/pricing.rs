use crate::model::{Amount, Product};

/// Sum of product prices in minor units. Exact, so product order never matters.
pub fn total_price(products: &[Product]) -> Amount {
    products.iter().map(|p| p.price).sum()
}
