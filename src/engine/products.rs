use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{run_detached, Engine, EngineError};

fn validate_product(draft: NewProduct) -> Result<ProductData, EngineError> {
    if draft.name.trim().is_empty() {
        return Err(EngineError::InvalidInput("product name is required"));
    }
    if draft.name.len() > MAX_PRODUCT_NAME_LEN {
        return Err(EngineError::LimitExceeded("product name too long"));
    }
    if draft.price <= 0 {
        return Err(EngineError::InvalidInput("price must be greater than zero"));
    }
    if draft.price > MAX_PRICE {
        return Err(EngineError::LimitExceeded("price too large"));
    }
    if let Some(ref d) = draft.description
        && d.len() > MAX_DESCRIPTION_LEN
    {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    Ok(ProductData {
        name: draft.name,
        price: draft.price,
        description: draft.description,
    })
}

/// Exact, case-sensitive match. `exclude` lets a product keep its own name on update.
fn ensure_unique_name(all: &[Product], name: &str, exclude: Option<Ulid>) -> Result<(), EngineError> {
    if all.iter().any(|p| p.name == name && Some(p.id) != exclude) {
        return Err(EngineError::DuplicateName(name.to_string()));
    }
    Ok(())
}

impl Engine {
    pub async fn create_product(&self, draft: NewProduct) -> Result<Product, EngineError> {
        let data = validate_product(draft)?;
        let guard = self.lock_catalog().await;
        let store = self.stores.products.clone();
        let product = run_detached(guard, async move {
            let all = store.list_products().await?;
            ensure_unique_name(&all, &data.name, None)?;
            Ok(store.create_product(data).await?)
        })
        .await?;
        info!("created product {} {:?} at {}", product.id, product.name, product.price);
        Ok(product)
    }

    /// Replace a product's name, price and description. Appointments keep the
    /// copy they resolved; only later bookings see the change.
    pub async fn update_product(&self, id: Ulid, draft: NewProduct) -> Result<Product, EngineError> {
        let data = validate_product(draft)?;
        let guard = self.lock_catalog().await;
        let store = self.stores.products.clone();
        let product = run_detached(guard, async move {
            let existing = store.get_product(id).await?;
            let all = store.list_products().await?;
            ensure_unique_name(&all, &data.name, Some(existing.id))?;
            Ok(store.update_product(existing.id, data).await?)
        })
        .await?;
        info!("updated product {id} {:?} at {}", product.name, product.price);
        Ok(product)
    }

    pub async fn delete_product(&self, id: Ulid) -> Result<(), EngineError> {
        let guard = self.lock_catalog().await;
        let store = self.stores.products.clone();
        run_detached(guard, async move {
            store.get_product(id).await?;
            store.delete_product(id).await?;
            Ok(())
        })
        .await?;
        info!("deleted product {id}");
        Ok(())
    }

    pub async fn get_product(&self, id: Ulid) -> Result<Product, EngineError> {
        Ok(self.stores.products.get_product(id).await?)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, EngineError> {
        Ok(self.stores.products.list_products().await?)
    }
}
