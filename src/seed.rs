use tracing::info;

use crate::engine::{Engine, EngineError};
use crate::model::{Amount, NewProduct};

/// Default barbershop service catalog, prices in minor units.
pub const DEFAULT_CATALOG: &[(&str, Amount, &str)] = &[
    ("Haircut", 15_000, "Classic scissor and clipper cut"),
    ("Haircut + Beard", 25_000, "Full haircut plus beard trim"),
    ("Classic shave", 18_000, "Straight razor shave with hot towel"),
    ("Hair wash", 8_000, "Wash and scalp massage with premium products"),
    ("Special styling", 12_000, "Event styling with setting products"),
    ("Hair treatment", 30_000, "Nourishing and repairing treatment"),
    ("Kids haircut", 12_000, "Haircut for children"),
    ("Beard design", 20_000, "Artistic beard shaping and outlining"),
];

/// Create every default product whose name is not taken yet. Returns how many were created.
pub async fn seed_catalog(engine: &Engine) -> Result<usize, EngineError> {
    let mut created = 0;
    for &(name, price, description) in DEFAULT_CATALOG {
        let draft = NewProduct {
            name: name.to_string(),
            price,
            description: Some(description.to_string()),
        };
        match engine.create_product(draft).await {
            Ok(product) => {
                created += 1;
                info!("seeded product {name} ({})", product.id);
            }
            Err(EngineError::DuplicateName(_)) => info!("product already exists: {name}"),
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}
