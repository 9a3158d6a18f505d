use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::{Tool, clean, decode, money};
use crate::actions::{ActionResult, ActionType, SearchPricesParams};
use crate::error::BodegaError;
use crate::store::Store;
use crate::store::models::{PriceListing, Product, ProductQuery};

const ACTION: ActionType = ActionType::SearchPrices;

/// Two-stage price lookup: match products by text, then compare their prices
/// across stores, cheapest effective price first.
pub struct SearchPricesTool {
    store: Arc<dyn Store>,
    max_results: usize,
    comparison_limit: usize,
}

struct ProductPrices {
    product: Product,
    listings: Vec<PriceListing>, // Ascending by effective price
}

impl ProductPrices {
    fn best(&self) -> Option<&PriceListing> {
        self.listings.first()
    }
}

fn listing_json(listing: &PriceListing) -> serde_json::Value {
    json!({
        "storeId": listing.store_id,
        "storeName": listing.store_name,
        "retailer": listing.retailer,
        "price": listing.price,
        "salePrice": listing.sale_price,
        "effectivePrice": listing.effective_price(),
    })
}

/// Group listings under their products, cheapest first within each product,
/// and order products by their best price (unpriced products last).
fn rank(products: Vec<Product>, listings: Vec<PriceListing>) -> Vec<ProductPrices> {
    let mut by_product: HashMap<Uuid, Vec<PriceListing>> = HashMap::new();
    for listing in listings {
        by_product.entry(listing.product_id).or_default().push(listing);
    }

    let mut ranked: Vec<ProductPrices> = products
        .into_iter()
        .map(|product| {
            let mut listings = by_product.remove(&product.id).unwrap_or_default();
            listings.sort_by(|a, b| a.effective_price().total_cmp(&b.effective_price()));
            ProductPrices { product, listings }
        })
        .collect();

    ranked.sort_by(|a, b| match (a.best(), b.best()) {
        (Some(x), Some(y)) => x.effective_price().total_cmp(&y.effective_price()),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked
}

impl SearchPricesTool {
    pub fn new(store: Arc<dyn Store>, max_results: usize, comparison_limit: usize) -> Self {
        Self {
            store,
            max_results,
            comparison_limit,
        }
    }
}

#[async_trait]
impl Tool for SearchPricesTool {
    fn action(&self) -> ActionType {
        ACTION
    }

    fn description(&self) -> &str {
        "Compare prices for a product across stores. Parameters: what to search for."
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        _user_id: &str,
    ) -> Result<ActionResult, BodegaError> {
        let params: SearchPricesParams = match decode(ACTION, params) {
            Ok(p) => p,
            Err(rejected) => return Ok(rejected),
        };

        let query = params.query.trim().to_owned();
        if query.is_empty() {
            return Ok(ActionResult::failure(
                ACTION.as_str(),
                "Please tell me what you'd like me to search for.",
            ));
        }

        let products = self
            .store
            .search_products(&ProductQuery {
                text: query.clone(),
                category: clean(params.category),
                limit: params
                    .max_results
                    .filter(|n| *n > 0)
                    .unwrap_or(self.max_results),
            })
            .await?;

        if products.is_empty() {
            return Ok(ActionResult::ok(
                ACTION,
                format!("I couldn't find any products matching \"{query}\"."),
                json!({ "query": query, "results": [] }),
            ));
        }

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let listings = self.store.prices_for(&ids).await?;
        let ranked = rank(products, listings);

        let mut lines = Vec::with_capacity(ranked.len());
        for entry in &ranked {
            lines.push(match entry.best() {
                Some(best) => format!(
                    "- {}: {} at {}{}",
                    entry.product.name,
                    money(best.effective_price()),
                    best.store_name,
                    if best.sale_price.is_some() { " (on sale)" } else { "" }
                ),
                None => format!("- {}: no prices yet", entry.product.name),
            });
        }

        let header = match ranked.first().and_then(|e| e.best().map(|b| (e, b))) {
            Some((entry, best)) => format!(
                "Found {} product(s) matching \"{query}\". Best deal: {} for {} at {}.",
                ranked.len(),
                entry.product.name,
                money(best.effective_price()),
                best.store_name
            ),
            None => format!(
                "Found {} product(s) matching \"{query}\", but no store prices yet.",
                ranked.len()
            ),
        };

        let results: Vec<_> = ranked
            .iter()
            .map(|entry| {
                json!({
                    "productId": entry.product.id,
                    "name": entry.product.name,
                    "brand": entry.product.brand,
                    "category": entry.product.category,
                    "bestPrice": entry.best().map(listing_json),
                    "comparisons": entry
                        .listings
                        .iter()
                        .skip(1)
                        .take(self.comparison_limit)
                        .map(listing_json)
                        .collect::<Vec<_>>(),
                    "storeCount": entry.listings.len(),
                })
            })
            .collect();

        Ok(ActionResult::ok(
            ACTION,
            format!("{header}\n{}", lines.join("\n")),
            json!({ "query": query, "results": results }),
        ))
    }
}
