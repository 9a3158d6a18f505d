use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{Tool, clean, decode};
use crate::actions::{ActionResult, ActionType, FindStoresParams};
use crate::error::BodegaError;
use crate::store::Store;
use crate::store::models::{StoreFilter, StoreLocation};

const ACTION: ActionType = ActionType::FindStores;

/// Store locator. Every filter is optional; no matches is still a success.
pub struct FindStoresTool {
    store: Arc<dyn Store>,
    max_results: usize,
}

impl FindStoresTool {
    pub fn new(store: Arc<dyn Store>, max_results: usize) -> Self {
        Self { store, max_results }
    }
}

fn describe(filter: &StoreFilter) -> String {
    let mut text = String::new();
    if let Some(retailer) = &filter.retailer {
        text.push_str(&format!(" for {retailer}"));
    }
    if let Some(city) = &filter.city {
        text.push_str(&format!(" in {city}"));
    }
    if let Some(zip) = &filter.zip {
        text.push_str(&format!(" near {zip}"));
    }
    text
}

fn store_line(store: &StoreLocation) -> String {
    let location: Vec<&str> = [
        store.address.as_deref(),
        store.city.as_deref(),
        store.zip.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();

    if location.is_empty() {
        format!("- {} ({})", store.name, store.retailer)
    } else {
        format!("- {} ({}), {}", store.name, store.retailer, location.join(", "))
    }
}

#[async_trait]
impl Tool for FindStoresTool {
    fn action(&self) -> ActionType {
        ACTION
    }

    fn description(&self) -> &str {
        "Find nearby stores. Parameters: optional retailer name."
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        _user_id: &str,
    ) -> Result<ActionResult, BodegaError> {
        let params: FindStoresParams = match decode(ACTION, params) {
            Ok(p) => p,
            Err(rejected) => return Ok(rejected),
        };

        let filter = StoreFilter {
            retailer: clean(params.retailer),
            city: clean(params.city),
            zip: clean(params.zip),
            limit: params
                .max_results
                .filter(|n| *n > 0)
                .unwrap_or(self.max_results),
        };
        let stores = self.store.find_stores(&filter).await?;

        let message = if stores.is_empty() {
            format!("I couldn't find any stores{}.", describe(&filter))
        } else {
            let lines: Vec<String> = stores.iter().map(store_line).collect();
            format!(
                "Found {} store(s){}:\n{}",
                stores.len(),
                describe(&filter),
                lines.join("\n")
            )
        };

        Ok(ActionResult::ok(
            ACTION,
            message,
            json!({ "count": stores.len(), "stores": stores }),
        ))
    }
}
