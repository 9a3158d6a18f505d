use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{Tool, decode, money};
use crate::actions::{ActionResult, ActionType, SetAlertParams};
use crate::error::BodegaError;
use crate::store::Store;
use crate::store::models::NewPriceAlert;

const ACTION: ActionType = ActionType::SetAlert;

/// Creates a price-drop alert. The product lookup is best effort: an alert for a
/// product not in the catalogue is still stored, with no product reference.
pub struct SetAlertTool {
    store: Arc<dyn Store>,
}

impl SetAlertTool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetAlertTool {
    fn action(&self) -> ActionType {
        ACTION
    }

    fn description(&self) -> &str {
        "Alert the user when a product drops to a target price. Parameters: product name, then target price."
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        user_id: &str,
    ) -> Result<ActionResult, BodegaError> {
        let params: SetAlertParams = match decode(ACTION, params) {
            Ok(p) => p,
            Err(rejected) => return Ok(rejected),
        };

        let product = params.product.trim();
        if product.is_empty() {
            return Ok(ActionResult::failure(
                ACTION.as_str(),
                "Please tell me which product to watch.",
            ));
        }

        let target_price = params.target_price.unwrap_or(0.0);
        if !target_price.is_finite() || target_price <= 0.0 {
            return Ok(ActionResult::failure(
                ACTION.as_str(),
                "Please give a target price above $0.00.",
            ));
        }

        let matched = match self.store.find_product(product).await {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "product lookup failed, storing alert without a match");
                None
            }
        };

        let alert = NewPriceAlert {
            user_id: user_id.to_owned(),
            product_id: matched.as_ref().map(|p| p.id),
            product_name: matched
                .as_ref()
                .map_or_else(|| product.to_owned(), |p| p.name.clone()),
            target_price,
        };

        let alert = match self.store.create_price_alert(alert).await {
            Ok(alert) => alert,
            Err(e) => {
                warn!(error = %e, "creating price alert failed");
                return Ok(ActionResult::failure(
                    ACTION.as_str(),
                    "I couldn't set that price alert. Please try again.",
                ));
            }
        };

        let message = match &matched {
            Some(p) => format!(
                "Price alert set! I'll let you know when {} drops to {} or less.",
                p.name,
                money(target_price)
            ),
            None => format!(
                "Price alert set for {product} at {}. It will activate when the product is added to our catalog.",
                money(target_price)
            ),
        };

        Ok(ActionResult::ok(
            ACTION,
            message,
            json!({
                "alertId": alert.id,
                "productId": alert.product_id,
                "productName": alert.product_name,
                "targetPrice": alert.target_price,
                "matched": matched.is_some(),
            }),
        ))
    }
}
