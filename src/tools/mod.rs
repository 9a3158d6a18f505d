pub mod add_to_list;
pub mod check_budget;
pub mod find_stores;
pub mod search_prices;
pub mod set_alert;

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use crate::actions::{ActionResult, ActionType, decode_params};
use crate::config::ToolsConfig;
use crate::error::BodegaError;
use crate::parser::ParsedAction;
use crate::store::Store;

pub use add_to_list::AddToListTool;
pub use check_budget::CheckBudgetTool;
pub use find_stores::FindStoresTool;
pub use search_prices::SearchPricesTool;
pub use set_alert::SetAlertTool;

/// Extension point for action implementations. One tool per `ActionType`.
///
/// Input problems are reported as `Ok` with `success: false`; `Err` is reserved
/// for store faults, which the registry turns into a failed result.
#[async_trait]
pub trait Tool: Send + Sync {
    fn action(&self) -> ActionType;

    fn description(&self) -> &str;

    async fn execute(
        &self,
        params: &serde_json::Value,
        user_id: &str,
    ) -> Result<ActionResult, BodegaError>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub action: ActionType,
    pub description: String,
}

/// Maps every `ActionType` to its tool. Built once; never mutated afterwards.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>, // Ordered as ActionType::ALL
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tool_count", &self.tools.len())
            .finish()
    }
}

impl ToolRegistry {
    /// The five standard tools over one store.
    pub fn new(store: Arc<dyn Store>, config: &ToolsConfig) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(AddToListTool::new(
                Arc::clone(&store),
                config.default_list_name.clone(),
            )),
            Arc::new(SetAlertTool::new(Arc::clone(&store))),
            Arc::new(CheckBudgetTool::new(
                Arc::clone(&store),
                config.budget_warning_ratio,
            )),
            Arc::new(SearchPricesTool::new(
                Arc::clone(&store),
                config.search_max_results,
                config.comparison_limit,
            )),
            Arc::new(FindStoresTool::new(store, config.store_max_results)),
        ];
        Self { tools }
    }

    /// Build from caller-supplied tools. Exactly one tool per `ActionType` is
    /// required; they are stored in enumeration order.
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Result<Self, BodegaError> {
        let mut ordered = Vec::with_capacity(ActionType::ALL.len());
        for action in ActionType::ALL {
            let mut matching = tools.iter().filter(|t| t.action() == action);
            match (matching.next(), matching.next()) {
                (Some(tool), None) => ordered.push(Arc::clone(tool)),
                (None, _) => {
                    return Err(BodegaError::ConfigValidation(format!(
                        "no tool registered for {action}"
                    )));
                }
                (Some(_), Some(_)) => {
                    return Err(BodegaError::ConfigValidation(format!(
                        "more than one tool registered for {action}"
                    )));
                }
            }
        }
        Ok(Self { tools: ordered })
    }

    fn find(&self, action: ActionType) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.action() == action)
    }

    /// Run one action for `user_id`. Never fails: unknown identifiers, tool
    /// errors and tool panics all come back as `success: false`.
    ///
    /// The returned `action` is always the identifier passed in.
    pub async fn execute_action(
        &self,
        action: &str,
        params: serde_json::Value,
        user_id: &str,
    ) -> ActionResult {
        let Some(tool) = action.parse::<ActionType>().ok().and_then(|a| self.find(a)) else {
            warn!(action, "unknown action");
            return ActionResult::failure(action, format!("Unknown action: {action}"));
        };

        debug!(action, user_id, "dispatching action");

        // Own task so a panicking tool surfaces as a JoinError instead of
        // unwinding through the caller.
        let tool = Arc::clone(tool);
        let owned_user = user_id.to_owned();
        let outcome = tokio::spawn(async move { tool.execute(&params, &owned_user).await }).await;

        match outcome {
            Ok(Ok(mut result)) => {
                result.action = action.to_owned();
                debug!(action, success = result.success, "action finished");
                result
            }
            Ok(Err(e)) => {
                warn!(action, error = %e, "action failed");
                ActionResult::failure(action, format!("Action failed: {e}"))
            }
            Err(e) => {
                error!(action, error = %e, "action task aborted");
                ActionResult::failure(action, format!("Action failed: {}", abort_reason(e)))
            }
        }
    }

    /// Run parsed directives one after another, in the order given.
    pub async fn execute_parsed(
        &self,
        parsed: &[ParsedAction],
        user_id: &str,
    ) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(parsed.len());
        for p in parsed {
            results.push(
                self.execute_action(p.action.as_str(), p.params.to_value(), user_id)
                    .await,
            );
        }
        results
    }

    /// Registered tools in registration order.
    pub fn list_available_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                action: t.action(),
                description: t.description().to_owned(),
            })
            .collect()
    }

    /// Prompt section teaching an assistant the directive syntax.
    pub fn directive_guide(&self) -> String {
        let mut guide = String::from(
            "You can act for the user by writing directives, one per line:\n\
             [ACTION:<TYPE>] <parameters>\n\n\
             Available actions:\n",
        );
        for tool in &self.tools {
            let _ = writeln!(
                guide,
                "- {}: {} Example: {}",
                tool.action(),
                tool.description(),
                directive_example(tool.action())
            );
        }
        guide
    }
}

fn directive_example(action: ActionType) -> &'static str {
    match action {
        ActionType::AddToList => "[ACTION:ADD_TO_LIST] Milk, 2",
        ActionType::SetAlert => "[ACTION:SET_ALERT] Eggs, $3.99",
        ActionType::CheckBudget => "[ACTION:CHECK_BUDGET] produce",
        ActionType::SearchPrices => "[ACTION:SEARCH_PRICES] oat milk",
        ActionType::FindStores => "[ACTION:FIND_STORES] Aldi",
    }
}

fn abort_reason(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "tool panicked".to_owned()),
        Err(_) => "tool was cancelled".to_owned(),
    }
}

/// Decode a tool's params, turning a bad shape into a user-facing failure.
fn decode<T: DeserializeOwned + Default>(
    action: ActionType,
    params: &serde_json::Value,
) -> Result<T, ActionResult> {
    decode_params(params).map_err(|e| {
        let reason = match e {
            BodegaError::InvalidParams(reason) => reason,
            other => other.to_string(),
        };
        ActionResult::failure(
            action.as_str(),
            format!("I couldn't read the {action} request: {reason}."),
        )
    })
}

/// Trimmed, non-empty optional text.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn money(amount: f64) -> String {
    format!("${:.2}", round2(amount))
}

/// Two decimal places; `+ 0.0` turns `-0.0` into `0.0`.
fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0 + 0.0
}

#[cfg(test)]
pub(crate) mod testing {
    //! A `Store` wrapper that fails selected operations.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use crate::error::BodegaError;
    use crate::store::models::*;
    use crate::store::{MemoryStore, Store};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Op {
        CreateList,
        DeleteList,
        AddListItem,
        TouchList,
        FindProduct,
        CreatePriceAlert,
        Receipts,
        SearchProducts,
        FindStores,
    }

    #[derive(Default)]
    pub struct FlakyStore {
        pub inner: MemoryStore,
        failing: Mutex<HashSet<Op>>,
        calls: Mutex<Vec<Op>>,
    }

    impl FlakyStore {
        pub fn failing(ops: &[Op]) -> Self {
            let store = Self::default();
            store.failing.lock().unwrap().extend(ops.iter().copied());
            store
        }

        pub fn calls(&self) -> Vec<Op> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self, op: Op) -> Result<(), BodegaError> {
            self.calls.lock().unwrap().push(op);
            if self.failing.lock().unwrap().contains(&op) {
                return Err(BodegaError::Store(format!("{op:?} unavailable")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn latest_list(&self, user_id: &str) -> Result<Option<ShoppingList>, BodegaError> {
            self.inner.latest_list(user_id).await
        }

        async fn get_list(
            &self,
            user_id: &str,
            list_id: Uuid,
        ) -> Result<Option<ShoppingList>, BodegaError> {
            self.inner.get_list(user_id, list_id).await
        }

        async fn create_list(&self, user_id: &str, name: &str) -> Result<ShoppingList, BodegaError> {
            self.check(Op::CreateList)?;
            self.inner.create_list(user_id, name).await
        }

        async fn delete_list(&self, list_id: Uuid) -> Result<(), BodegaError> {
            self.check(Op::DeleteList)?;
            self.inner.delete_list(list_id).await
        }

        async fn add_list_item(
            &self,
            list_id: Uuid,
            name: &str,
            quantity: i32,
        ) -> Result<ListItem, BodegaError> {
            self.check(Op::AddListItem)?;
            self.inner.add_list_item(list_id, name, quantity).await
        }

        async fn touch_list(&self, list_id: Uuid) -> Result<(), BodegaError> {
            self.check(Op::TouchList)?;
            self.inner.touch_list(list_id).await
        }

        async fn find_product(&self, name: &str) -> Result<Option<Product>, BodegaError> {
            self.check(Op::FindProduct)?;
            self.inner.find_product(name).await
        }

        async fn create_price_alert(&self, alert: NewPriceAlert) -> Result<PriceAlert, BodegaError> {
            self.check(Op::CreatePriceAlert)?;
            self.inner.create_price_alert(alert).await
        }

        async fn receipts_between(
            &self,
            user_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<Receipt>, BodegaError> {
            self.check(Op::Receipts)?;
            self.inner.receipts_between(user_id, from, to).await
        }

        async fn category_budgets(&self, user_id: &str) -> Result<Vec<CategoryBudget>, BodegaError> {
            self.inner.category_budgets(user_id).await
        }

        async fn monthly_budget(&self, user_id: &str) -> Result<Option<f64>, BodegaError> {
            self.inner.monthly_budget(user_id).await
        }

        async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BodegaError> {
            self.check(Op::SearchProducts)?;
            self.inner.search_products(query).await
        }

        async fn prices_for(&self, product_ids: &[Uuid]) -> Result<Vec<PriceListing>, BodegaError> {
            self.inner.prices_for(product_ids).await
        }

        async fn find_stores(&self, filter: &StoreFilter) -> Result<Vec<StoreLocation>, BodegaError> {
            self.check(Op::FindStores)?;
            self.inner.find_stores(filter).await
        }
    }
}
