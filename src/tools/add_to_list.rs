use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::{Tool, clean, decode};
use crate::actions::{ActionResult, ActionType, AddToListParams};
use crate::error::BodegaError;
use crate::store::Store;

const ACTION: ActionType = ActionType::AddToList;

/// Adds an item to one of the user's shopping lists.
///
/// Target list: `listId` if given, else the most recently updated list, else a
/// fresh list named `listName` (or the configured default). A list created here
/// is removed again if the item insert fails, so a failed call leaves no trace.
pub struct AddToListTool {
    store: Arc<dyn Store>,
    default_list_name: String,
}

impl AddToListTool {
    pub fn new(store: Arc<dyn Store>, default_list_name: String) -> Self {
        Self {
            store,
            default_list_name,
        }
    }
}

#[async_trait]
impl Tool for AddToListTool {
    fn action(&self) -> ActionType {
        ACTION
    }

    fn description(&self) -> &str {
        "Add an item to the user's shopping list. Parameters: item name, then an optional quantity."
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        user_id: &str,
    ) -> Result<ActionResult, BodegaError> {
        let params: AddToListParams = match decode(ACTION, params) {
            Ok(p) => p,
            Err(rejected) => return Ok(rejected),
        };

        let item = params.item.trim();
        if item.is_empty() {
            return Ok(ActionResult::failure(
                ACTION.as_str(),
                "Please tell me which item to add to your list.",
            ));
        }

        let quantity = match i32::try_from(params.quantity.unwrap_or(1)) {
            Ok(q) if q >= 1 => q,
            _ => {
                return Ok(ActionResult::failure(
                    ACTION.as_str(),
                    "The quantity needs to be a whole number of at least 1.",
                ));
            }
        };

        let (list, created) = match params.list_id {
            Some(list_id) => match self.store.get_list(user_id, list_id).await? {
                Some(list) => (list, false),
                None => {
                    return Ok(ActionResult::failure(
                        ACTION.as_str(),
                        "I couldn't find that shopping list.",
                    ));
                }
            },
            None => match self.store.latest_list(user_id).await? {
                Some(list) => (list, false),
                None => {
                    let name = clean(params.list_name)
                        .unwrap_or_else(|| self.default_list_name.clone());
                    match self.store.create_list(user_id, &name).await {
                        Ok(list) => (list, true),
                        Err(e) => {
                            warn!(error = %e, "creating shopping list failed");
                            return Ok(ActionResult::failure(
                                ACTION.as_str(),
                                "I couldn't create a shopping list for you. Please try again.",
                            ));
                        }
                    }
                }
            },
        };

        let row = match self.store.add_list_item(list.id, item, quantity).await {
            Ok(row) => row,
            Err(e) => {
                warn!(list_id = %list.id, error = %e, "adding list item failed");
                if created && let Err(cleanup) = self.store.delete_list(list.id).await {
                    warn!(list_id = %list.id, error = %cleanup, "removing new empty list failed");
                }
                return Ok(ActionResult::failure(
                    ACTION.as_str(),
                    format!("I couldn't add {item} to your list. Please try again."),
                ));
            }
        };

        if let Err(e) = self.store.touch_list(list.id).await {
            warn!(list_id = %list.id, error = %e, "updating list timestamp failed");
        }

        let mut message = if quantity == 1 {
            format!("Added {item} to your \"{}\" list.", list.name)
        } else {
            format!("Added {quantity} × {item} to your \"{}\" list.", list.name)
        };
        if created {
            message.push_str(" I started a new list for you.");
        }

        Ok(ActionResult::ok(
            ACTION,
            message,
            json!({
                "listId": list.id,
                "listName": list.name,
                "itemId": row.id,
                "item": row.name,
                "quantity": row.quantity,
                "createdList": created,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{FlakyStore, Op};
    use crate::store::MemoryStore;

    fn tool(store: Arc<dyn Store>) -> AddToListTool {
        AddToListTool::new(store, "Shopping List".to_owned())
    }

    #[tokio::test]
    async fn creates_default_list_when_user_has_none() {
        let store = Arc::new(MemoryStore::new());
        let result = tool(store.clone())
            .execute(&json!({"item": "Milk", "quantity": 2}), "u1")
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.message, "Added 2 × Milk to your \"Shopping List\" list. I started a new list for you.");
        let lists = store.lists("u1").unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Shopping List");
        let items = store.list_items(lists[0].id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Milk");
        assert_eq!(items[0].quantity, 2);

        let data = result.data.unwrap();
        assert_eq!(data["createdList"], json!(true));
        assert_eq!(data["quantity"], json!(2));
    }

    #[tokio::test]
    async fn new_list_takes_requested_name() {
        let store = Arc::new(MemoryStore::new());
        tool(store.clone())
            .execute(&json!({"item": "Chips", "listName": " Party "}), "u1")
            .await
            .unwrap();
        assert_eq!(store.lists("u1").unwrap()[0].name, "Party");
    }

    #[tokio::test]
    async fn reuses_most_recent_list() {
        let store = Arc::new(MemoryStore::new());
        let existing = store.create_list("u1", "Weekly").await.unwrap();

        let result = tool(store.clone())
            .execute(&json!({"item": "Bread"}), "u1")
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.message, "Added Bread to your \"Weekly\" list.");
        assert_eq!(store.lists("u1").unwrap().len(), 1);
        assert_eq!(store.list_items(existing.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn explicit_list_must_belong_to_user() {
        let store = Arc::new(MemoryStore::new());
        let theirs = store.create_list("u2", "Theirs").await.unwrap();

        let result = tool(store.clone())
            .execute(&json!({"item": "Bread", "listId": theirs.id}), "u1")
            .await
            .unwrap();

        assert!(!result.success);
        assert!(store.list_items(theirs.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_missing_item_before_store_calls() {
        let store = Arc::new(FlakyStore::default());
        let result = tool(store.clone())
            .execute(&json!({"item": "   "}), "u1")
            .await
            .unwrap();
        assert!(!result.success);
        assert!(!result.message.is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_quantity() {
        let store = Arc::new(MemoryStore::new());
        for quantity in [json!(0), json!(-2), json!(5_000_000_000_i64)] {
            let result = tool(store.clone())
                .execute(&json!({"item": "Milk", "quantity": quantity.clone()}), "u1")
                .await
                .unwrap();
            assert!(!result.success, "{quantity}");
        }
        let result = tool(store.clone())
            .execute(&json!({"item": "Milk", "quantity": "two"}), "u1")
            .await
            .unwrap();
        assert!(!result.success);
        assert!(store.lists("u1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_insert_removes_list_it_created() {
        let store = Arc::new(FlakyStore::failing(&[Op::AddListItem]));
        let result = tool(store.clone())
            .execute(&json!({"item": "Milk"}), "u1")
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.message, "I couldn't add Milk to your list. Please try again.");
        assert!(store.inner.lists("u1").unwrap().is_empty());
        assert_eq!(
            store.calls(),
            vec![Op::CreateList, Op::AddListItem, Op::DeleteList]
        );
    }

    #[tokio::test]
    async fn failed_insert_keeps_existing_list() {
        let store = Arc::new(FlakyStore::failing(&[Op::AddListItem]));
        store.inner.create_list("u1", "Weekly").await.unwrap();

        let result = tool(store.clone())
            .execute(&json!({"item": "Milk"}), "u1")
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(store.inner.lists("u1").unwrap().len(), 1);
        assert!(!store.calls().contains(&Op::DeleteList));
    }

    #[tokio::test]
    async fn failed_list_creation_reported() {
        let store = Arc::new(FlakyStore::failing(&[Op::CreateList]));
        let result = tool(store.clone())
            .execute(&json!({"item": "Milk"}), "u1")
            .await
            .unwrap();
        assert!(!result.success);
        assert!(!store.calls().contains(&Op::AddListItem));
    }

    #[tokio::test]
    async fn touch_failure_does_not_undo_insert() {
        let store = Arc::new(FlakyStore::failing(&[Op::TouchList]));
        let result = tool(store.clone())
            .execute(&json!({"item": "Milk"}), "u1")
            .await
            .unwrap();
        assert!(result.success);
        let list = store.inner.lists("u1").unwrap().remove(0);
        assert_eq!(store.inner.list_items(list.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_calls_duplicate_items() {
        let store = Arc::new(MemoryStore::new());
        let add = tool(store.clone());
        add.execute(&json!({"item": "Milk"}), "u1").await.unwrap();
        add.execute(&json!({"item": "Milk"}), "u1").await.unwrap();
        let list = store.lists("u1").unwrap().remove(0);
        assert_eq!(store.list_items(list.id).unwrap().len(), 2);
    }
}
