use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use bodega::config::{Config, ToolsConfig};
use bodega::store::MemoryStore;
use bodega::{ActionType, ToolRegistry, parse_actions_from_response, strip_directives};

fn demo_store() -> Arc<MemoryStore> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/catalog.toml");
    Arc::new(MemoryStore::load_seed(&path).expect("demo catalogue should load"))
}

#[test]
fn demo_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/bodega.toml");
    let config = Config::load(&path).expect("demo config should load");
    assert_eq!(config.tools, ToolsConfig::default());
    assert!(config.seed.expect("seed configured").ends_with("demos/catalog.toml"));
}

#[tokio::test]
async fn assistant_reply_end_to_end() {
    let store = demo_store();
    let registry = ToolRegistry::new(store.clone(), &ToolsConfig::default());

    let reply = "Whole milk is on sale at Kroger right now!\n\
                 [ACTION:SEARCH_PRICES] whole milk\n\
                 I'll add it to your list and watch eggs for you.\n\
                 [ACTION:ADD_TO_LIST] Whole Milk, 2\n\
                 [ACTION:SET_ALERT] Large Eggs, $3.50\n";

    let parsed = parse_actions_from_response(reply);
    let kinds: Vec<_> = parsed.iter().map(|p| p.action).collect();
    assert_eq!(
        kinds,
        vec![ActionType::SearchPrices, ActionType::AddToList, ActionType::SetAlert]
    );

    let results = registry.execute_parsed(&parsed, "shopper").await;
    assert!(results.iter().all(|r| r.success), "{results:?}");

    let search = results[0].data.as_ref().unwrap();
    assert_eq!(search["results"][0]["bestPrice"]["storeName"], json!("Kroger Westside"));
    assert_eq!(search["results"][0]["bestPrice"]["effectivePrice"], json!(2.99));

    let list = store.lists("shopper").unwrap().remove(0);
    let items = store.list_items(list.id).unwrap();
    assert_eq!(items[0].name, "Whole Milk");
    assert_eq!(items[0].quantity, 2);

    let alerts = store.price_alerts("shopper").unwrap();
    assert_eq!(alerts[0].target_price, 3.5);
    assert!(alerts[0].product_id.is_some());

    assert_eq!(
        strip_directives(reply),
        "Whole milk is on sale at Kroger right now!\nI'll add it to your list and watch eggs for you."
    );
}

#[tokio::test]
async fn result_action_always_echoes_input() {
    let registry = ToolRegistry::new(demo_store(), &ToolsConfig::default());
    for action in [
        "ADD_TO_LIST",
        "SET_ALERT",
        "CHECK_BUDGET",
        "SEARCH_PRICES",
        "FIND_STORES",
        "NOT_A_REAL_ACTION",
        "",
    ] {
        let result = registry.execute_action(action, json!({}), "u1").await;
        assert_eq!(result.action, action);
        assert!(!result.message.is_empty());
    }
}

#[tokio::test]
async fn non_object_params_are_rejected_softly() {
    let registry = ToolRegistry::new(demo_store(), &ToolsConfig::default());
    let result = registry
        .execute_action("FIND_STORES", json!("Aldi"), "u1")
        .await;
    assert!(!result.success);
    assert!(result.message.starts_with("I couldn't read the FIND_STORES request"));
}

#[tokio::test]
async fn rejected_field_is_named_plainly() {
    let registry = ToolRegistry::new(demo_store(), &ToolsConfig::default());
    let result = registry
        .execute_action("ADD_TO_LIST", json!({"item": "Milk", "listId": "abc"}), "u1")
        .await;
    assert!(!result.success);
    assert_eq!(
        result.message,
        "I couldn't read the ADD_TO_LIST request: `listId` has a value I can't use."
    );
}

#[tokio::test]
async fn whole_float_quantity_is_added() {
    let store = demo_store();
    let registry = ToolRegistry::new(store.clone(), &ToolsConfig::default());
    let result = registry
        .execute_action("ADD_TO_LIST", json!({"item": "Bananas", "quantity": 3.0}), "u1")
        .await;
    assert!(result.success, "{result:?}");
    let list = store.lists("u1").unwrap().remove(0);
    assert_eq!(store.list_items(list.id).unwrap()[0].quantity, 3);
}

#[tokio::test]
async fn fresh_user_budget_shows_zero_spend() {
    let registry = ToolRegistry::new(demo_store(), &ToolsConfig::default());
    let result = registry.execute_action("CHECK_BUDGET", json!({}), "fresh-user").await;
    assert!(result.success);
    assert!(result.message.starts_with("You've spent $0.00 so far this month."), "{}", result.message);
}

#[tokio::test]
async fn budget_for_seeded_user() {
    let registry = ToolRegistry::new(demo_store(), &ToolsConfig::default());
    let result = registry
        .execute_action("CHECK_BUDGET", json!({"category": "produce"}), "local-user")
        .await;
    assert!(result.success);
    assert_eq!(
        result.message,
        "You have $80.00 left in your produce budget of $80.00 ($0.00 spent so far this month)."
    );
}

#[tokio::test]
async fn duplicated_directive_writes_twice() {
    let store = demo_store();
    let registry = ToolRegistry::new(store.clone(), &ToolsConfig::default());
    let parsed = parse_actions_from_response("[ACTION:ADD_TO_LIST] Bananas\n[ACTION:ADD_TO_LIST] Bananas\n");
    registry.execute_parsed(&parsed, "u1").await;

    let list = store.lists("u1").unwrap().remove(0);
    assert_eq!(store.list_items(list.id).unwrap().len(), 2);
}
