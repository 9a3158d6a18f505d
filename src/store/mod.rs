pub mod memory;
pub mod models;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::BodegaError;
use models::{
    CategoryBudget, ListItem, NewPriceAlert, PriceAlert, PriceListing, Product, ProductQuery,
    Receipt, ShoppingList, StoreFilter, StoreLocation,
};

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// The grocery data store the action tools read from and write to.
///
/// One method per query a tool needs. Implementations own connection handling;
/// every call is a single round trip with no transaction spanning calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// The user's most recently updated shopping list.
    async fn latest_list(&self, user_id: &str) -> Result<Option<ShoppingList>, BodegaError>;

    /// A list by id, only if it belongs to `user_id`.
    async fn get_list(
        &self,
        user_id: &str,
        list_id: Uuid,
    ) -> Result<Option<ShoppingList>, BodegaError>;

    async fn create_list(&self, user_id: &str, name: &str) -> Result<ShoppingList, BodegaError>;

    /// Delete a list and its items.
    async fn delete_list(&self, list_id: Uuid) -> Result<(), BodegaError>;

    async fn add_list_item(
        &self,
        list_id: Uuid,
        name: &str,
        quantity: i32,
    ) -> Result<ListItem, BodegaError>;

    /// Bump the list's `updated_at` to now.
    async fn touch_list(&self, list_id: Uuid) -> Result<(), BodegaError>;

    /// Case-insensitive substring lookup; first match by name.
    async fn find_product(&self, name: &str) -> Result<Option<Product>, BodegaError>;

    async fn create_price_alert(&self, alert: NewPriceAlert) -> Result<PriceAlert, BodegaError>;

    /// Receipts with `from <= purchased_at < to`.
    async fn receipts_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Receipt>, BodegaError>;

    async fn category_budgets(&self, user_id: &str) -> Result<Vec<CategoryBudget>, BodegaError>;

    /// The overall monthly budget from the user's preferences, if set.
    async fn monthly_budget(&self, user_id: &str) -> Result<Option<f64>, BodegaError>;

    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BodegaError>;

    async fn prices_for(&self, product_ids: &[Uuid]) -> Result<Vec<PriceListing>, BodegaError>;

    async fn find_stores(&self, filter: &StoreFilter) -> Result<Vec<StoreLocation>, BodegaError>;
}
