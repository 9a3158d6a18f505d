use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::Store;
use super::models::{
    CategoryBudget, ListItem, NewPriceAlert, PriceAlert, PriceListing, Product, ProductQuery,
    Receipt, ShoppingList, StoreFilter, StoreLocation,
};
use crate::error::BodegaError;

const MAX_SEED_FILE_SIZE: u64 = 1024 * 1024; // 1 MiB

#[derive(Default)]
struct Tables {
    lists: Vec<ShoppingList>,
    items: Vec<ListItem>,
    alerts: Vec<PriceAlert>,
    receipts: Vec<Receipt>,
    budgets: HashMap<String, Vec<CategoryBudget>>,
    monthly_budgets: HashMap<String, f64>,
    products: Vec<Product>,
    prices: Vec<(Uuid, Uuid, f64, Option<f64>)>, // (product, store, price, sale)
    stores: Vec<StoreLocation>,
}

/// In-process `Store`. Rows live in insertion order behind one mutex; the lock
/// is never held across an await.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (products, stores) = self
            .tables
            .lock()
            .map(|t| (t.products.len(), t.stores.len()))
            .unwrap_or_default();
        f.debug_struct("MemoryStore")
            .field("products", &products)
            .field("stores", &stores)
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, BodegaError> {
        self.tables
            .lock()
            .map_err(|_| BodegaError::Store("memory store lock poisoned".to_owned()))
    }

    // --- Seeding (synchronous; used by tests and the catalogue loader) ---

    pub fn insert_product(&self, product: Product) -> Result<Product, BodegaError> {
        self.tables()?.products.push(product.clone());
        Ok(product)
    }

    pub fn insert_store(&self, store: StoreLocation) -> Result<StoreLocation, BodegaError> {
        self.tables()?.stores.push(store.clone());
        Ok(store)
    }

    pub fn insert_price(
        &self,
        product_id: Uuid,
        store_id: Uuid,
        price: f64,
        sale_price: Option<f64>,
    ) -> Result<(), BodegaError> {
        let mut tables = self.tables()?;
        if !tables.products.iter().any(|p| p.id == product_id) {
            return Err(BodegaError::Store(format!("no product {product_id}")));
        }
        if !tables.stores.iter().any(|s| s.id == store_id) {
            return Err(BodegaError::Store(format!("no store {store_id}")));
        }
        tables.prices.push((product_id, store_id, price, sale_price));
        Ok(())
    }

    pub fn insert_receipt(
        &self,
        user_id: &str,
        category: Option<&str>,
        total: f64,
        purchased_at: DateTime<Utc>,
    ) -> Result<Receipt, BodegaError> {
        let receipt = Receipt {
            id: Uuid::now_v7(),
            user_id: user_id.to_owned(),
            store_name: None,
            category: category.map(str::to_owned),
            total,
            purchased_at,
        };
        self.tables()?.receipts.push(receipt.clone());
        Ok(receipt)
    }

    /// Insert or replace the user's budget for `category`.
    pub fn set_category_budget(
        &self,
        user_id: &str,
        category: &str,
        monthly_limit: f64,
    ) -> Result<(), BodegaError> {
        let mut tables = self.tables()?;
        let budgets = tables.budgets.entry(user_id.to_owned()).or_default();
        match budgets
            .iter_mut()
            .find(|b| b.category.eq_ignore_ascii_case(category))
        {
            Some(existing) => existing.monthly_limit = monthly_limit,
            None => budgets.push(CategoryBudget {
                category: category.to_owned(),
                monthly_limit,
            }),
        }
        Ok(())
    }

    pub fn set_monthly_budget(&self, user_id: &str, amount: f64) -> Result<(), BodegaError> {
        self.tables()?
            .monthly_budgets
            .insert(user_id.to_owned(), amount);
        Ok(())
    }

    // --- Inspection ---

    pub fn lists(&self, user_id: &str) -> Result<Vec<ShoppingList>, BodegaError> {
        Ok(self
            .tables()?
            .lists
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    pub fn list_items(&self, list_id: Uuid) -> Result<Vec<ListItem>, BodegaError> {
        Ok(self
            .tables()?
            .items
            .iter()
            .filter(|i| i.list_id == list_id)
            .cloned()
            .collect())
    }

    pub fn price_alerts(&self, user_id: &str) -> Result<Vec<PriceAlert>, BodegaError> {
        Ok(self
            .tables()?
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    // --- Catalogue seed files ---

    /// Load a TOML catalogue file. Checks file size before reading.
    pub fn load_seed(path: &Path) -> Result<Self, BodegaError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| BodegaError::Config(format!("cannot read {}: {e}", path.display())))?;

        if metadata.len() > MAX_SEED_FILE_SIZE {
            return Err(BodegaError::Config(format!(
                "seed file exceeds {MAX_SEED_FILE_SIZE} byte limit"
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BodegaError::Config(format!("cannot read {}: {e}", path.display())))?;

        Self::from_seed_str(&content)
    }

    pub fn from_seed_str(content: &str) -> Result<Self, BodegaError> {
        let seed: SeedFile =
            toml::from_str(content).map_err(|e| BodegaError::Config(e.to_string()))?;
        let store = Self::new();

        let mut product_ids = HashMap::new();
        for p in seed.products {
            let mut product = Product::new(&p.name);
            product.brand = p.brand;
            product.category = p.category;
            product.unit = p.unit;
            product_ids.insert(p.name.to_lowercase(), product.id);
            store.insert_product(product)?;
        }

        let mut store_ids = HashMap::new();
        for s in seed.stores {
            let mut location = StoreLocation::new(&s.name, s.retailer);
            location.address = s.address;
            location.city = s.city;
            location.zip = s.zip;
            store_ids.insert(s.name.to_lowercase(), location.id);
            store.insert_store(location)?;
        }

        for price in seed.prices {
            let product_id = product_ids.get(&price.product.to_lowercase()).ok_or_else(|| {
                BodegaError::ConfigValidation(format!(
                    "price references unknown product '{}'",
                    price.product
                ))
            })?;
            let store_id = store_ids.get(&price.store.to_lowercase()).ok_or_else(|| {
                BodegaError::ConfigValidation(format!(
                    "price references unknown store '{}'",
                    price.store
                ))
            })?;
            store.insert_price(*product_id, *store_id, price.price, price.sale_price)?;
        }

        for r in seed.receipts {
            store.insert_receipt(&r.user, r.category.as_deref(), r.total, r.purchased_at)?;
        }
        for b in seed.budgets {
            match b.category {
                Some(category) => store.set_category_budget(&b.user, &category, b.monthly_limit)?,
                None => store.set_monthly_budget(&b.user, b.monthly_limit)?,
            }
        }

        Ok(store)
    }
}

// --- TOML seed structs (private, map 1:1 to the catalogue schema) ---

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedFile {
    #[serde(default)]
    products: Vec<SeedProduct>,
    #[serde(default)]
    stores: Vec<SeedStore>,
    #[serde(default)]
    prices: Vec<SeedPrice>,
    #[serde(default)]
    receipts: Vec<SeedReceipt>,
    #[serde(default)]
    budgets: Vec<SeedBudget>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedProduct {
    name: String,
    brand: Option<String>,
    category: Option<String>,
    unit: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedStore {
    name: String,
    retailer: String,
    address: Option<String>,
    city: Option<String>,
    zip: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedPrice {
    product: String,
    store: String,
    price: f64,
    sale_price: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedReceipt {
    user: String,
    total: f64,
    category: Option<String>,
    purchased_at: DateTime<Utc>,
}

/// A budget row; without `category` it is the user's overall monthly budget.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedBudget {
    user: String,
    category: Option<String>,
    monthly_limit: f64,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl Store for MemoryStore {
    async fn latest_list(&self, user_id: &str) -> Result<Option<ShoppingList>, BodegaError> {
        Ok(self
            .tables()?
            .lists
            .iter()
            .filter(|l| l.user_id == user_id)
            .max_by_key(|l| l.updated_at)
            .cloned())
    }

    async fn get_list(
        &self,
        user_id: &str,
        list_id: Uuid,
    ) -> Result<Option<ShoppingList>, BodegaError> {
        Ok(self
            .tables()?
            .lists
            .iter()
            .find(|l| l.id == list_id && l.user_id == user_id)
            .cloned())
    }

    async fn create_list(&self, user_id: &str, name: &str) -> Result<ShoppingList, BodegaError> {
        let now = Utc::now();
        let list = ShoppingList {
            id: Uuid::now_v7(),
            user_id: user_id.to_owned(),
            name: name.to_owned(),
            created_at: now,
            updated_at: now,
        };
        self.tables()?.lists.push(list.clone());
        Ok(list)
    }

    async fn delete_list(&self, list_id: Uuid) -> Result<(), BodegaError> {
        let mut tables = self.tables()?;
        tables.items.retain(|i| i.list_id != list_id);
        tables.lists.retain(|l| l.id != list_id);
        Ok(())
    }

    async fn add_list_item(
        &self,
        list_id: Uuid,
        name: &str,
        quantity: i32,
    ) -> Result<ListItem, BodegaError> {
        let mut tables = self.tables()?;
        if !tables.lists.iter().any(|l| l.id == list_id) {
            return Err(BodegaError::Store(format!("no shopping list {list_id}")));
        }
        let item = ListItem {
            id: Uuid::now_v7(),
            list_id,
            name: name.to_owned(),
            quantity,
            checked: false,
            created_at: Utc::now(),
        };
        tables.items.push(item.clone());
        Ok(item)
    }

    async fn touch_list(&self, list_id: Uuid) -> Result<(), BodegaError> {
        let mut tables = self.tables()?;
        match tables.lists.iter_mut().find(|l| l.id == list_id) {
            Some(list) => {
                list.updated_at = Utc::now();
                Ok(())
            }
            None => Err(BodegaError::Store(format!("no shopping list {list_id}"))),
        }
    }

    async fn find_product(&self, name: &str) -> Result<Option<Product>, BodegaError> {
        let tables = self.tables()?;
        let exact = tables
            .products
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name));
        Ok(exact
            .or_else(|| tables.products.iter().find(|p| contains_ci(&p.name, name)))
            .cloned())
    }

    async fn create_price_alert(&self, alert: NewPriceAlert) -> Result<PriceAlert, BodegaError> {
        let alert = PriceAlert {
            id: Uuid::now_v7(),
            user_id: alert.user_id,
            product_id: alert.product_id,
            product_name: alert.product_name,
            target_price: alert.target_price,
            active: true,
            created_at: Utc::now(),
        };
        self.tables()?.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn receipts_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Receipt>, BodegaError> {
        Ok(self
            .tables()?
            .receipts
            .iter()
            .filter(|r| r.user_id == user_id && r.purchased_at >= from && r.purchased_at < to)
            .cloned()
            .collect())
    }

    async fn category_budgets(&self, user_id: &str) -> Result<Vec<CategoryBudget>, BodegaError> {
        Ok(self
            .tables()?
            .budgets
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn monthly_budget(&self, user_id: &str) -> Result<Option<f64>, BodegaError> {
        Ok(self.tables()?.monthly_budgets.get(user_id).copied())
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BodegaError> {
        let tables = self.tables()?;
        Ok(tables
            .products
            .iter()
            .filter(|p| {
                contains_ci(&p.name, &query.text)
                    || p.brand.as_deref().is_some_and(|b| contains_ci(b, &query.text))
            })
            .filter(|p| match &query.category {
                Some(category) => p
                    .category
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(category)),
                None => true,
            })
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn prices_for(&self, product_ids: &[Uuid]) -> Result<Vec<PriceListing>, BodegaError> {
        let tables = self.tables()?;
        Ok(tables
            .prices
            .iter()
            .filter(|(product_id, ..)| product_ids.contains(product_id))
            .filter_map(|&(product_id, store_id, price, sale_price)| {
                let store = tables.stores.iter().find(|s| s.id == store_id)?;
                Some(PriceListing {
                    product_id,
                    store_id,
                    store_name: store.name.clone(),
                    retailer: store.retailer.clone(),
                    price,
                    sale_price,
                })
            })
            .collect())
    }

    async fn find_stores(&self, filter: &StoreFilter) -> Result<Vec<StoreLocation>, BodegaError> {
        let tables = self.tables()?;
        Ok(tables
            .stores
            .iter()
            .filter(|s| {
                filter
                    .retailer
                    .as_deref()
                    .is_none_or(|r| contains_ci(&s.retailer, r))
            })
            .filter(|s| {
                filter.city.as_deref().is_none_or(|city| {
                    s.city.as_deref().is_some_and(|c| contains_ci(c, city))
                })
            })
            .filter(|s| {
                filter
                    .zip
                    .as_deref()
                    .is_none_or(|zip| s.zip.as_deref() == Some(zip))
            })
            .take(filter.limit)
            .cloned()
            .collect())
    }
}
