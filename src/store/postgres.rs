use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, Runtime};
use secrecy::{ExposeSecret, SecretString};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use super::Store;
use super::models::{
    CategoryBudget, ListItem, NewPriceAlert, PriceAlert, PriceListing, Product, ProductQuery,
    Receipt, ShoppingList, StoreFilter, StoreLocation,
};
use crate::error::BodegaError;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const LIST_COLUMNS: &str = "id, user_id, name, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, name, brand, category, unit";
const STORE_COLUMNS: &str = "id, name, retailer, address, city, zip";

/// `Store` over PostgreSQL. Each call checks a connection out of the pool and
/// runs one statement.
pub struct PgStore {
    pool: Pool,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgStore")
            .field("pool_size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

fn pg(e: impl std::fmt::Display) -> BodegaError {
    BodegaError::Store(e.to_string())
}

/// `%text%` for ILIKE, with LIKE metacharacters escaped.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn list_from_row(row: &Row) -> Result<ShoppingList, BodegaError> {
    Ok(ShoppingList {
        id: row.try_get("id").map_err(pg)?,
        user_id: row.try_get("user_id").map_err(pg)?,
        name: row.try_get("name").map_err(pg)?,
        created_at: row.try_get("created_at").map_err(pg)?,
        updated_at: row.try_get("updated_at").map_err(pg)?,
    })
}

fn product_from_row(row: &Row) -> Result<Product, BodegaError> {
    Ok(Product {
        id: row.try_get("id").map_err(pg)?,
        name: row.try_get("name").map_err(pg)?,
        brand: row.try_get("brand").map_err(pg)?,
        category: row.try_get("category").map_err(pg)?,
        unit: row.try_get("unit").map_err(pg)?,
    })
}

fn store_from_row(row: &Row) -> Result<StoreLocation, BodegaError> {
    Ok(StoreLocation {
        id: row.try_get("id").map_err(pg)?,
        name: row.try_get("name").map_err(pg)?,
        retailer: row.try_get("retailer").map_err(pg)?,
        address: row.try_get("address").map_err(pg)?,
        city: row.try_get("city").map_err(pg)?,
        zip: row.try_get("zip").map_err(pg)?,
    })
}

impl PgStore {
    /// Build the pool and apply pending migrations.
    pub async fn connect(url: SecretString) -> Result<Self, BodegaError> {
        let mut config = deadpool_postgres::Config::new();
        config.url = Some(url.expose_secret().to_owned());
        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(pg)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), BodegaError> {
        let mut client = self.pool.get().await.map_err(pg)?;
        let report = embedded::migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(pg)?;
        for migration in report.applied_migrations() {
            tracing::info!(migration = %migration, "applied migration");
        }
        Ok(())
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, BodegaError> {
        self.pool.get().await.map_err(pg)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn latest_list(&self, user_id: &str) -> Result<Option<ShoppingList>, BodegaError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {LIST_COLUMNS} FROM shopping_lists WHERE user_id = $1 \
             ORDER BY updated_at DESC LIMIT 1"
        );
        let row = client.query_opt(&sql, &[&user_id]).await.map_err(pg)?;
        row.as_ref().map(list_from_row).transpose()
    }

    async fn get_list(
        &self,
        user_id: &str,
        list_id: Uuid,
    ) -> Result<Option<ShoppingList>, BodegaError> {
        let client = self.client().await?;
        let sql = format!("SELECT {LIST_COLUMNS} FROM shopping_lists WHERE id = $1 AND user_id = $2");
        let row = client
            .query_opt(&sql, &[&list_id, &user_id])
            .await
            .map_err(pg)?;
        row.as_ref().map(list_from_row).transpose()
    }

    async fn create_list(&self, user_id: &str, name: &str) -> Result<ShoppingList, BodegaError> {
        let client = self.client().await?;
        let sql = format!(
            "INSERT INTO shopping_lists (id, user_id, name) VALUES ($1, $2, $3) \
             RETURNING {LIST_COLUMNS}"
        );
        let row = client
            .query_one(&sql, &[&Uuid::now_v7(), &user_id, &name])
            .await
            .map_err(pg)?;
        list_from_row(&row)
    }

    async fn delete_list(&self, list_id: Uuid) -> Result<(), BodegaError> {
        let client = self.client().await?;
        client
            .execute("DELETE FROM shopping_lists WHERE id = $1", &[&list_id])
            .await
            .map_err(pg)?;
        Ok(())
    }

    async fn add_list_item(
        &self,
        list_id: Uuid,
        name: &str,
        quantity: i32,
    ) -> Result<ListItem, BodegaError> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO list_items (id, list_id, name, quantity) VALUES ($1, $2, $3, $4) \
                 RETURNING id, list_id, name, quantity, checked, created_at",
                &[&Uuid::now_v7(), &list_id, &name, &quantity],
            )
            .await
            .map_err(pg)?;
        Ok(ListItem {
            id: row.try_get("id").map_err(pg)?,
            list_id: row.try_get("list_id").map_err(pg)?,
            name: row.try_get("name").map_err(pg)?,
            quantity: row.try_get("quantity").map_err(pg)?,
            checked: row.try_get("checked").map_err(pg)?,
            created_at: row.try_get("created_at").map_err(pg)?,
        })
    }

    async fn touch_list(&self, list_id: Uuid) -> Result<(), BodegaError> {
        let client = self.client().await?;
        let updated = client
            .execute(
                "UPDATE shopping_lists SET updated_at = now() WHERE id = $1",
                &[&list_id],
            )
            .await
            .map_err(pg)?;
        if updated == 0 {
            return Err(BodegaError::Store(format!("no shopping list {list_id}")));
        }
        Ok(())
    }

    async fn find_product(&self, name: &str) -> Result<Option<Product>, BodegaError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE name ILIKE $1 \
             ORDER BY lower(name) = lower($2) DESC, name LIMIT 1"
        );
        let row = client
            .query_opt(&sql, &[&like_pattern(name), &name])
            .await
            .map_err(pg)?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn create_price_alert(&self, alert: NewPriceAlert) -> Result<PriceAlert, BodegaError> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO price_alerts (id, user_id, product_id, product_name, target_price) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, user_id, product_id, product_name, target_price, active, created_at",
                &[
                    &Uuid::now_v7(),
                    &alert.user_id,
                    &alert.product_id,
                    &alert.product_name,
                    &alert.target_price,
                ],
            )
            .await
            .map_err(pg)?;
        Ok(PriceAlert {
            id: row.try_get("id").map_err(pg)?,
            user_id: row.try_get("user_id").map_err(pg)?,
            product_id: row.try_get("product_id").map_err(pg)?,
            product_name: row.try_get("product_name").map_err(pg)?,
            target_price: row.try_get("target_price").map_err(pg)?,
            active: row.try_get("active").map_err(pg)?,
            created_at: row.try_get("created_at").map_err(pg)?,
        })
    }

    async fn receipts_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Receipt>, BodegaError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, user_id, store_name, category, total, purchased_at FROM receipts \
                 WHERE user_id = $1 AND purchased_at >= $2 AND purchased_at < $3 \
                 ORDER BY purchased_at",
                &[&user_id, &from, &to],
            )
            .await
            .map_err(pg)?;
        rows.iter()
            .map(|row| {
                Ok(Receipt {
                    id: row.try_get("id").map_err(pg)?,
                    user_id: row.try_get("user_id").map_err(pg)?,
                    store_name: row.try_get("store_name").map_err(pg)?,
                    category: row.try_get("category").map_err(pg)?,
                    total: row.try_get("total").map_err(pg)?,
                    purchased_at: row.try_get("purchased_at").map_err(pg)?,
                })
            })
            .collect()
    }

    async fn category_budgets(&self, user_id: &str) -> Result<Vec<CategoryBudget>, BodegaError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT category, monthly_limit FROM user_budgets WHERE user_id = $1 \
                 ORDER BY category",
                &[&user_id],
            )
            .await
            .map_err(pg)?;
        rows.iter()
            .map(|row| {
                Ok(CategoryBudget {
                    category: row.try_get("category").map_err(pg)?,
                    monthly_limit: row.try_get("monthly_limit").map_err(pg)?,
                })
            })
            .collect()
    }

    async fn monthly_budget(&self, user_id: &str) -> Result<Option<f64>, BodegaError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT monthly_budget FROM user_preferences WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(pg)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let budget: Option<f64> = row.try_get("monthly_budget").map_err(pg)?;
        Ok(budget)
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<Vec<Product>, BodegaError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE (name ILIKE $1 OR brand ILIKE $1) \
             AND ($2::text IS NULL OR lower(category) = lower($2)) \
             ORDER BY name LIMIT $3"
        );
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = client
            .query(&sql, &[&like_pattern(&query.text), &query.category, &limit])
            .await
            .map_err(pg)?;
        rows.iter().map(product_from_row).collect()
    }

    async fn prices_for(&self, product_ids: &[Uuid]) -> Result<Vec<PriceListing>, BodegaError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT p.product_id, p.store_id, s.name AS store_name, s.retailer, \
                 p.price, p.sale_price \
                 FROM prices p JOIN stores s ON s.id = p.store_id \
                 WHERE p.product_id = ANY($1)",
                &[&product_ids],
            )
            .await
            .map_err(pg)?;
        rows.iter()
            .map(|row| {
                Ok(PriceListing {
                    product_id: row.try_get("product_id").map_err(pg)?,
                    store_id: row.try_get("store_id").map_err(pg)?,
                    store_name: row.try_get("store_name").map_err(pg)?,
                    retailer: row.try_get("retailer").map_err(pg)?,
                    price: row.try_get("price").map_err(pg)?,
                    sale_price: row.try_get("sale_price").map_err(pg)?,
                })
            })
            .collect()
    }

    async fn find_stores(&self, filter: &StoreFilter) -> Result<Vec<StoreLocation>, BodegaError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores \
             WHERE ($1::text IS NULL OR retailer ILIKE $1) \
             AND ($2::text IS NULL OR city ILIKE $2) \
             AND ($3::text IS NULL OR zip = $3) \
             ORDER BY name LIMIT $4"
        );
        let retailer = filter.retailer.as_deref().map(like_pattern);
        let city = filter.city.as_deref().map(like_pattern);
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let rows = client
            .query(&sql, &[&retailer, &city, &filter.zip, &limit])
            .await
            .map_err(pg)?;
        rows.iter().map(store_from_row).collect()
    }
}
