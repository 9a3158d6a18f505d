use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: Uuid,
    pub list_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub checked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceAlert {
    pub user_id: String,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub target_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    pub id: Uuid,
    pub user_id: String,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub target_price: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: Uuid,
    pub user_id: String,
    pub store_name: Option<String>,
    pub category: Option<String>,
    pub total: f64,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBudget {
    pub category: String,
    pub monthly_limit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
}

/// One price row joined with the store it was observed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceListing {
    pub product_id: Uuid,
    pub store_id: Uuid,
    pub store_name: String,
    pub retailer: String,
    pub price: f64,
    pub sale_price: Option<f64>,
}

impl PriceListing {
    /// Sale price when one is running, list price otherwise.
    pub fn effective_price(&self) -> f64 {
        self.sale_price.unwrap_or(self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreLocation {
    pub id: Uuid,
    pub name: String,
    pub retailer: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQuery {
    pub text: String,
    pub category: Option<String>,
    pub limit: usize,
}

/// Filters for `Store::find_stores`, combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreFilter {
    pub retailer: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub limit: usize,
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            brand: None,
            category: None,
            unit: None,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

impl StoreLocation {
    pub fn new(name: impl Into<String>, retailer: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            retailer: retailer.into(),
            address: None,
            city: None,
            zip: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_zip(mut self, zip: impl Into<String>) -> Self {
        self.zip = Some(zip.into());
        self
    }
}
