use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Product, ProductSize};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    /// Derived from the name when omitted.
    pub slug: Option<String>,
    pub category: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub price: Decimal,
    pub stock: i32,
    #[serde(default)]
    pub is_featured: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSizeRequest {
    pub label: String,
    pub price: Decimal,
    pub stock: i32,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSizeRequest {
    pub label: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub sizes: Vec<ProductSize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryList {
    pub items: Vec<String>,
}
