use sea_orm::entity::prelude::*;

use crate::models::ImageList;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub category: String,
    pub brand: String,
    pub description: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub images: ImageList,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price: Decimal,
    pub stock: i32,
    pub is_featured: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_sizes::Entity")]
    ProductSizes,
}

impl Related<super::product_sizes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductSizes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
