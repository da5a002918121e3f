use sea_orm::entity::prelude::*;

use crate::models::{PaymentResult, ShippingAddress};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub user_id: Uuid,
    #[sea_orm(column_type = "JsonBinary")]
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub payment_result: Option<PaymentResult>,
    #[sea_orm(unique)]
    pub bog_order_id: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub items_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub shipping_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub tax_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_price: Decimal,
    pub status: String,
    pub paid_at: Option<DateTimeWithTimeZone>,
    pub delivered_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
