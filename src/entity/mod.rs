pub mod audit_logs;
pub mod carts;
pub mod order_items;
pub mod orders;
pub mod product_sizes;
pub mod products;
pub mod users;
pub mod verification_tokens;

pub use audit_logs::Entity as AuditLogs;
pub use carts::Entity as Carts;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use product_sizes::Entity as ProductSizes;
pub use products::Entity as Products;
pub use users::Entity as Users;
pub use verification_tokens::Entity as VerificationTokens;
