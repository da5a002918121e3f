use rust_decimal::Decimal;
use sqlx::PgPool;
use storefront_api::{
    db::{create_orm_conn, run_migrations},
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
    services::auth_service::hash_password,
};
use uuid::Uuid;

struct SeedProduct {
    name: &'static str,
    slug: &'static str,
    category: &'static str,
    brand: &'static str,
    description: &'static str,
    image: &'static str,
    price: Decimal,
    stock: i32,
    is_featured: bool,
    sizes: &'static [(&'static str, i64, i32)],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")?;

    let orm = create_orm_conn(&database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;
    let pool = orm.get_postgres_connection_pool();

    let admin_id = ensure_user(pool, "Store Admin", "admin@example.com", "admin123", ROLE_ADMIN).await?;
    let user_id = ensure_user(pool, "Demo Customer", "user@example.com", "user123", ROLE_USER).await?;
    seed_products(pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, email_verified_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

fn catalog() -> Vec<SeedProduct> {
    vec![
        SeedProduct {
            name: "Oak Platform Bed",
            slug: "oak-platform-bed",
            category: "Beds",
            brand: "Mtatsminda",
            description: "Solid oak bed frame with a low platform and slatted base.",
            image: "/images/oak-platform-bed.jpg",
            price: Decimal::new(89000, 2),
            stock: 0,
            is_featured: true,
            sizes: &[("140x200", 89000, 4), ("160x200", 99000, 3), ("180x200", 112000, 2)],
        },
        SeedProduct {
            name: "Memory Foam Mattress",
            slug: "memory-foam-mattress",
            category: "Mattresses",
            brand: "Sachino",
            description: "Seven-zone memory foam mattress with a washable cover.",
            image: "/images/memory-foam-mattress.jpg",
            price: Decimal::new(45000, 2),
            stock: 0,
            is_featured: true,
            sizes: &[("90x200", 45000, 10), ("160x200", 65000, 6), ("180x200", 72000, 5)],
        },
        SeedProduct {
            name: "Linen Duvet Cover",
            slug: "linen-duvet-cover",
            category: "Bedding",
            brand: "Tbilisi Textile",
            description: "Stonewashed linen duvet cover with button closure.",
            image: "/images/linen-duvet-cover.jpg",
            price: Decimal::new(12500, 2),
            stock: 0,
            is_featured: false,
            sizes: &[("Single", 12500, 20), ("Double", 15500, 15)],
        },
        SeedProduct {
            name: "Down Pillow",
            slug: "down-pillow",
            category: "Bedding",
            brand: "Tbilisi Textile",
            description: "Soft goose down pillow, 50x70.",
            image: "/images/down-pillow.jpg",
            price: Decimal::new(3900, 2),
            stock: 40,
            is_featured: false,
            sizes: &[],
        },
        SeedProduct {
            name: "Walnut Nightstand",
            slug: "walnut-nightstand",
            category: "Furniture",
            brand: "Mtatsminda",
            description: "Two-drawer walnut nightstand with brass handles.",
            image: "/images/walnut-nightstand.jpg",
            price: Decimal::new(21000, 2),
            stock: 12,
            is_featured: true,
            sizes: &[],
        },
        SeedProduct {
            name: "Wool Throw Blanket",
            slug: "wool-throw-blanket",
            category: "Bedding",
            brand: "Kakheti Wool",
            description: "Hand woven wool throw, 130x170.",
            image: "/images/wool-throw-blanket.jpg",
            price: Decimal::new(7500, 2),
            stock: 3,
            is_featured: false,
            sizes: &[],
        },
    ]
}

async fn seed_products(pool: &PgPool) -> anyhow::Result<()> {
    for product in catalog() {
        let (product_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO products
                (id, name, slug, category, brand, description, images, price, stock, is_featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product.name)
        .bind(product.slug)
        .bind(product.category)
        .bind(product.brand)
        .bind(product.description)
        .bind(serde_json::json!([product.image]))
        .bind(product.price)
        .bind(product.stock)
        .bind(product.is_featured)
        .fetch_one(pool)
        .await?;

        for (label, cents, stock) in product.sizes {
            sqlx::query(
                r#"
                INSERT INTO product_sizes (id, product_id, label, price, stock)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (product_id, label) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(*label)
            .bind(Decimal::new(*cents, 2))
            .bind(*stock)
            .execute(pool)
            .await?;
        }
    }

    println!("Seeded products");
    Ok(())
}
