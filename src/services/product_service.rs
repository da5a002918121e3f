use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::dto::products::{
    CategoryList, CreateProductRequest, CreateSizeRequest, ProductDetail, ProductList,
    UpdateProductRequest, UpdateSizeRequest,
};
use crate::{
    audit,
    entity::{
        product_sizes::{
            ActiveModel as SizeActive, Column as SizeCol, Entity as ProductSizes,
        },
        products::{ActiveModel, Column, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{ImageList, Product, ProductSize},
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category) = query.category.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::Category.eq(category.clone()));
    }

    if let Some(brand) = query.brand.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::Brand.eq(brand.clone()));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    if let Some(featured) = query.featured {
        condition = condition.add(Column::IsFeatured.eq(featured));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

pub async fn get_product_by_slug(
    state: &AppState,
    slug: &str,
) -> AppResult<ApiResponse<ProductDetail>> {
    let product = Products::find()
        .filter(Column::Slug.eq(slug))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let sizes = product
        .find_related(ProductSizes)
        .order_by_asc(SizeCol::Price)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ProductSize::from)
        .collect();

    Ok(ApiResponse::success(
        "Product",
        ProductDetail {
            product: product.into(),
            sizes,
        },
        None,
    ))
}

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items: Vec<String> = Products::find()
        .select_only()
        .column(Column::Category)
        .distinct()
        .order_by_asc(Column::Category)
        .into_tuple()
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    require_text("name", &payload.name)?;
    require_text("category", &payload.category)?;
    validate_price_stock(Some(payload.price), Some(payload.stock))?;

    let id = Uuid::new_v4();
    let slug = product_slug(payload.slug.as_deref(), &payload.name, id);
    ensure_slug_free(state, &slug, None).await?;

    let active = ActiveModel {
        id: Set(id),
        name: Set(payload.name.trim().to_string()),
        slug: Set(slug),
        category: Set(payload.category.trim().to_string()),
        brand: Set(payload.brand),
        description: Set(payload.description),
        images: Set(ImageList(payload.images)),
        price: Set(payload.price),
        stock: Set(payload.stock),
        is_featured: Set(payload.is_featured),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_price_stock(payload.price, payload.stock)?;

    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        require_text("name", &name)?;
        active.name = Set(name.trim().to_string());
    }
    if let Some(slug) = payload.slug {
        let slug = slugify(&slug);
        require_text("slug", &slug)?;
        ensure_slug_free(state, &slug, Some(id)).await?;
        active.slug = Set(slug);
    }
    if let Some(category) = payload.category {
        require_text("category", &category)?;
        active.category = Set(category.trim().to_string());
    }
    if let Some(brand) = payload.brand {
        active.brand = Set(brand);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(images) = payload.images {
        active.images = Set(ImageList(images));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(is_featured) = payload.is_featured {
        active.is_featured = Set(is_featured);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        state,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn create_size(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: CreateSizeRequest,
) -> AppResult<ApiResponse<ProductSize>> {
    ensure_admin(user)?;
    require_text("label", &payload.label)?;
    validate_price_stock(Some(payload.price), Some(payload.stock))?;

    Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let duplicate = ProductSizes::find()
        .filter(SizeCol::ProductId.eq(product_id))
        .filter(SizeCol::Label.eq(payload.label.trim()))
        .count(&state.orm)
        .await?;
    if duplicate > 0 {
        return Err(AppError::BadRequest("Size label already exists".into()));
    }

    let size = SizeActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        label: Set(payload.label.trim().to_string()),
        price: Set(payload.price),
        stock: Set(payload.stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_size_create",
        "product_sizes",
        serde_json::json!({ "product_id": product_id, "size_id": size.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Size created",
        ProductSize::from(size),
        Some(Meta::empty()),
    ))
}

pub async fn update_size(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    size_id: Uuid,
    payload: UpdateSizeRequest,
) -> AppResult<ApiResponse<ProductSize>> {
    ensure_admin(user)?;
    validate_price_stock(payload.price, payload.stock)?;

    let existing = ProductSizes::find_by_id(size_id)
        .filter(SizeCol::ProductId.eq(product_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: SizeActive = existing.into();
    if let Some(label) = payload.label {
        require_text("label", &label)?;
        active.label = Set(label.trim().to_string());
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    let size = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_size_update",
        "product_sizes",
        serde_json::json!({ "product_id": product_id, "size_id": size.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Size updated",
        ProductSize::from(size),
        Some(Meta::empty()),
    ))
}

pub async fn delete_size(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    size_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = ProductSizes::delete_many()
        .filter(SizeCol::Id.eq(size_id))
        .filter(SizeCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        state,
        Some(user.user_id),
        "product_size_delete",
        "product_sizes",
        serde_json::json!({ "product_id": product_id, "size_id": size_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for ch in input.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Slug for a new product: the requested one, else the name's. Names with no
/// ASCII letters or digits fall back to `product-` and the id prefix.
fn product_slug(requested: Option<&str>, name: &str, id: Uuid) -> String {
    [requested.map(slugify), Some(slugify(name))]
        .into_iter()
        .flatten()
        .find(|slug| !slug.is_empty())
        .unwrap_or_else(|| format!("product-{}", &id.simple().to_string()[..8]))
}

async fn ensure_slug_free(state: &AppState, slug: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut finder = Products::find().filter(Column::Slug.eq(slug));
    if let Some(id) = except {
        finder = finder.filter(Column::Id.ne(id));
    }
    if finder.count(&state.orm).await? > 0 {
        return Err(AppError::BadRequest(format!("Slug {slug} is already taken")));
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_price_stock(price: Option<Decimal>, stock: Option<i32>) -> AppResult<()> {
    if price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}
