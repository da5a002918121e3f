use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartDto, UpdateCartItemRequest},
    entity::{
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        product_sizes::{Column as SizeCol, Entity as ProductSizes},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartLine, CartLines},
    pricing::{CartTotals, PricingConfig, cart_totals},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Who a cart belongs to: a signed-in user, or a guest session.
#[derive(Debug, Clone, Copy)]
pub struct CartOwner {
    pub user_id: Option<Uuid>,
    pub session_cart_id: Option<Uuid>,
}

impl CartOwner {
    pub fn new(user: Option<&AuthUser>, session_cart_id: Option<Uuid>) -> Self {
        Self {
            user_id: user.map(|u| u.user_id),
            session_cart_id,
        }
    }
}

pub async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    owner: CartOwner,
) -> AppResult<Option<CartModel>> {
    let cart = match (owner.user_id, owner.session_cart_id) {
        (Some(user_id), _) => {
            Carts::find()
                .filter(CartCol::UserId.eq(user_id))
                .one(conn)
                .await?
        }
        (None, Some(session_id)) => {
            Carts::find()
                .filter(CartCol::SessionCartId.eq(session_id))
                .filter(CartCol::UserId.is_null())
                .one(conn)
                .await?
        }
        (None, None) => None,
    };
    Ok(cart)
}

pub async fn get_cart(state: &AppState, owner: CartOwner) -> AppResult<ApiResponse<CartDto>> {
    let cart = find_cart(&state.orm, owner).await?;
    let dto = match cart {
        Some(cart) => cart_dto(cart),
        None => CartDto {
            id: None,
            session_cart_id: owner.session_cart_id,
            user_id: owner.user_id,
            items: Vec::new(),
            totals: CartTotals::zero(),
            updated_at: None,
        },
    };
    Ok(ApiResponse::success("OK", dto, Some(Meta::empty())))
}

pub async fn add_item(
    state: &AppState,
    owner: CartOwner,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartDto>> {
    let quantity = payload.quantity.unwrap_or(1);
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    require_owner(owner)?;

    let (template, stock) = resolve_line(state, payload.product_id, payload.size_id).await?;

    let txn = state.orm.begin().await?;
    let cart = lock_or_create_cart(&txn, owner).await?;
    let mut lines = cart.items.0.clone();

    match lines
        .iter_mut()
        .find(|line| line.matches(payload.product_id, payload.size_id))
    {
        Some(line) => {
            let next = line.quantity + quantity;
            ensure_stock(stock, next)?;
            line.quantity = next;
        }
        None => {
            ensure_stock(stock, quantity)?;
            lines.push(CartLine {
                quantity,
                ..template
            });
        }
    }

    let saved = save_cart(&txn, &state.config.pricing, cart, lines).await?;
    txn.commit().await?;

    audit::record(
        state,
        owner.user_id,
        "cart_add",
        "carts",
        serde_json::json!({
            "cart_id": saved.id,
            "product_id": payload.product_id,
            "size_id": payload.size_id,
            "quantity": quantity,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        "Added to cart",
        cart_dto(saved),
        Some(Meta::empty()),
    ))
}

pub async fn update_item(
    state: &AppState,
    owner: CartOwner,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartDto>> {
    if payload.quantity < 0 {
        return Err(AppError::BadRequest("quantity must not be negative".into()));
    }
    require_owner(owner)?;

    let txn = state.orm.begin().await?;
    let cart = lock_cart(&txn, owner).await?.ok_or(AppError::NotFound)?;
    let mut lines = cart.items.0.clone();
    let position = lines
        .iter()
        .position(|line| line.matches(payload.product_id, payload.size_id))
        .ok_or(AppError::NotFound)?;

    if payload.quantity == 0 {
        lines.remove(position);
    } else {
        let (_, stock) = resolve_line(state, payload.product_id, payload.size_id).await?;
        ensure_stock(stock, payload.quantity)?;
        lines[position].quantity = payload.quantity;
    }

    let saved = save_cart(&txn, &state.config.pricing, cart, lines).await?;
    txn.commit().await?;

    audit::record(
        state,
        owner.user_id,
        "cart_update",
        "carts",
        serde_json::json!({
            "cart_id": saved.id,
            "product_id": payload.product_id,
            "size_id": payload.size_id,
            "quantity": payload.quantity,
        }),
    )
    .await;

    Ok(ApiResponse::success("Cart updated", cart_dto(saved), Some(Meta::empty())))
}

pub async fn remove_item(
    state: &AppState,
    owner: CartOwner,
    product_id: Uuid,
    size_id: Option<Uuid>,
) -> AppResult<ApiResponse<CartDto>> {
    require_owner(owner)?;
    let txn = state.orm.begin().await?;
    let cart = lock_cart(&txn, owner).await?.ok_or(AppError::NotFound)?;

    let before = cart.items.0.len();
    let lines: Vec<CartLine> = cart
        .items
        .0
        .iter()
        .filter(|line| !line.matches(product_id, size_id))
        .cloned()
        .collect();
    if lines.len() == before {
        return Err(AppError::NotFound);
    }

    let saved = save_cart(&txn, &state.config.pricing, cart, lines).await?;
    txn.commit().await?;

    audit::record(
        state,
        owner.user_id,
        "cart_remove",
        "carts",
        serde_json::json!({ "cart_id": saved.id, "product_id": product_id, "size_id": size_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        cart_dto(saved),
        Some(Meta::empty()),
    ))
}

/// Attach a guest cart to a user who just signed in, replacing any cart the
/// user already had. Does nothing when the session has no cart.
///
/// The claimed cart gets a new `session_cart_id`, so the client's header
/// names an unused guest cart again after logout.
pub async fn claim_session_cart(
    state: &AppState,
    user_id: Uuid,
    session_cart_id: Uuid,
) -> AppResult<()> {
    let txn = state.orm.begin().await?;
    let guest = lock_cart(&txn, CartOwner::new(None, Some(session_cart_id))).await?;
    let Some(guest) = guest else {
        return Ok(());
    };

    Carts::delete_many()
        .filter(CartCol::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    let mut active: CartActive = guest.into();
    active.user_id = Set(Some(user_id));
    active.session_cart_id = Set(Uuid::new_v4());
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;
    txn.commit().await?;

    tracing::debug!(%user_id, %session_cart_id, "claimed guest cart");
    Ok(())
}

pub fn cart_dto(cart: CartModel) -> CartDto {
    CartDto {
        id: Some(cart.id),
        session_cart_id: Some(cart.session_cart_id),
        user_id: cart.user_id,
        items: cart.items.0,
        totals: CartTotals {
            items_price: cart.items_price,
            shipping_price: cart.shipping_price,
            tax_price: cart.tax_price,
            total_price: cart.total_price,
        },
        updated_at: Some(cart.updated_at.with_timezone(&Utc)),
    }
}

/// Lock the owner's cart row until the transaction ends.
async fn lock_cart(txn: &DatabaseTransaction, owner: CartOwner) -> AppResult<Option<CartModel>> {
    let finder = match (owner.user_id, owner.session_cart_id) {
        (Some(user_id), _) => Carts::find().filter(CartCol::UserId.eq(user_id)),
        (None, Some(session_id)) => Carts::find()
            .filter(CartCol::SessionCartId.eq(session_id))
            .filter(CartCol::UserId.is_null()),
        (None, None) => return Ok(None),
    };
    Ok(finder.lock(LockType::Update).one(txn).await?)
}

/// Lock the owner's cart, inserting an empty one first when there is none.
/// Concurrent first adds for one owner meet on the unique keys and share the row.
async fn lock_or_create_cart(txn: &DatabaseTransaction, owner: CartOwner) -> AppResult<CartModel> {
    if let Some(cart) = lock_cart(txn, owner).await? {
        return Ok(cart);
    }

    // A user cart never takes the header's id; that id only names guest carts.
    let (session_cart_id, key) = match (owner.user_id, owner.session_cart_id) {
        (Some(_), _) => (Uuid::new_v4(), CartCol::UserId),
        (None, Some(session_id)) => (session_id, CartCol::SessionCartId),
        (None, None) => return Err(missing_owner()),
    };

    let zero = CartTotals::zero();
    Carts::insert(CartActive {
        id: Set(Uuid::new_v4()),
        session_cart_id: Set(session_cart_id),
        user_id: Set(owner.user_id),
        items: Set(CartLines(Vec::new())),
        items_price: Set(zero.items_price),
        shipping_price: Set(zero.shipping_price),
        tax_price: Set(zero.tax_price),
        total_price: Set(zero.total_price),
        created_at: NotSet,
        updated_at: NotSet,
    })
    .on_conflict(OnConflict::column(key).do_nothing().to_owned())
    .exec_without_returning(txn)
    .await?;

    lock_cart(txn, owner).await?.ok_or_else(|| {
        AppError::BadRequest("x-session-cart-id is already used by another cart".into())
    })
}

async fn save_cart(
    txn: &DatabaseTransaction,
    pricing: &PricingConfig,
    cart: CartModel,
    lines: Vec<CartLine>,
) -> AppResult<CartModel> {
    let totals = cart_totals(&lines, pricing)?;

    let mut active: CartActive = cart.into();
    active.items = Set(CartLines(lines));
    active.items_price = Set(totals.items_price);
    active.shipping_price = Set(totals.shipping_price);
    active.tax_price = Set(totals.tax_price);
    active.total_price = Set(totals.total_price);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(txn).await?)
}

/// Current price snapshot and available stock for a product, or one of its sizes.
async fn resolve_line(
    state: &AppState,
    product_id: Uuid,
    size_id: Option<Uuid>,
) -> AppResult<(CartLine, i32)> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;

    let sizes = ProductSizes::find()
        .filter(SizeCol::ProductId.eq(product_id))
        .all(&state.orm)
        .await?;

    let (price, stock, size_label) = match size_id {
        Some(size_id) => {
            let size = sizes
                .into_iter()
                .find(|s| s.id == size_id)
                .ok_or_else(|| AppError::BadRequest("size not found for product".to_string()))?;
            (size.price, size.stock, Some(size.label))
        }
        None if !sizes.is_empty() => {
            return Err(AppError::BadRequest("size_id is required for this product".into()));
        }
        None => (product.price, product.stock, None),
    };

    let line = CartLine {
        product_id,
        size_id,
        name: product.name,
        slug: product.slug,
        size_label,
        image: product.images.0.into_iter().next(),
        price,
        quantity: 0,
    };
    Ok((line, stock))
}

fn ensure_stock(stock: i32, wanted: i32) -> AppResult<()> {
    if wanted > stock {
        return Err(AppError::BadRequest(format!(
            "Only {stock} item(s) left in stock"
        )));
    }
    Ok(())
}

fn missing_owner() -> AppError {
    AppError::BadRequest("x-session-cart-id header is required for guest carts".into())
}

fn require_owner(owner: CartOwner) -> AppResult<()> {
    if owner.user_id.is_none() && owner.session_cart_id.is_none() {
        return Err(missing_owner());
    }
    Ok(())
}
