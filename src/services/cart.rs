use crate::{
    entities::{cart_item, order_line, product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use metrics::gauge;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Who a cart belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartOwner {
    User(Uuid),
    Session(String),
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{}", id),
            CartOwner::Session(session) => write!(f, "session:{}", session),
        }
    }
}

/// Pre-checkout product quantities. Prices are never stored here; they are
/// read live whenever the cart is valued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: BTreeMap<Uuid, u32>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quantity_of(&self, product_id: Uuid) -> Option<u32> {
        self.lines.get(&product_id).copied()
    }

    pub fn lines(&self) -> impl Iterator<Item = (Uuid, u32)> + '_ {
        self.lines.iter().map(|(id, qty)| (*id, *qty))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct products
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Total units across all lines
    pub fn item_count(&self) -> u32 {
        self.lines.values().sum()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn put(&mut self, product_id: Uuid, quantity: u32) {
        if quantity == 0 {
            self.lines.remove(&product_id);
        } else {
            self.lines.insert(product_id, quantity);
        }
    }

    fn take(&mut self, product_id: Uuid) -> Option<u32> {
        self.lines.remove(&product_id)
    }
}

impl FromIterator<(Uuid, u32)> for Cart {
    fn from_iter<I: IntoIterator<Item = (Uuid, u32)>>(iter: I) -> Self {
        let mut cart = Cart::new();
        for (product_id, quantity) in iter {
            let merged = cart.quantity_of(product_id).unwrap_or(0).saturating_add(quantity);
            cart.put(product_id, merged);
        }
        cart
    }
}

fn stock_of(product: &product::Model) -> u32 {
    u32::try_from(product.stock).unwrap_or(0)
}

fn positive_quantity(quantity: i64) -> Result<u32, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::InvalidQuantity(format!(
            "Quantity must be greater than zero, got {}",
            quantity
        )));
    }
    u32::try_from(quantity)
        .map_err(|_| ServiceError::InvalidQuantity(format!("Quantity {} is too large", quantity)))
}

/// Where carts live between requests
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn load(&self, owner: &CartOwner) -> Result<Cart, ServiceError>;
    async fn save(&self, owner: &CartOwner, cart: &Cart) -> Result<(), ServiceError>;
    async fn clear(&self, owner: &CartOwner) -> Result<(), ServiceError>;
}

/// How long an untouched anonymous cart is kept
pub const DEFAULT_SESSION_CART_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct SessionCart {
    cart: Cart,
    touched_at: Instant,
}

impl SessionCart {
    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.touched_at) > ttl
    }
}

/// Process-local carts, used for anonymous sessions. Carts expire `ttl`
/// after they were last read or written.
#[derive(Debug)]
pub struct InMemoryCartStore {
    carts: DashMap<CartOwner, SessionCart>,
    ttl: Duration,
}

impl Default for InMemoryCartStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_CART_TTL)
    }
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            carts: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.carts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carts.is_empty()
    }

    /// Drops every cart idle for longer than the ttl, returning how many went
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.carts.len();
        self.carts.retain(|_, entry| !entry.expired(now, self.ttl));
        let removed = before.saturating_sub(self.carts.len());
        gauge!("bakery_carts.sessions", self.carts.len() as f64);
        if removed > 0 {
            debug!(removed, "Expired session carts dropped");
        }
        removed
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn load(&self, owner: &CartOwner) -> Result<Cart, ServiceError> {
        let now = Instant::now();
        if let Some(mut entry) = self.carts.get_mut(owner) {
            if !entry.expired(now, self.ttl) {
                entry.touched_at = now;
                return Ok(entry.cart.clone());
            }
        }
        self.carts
            .remove_if(owner, |_, entry| entry.expired(now, self.ttl));
        Ok(Cart::default())
    }

    async fn save(&self, owner: &CartOwner, cart: &Cart) -> Result<(), ServiceError> {
        if cart.is_empty() {
            self.carts.remove(owner);
        } else {
            self.carts.insert(
                owner.clone(),
                SessionCart {
                    cart: cart.clone(),
                    touched_at: Instant::now(),
                },
            );
        }
        Ok(())
    }

    async fn clear(&self, owner: &CartOwner) -> Result<(), ServiceError> {
        self.carts.remove(owner);
        Ok(())
    }
}

/// Signed-in users' carts in the `cart_items` table
#[derive(Clone)]
pub struct DbCartStore {
    db: Arc<DatabaseConnection>,
}

impl DbCartStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn user_of(owner: &CartOwner) -> Result<Uuid, ServiceError> {
        match owner {
            CartOwner::User(id) => Ok(*id),
            CartOwner::Session(_) => Err(ServiceError::InternalError(
                "session carts are not persisted".to_string(),
            )),
        }
    }
}

#[async_trait]
impl CartStore for DbCartStore {
    async fn load(&self, owner: &CartOwner) -> Result<Cart, ServiceError> {
        let user_id = Self::user_of(owner)?;
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| u32::try_from(row.quantity).ok().map(|q| (row.product_id, q)))
            .collect())
    }

    async fn save(&self, owner: &CartOwner, cart: &Cart) -> Result<(), ServiceError> {
        let user_id = Self::user_of(owner)?;
        let txn = self.db.begin().await?;

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        for (product_id, quantity) in cart.lines() {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                product_id: Set(product_id),
                quantity: Set(i32::try_from(quantity).unwrap_or(i32::MAX)),
                added_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn clear(&self, owner: &CartOwner) -> Result<(), ServiceError> {
        let user_id = Self::user_of(owner)?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}

/// Routes user carts to the database and session carts to memory
pub struct HybridCartStore {
    users: DbCartStore,
    sessions: InMemoryCartStore,
}

impl HybridCartStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self::with_session_ttl(db, DEFAULT_SESSION_CART_TTL)
    }

    pub fn with_session_ttl(db: Arc<DatabaseConnection>, ttl: Duration) -> Self {
        Self {
            users: DbCartStore::new(db),
            sessions: InMemoryCartStore::with_ttl(ttl),
        }
    }

    pub fn sessions(&self) -> &InMemoryCartStore {
        &self.sessions
    }

    fn route(&self, owner: &CartOwner) -> &dyn CartStore {
        match owner {
            CartOwner::User(_) => &self.users,
            CartOwner::Session(_) => &self.sessions,
        }
    }
}

#[async_trait]
impl CartStore for HybridCartStore {
    async fn load(&self, owner: &CartOwner) -> Result<Cart, ServiceError> {
        self.route(owner).load(owner).await
    }

    async fn save(&self, owner: &CartOwner, cart: &Cart) -> Result<(), ServiceError> {
        self.route(owner).save(owner, cart).await
    }

    async fn clear(&self, owner: &CartOwner) -> Result<(), ServiceError> {
        self.route(owner).clear(owner).await
    }
}

/// A cart line valued at the current catalog price
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub available_stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub total: Decimal,
}

/// Cart operations. Each one takes the cart explicitly and checks it against
/// the catalog; persistence goes through the [`CartStore`].
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    store: Arc<dyn CartStore>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        store: Arc<dyn CartStore>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            store,
            event_sender,
        }
    }

    pub fn store(&self) -> &Arc<dyn CartStore> {
        &self.store
    }

    async fn active_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.active)
            .ok_or(ServiceError::ProductNotFound(product_id))
    }

    /// Adds `quantity` units, merging with what is already in the cart. The
    /// resulting line never exceeds the product's current stock.
    #[instrument(skip(self, cart))]
    pub async fn add_item(
        &self,
        cart: &mut Cart,
        product_id: Uuid,
        quantity: i64,
    ) -> Result<u32, ServiceError> {
        let requested = positive_quantity(quantity)?;
        let product = self.active_product(product_id).await?;
        let stock = stock_of(&product);

        if stock == 0 {
            return Err(ServiceError::OutOfStock(product_id));
        }

        let wanted = cart
            .quantity_of(product_id)
            .unwrap_or(0)
            .saturating_add(requested);
        let granted = wanted.min(stock);
        if granted < wanted {
            debug!(%product_id, wanted, stock, "Cart quantity clamped to stock");
        }

        cart.put(product_id, granted);
        Ok(granted)
    }

    /// Drops a product from the cart. Absent products are ignored.
    pub fn remove_item(&self, cart: &mut Cart, product_id: Uuid) -> Option<u32> {
        cart.take(product_id)
    }

    /// Replaces the quantity of a line, clamped to stock
    #[instrument(skip(self, cart))]
    pub async fn set_quantity(
        &self,
        cart: &mut Cart,
        product_id: Uuid,
        quantity: i64,
    ) -> Result<u32, ServiceError> {
        let requested = positive_quantity(quantity)?;
        let product = self.active_product(product_id).await?;
        let stock = stock_of(&product);

        if stock == 0 {
            return Err(ServiceError::OutOfStock(product_id));
        }

        let granted = requested.min(stock);
        cart.put(product_id, granted);
        Ok(granted)
    }

    pub fn clear(&self, cart: &mut Cart) {
        cart.clear();
    }

    /// Values each line at the live catalog price. Products that have been
    /// removed or deactivated since they were added contribute nothing.
    #[instrument(skip(self, cart))]
    pub async fn summarize(&self, cart: &Cart) -> Result<CartSummary, ServiceError> {
        if cart.is_empty() {
            return Ok(CartSummary {
                lines: Vec::new(),
                item_count: 0,
                total: Decimal::ZERO,
            });
        }

        let ids: Vec<Uuid> = cart.lines().map(|(id, _)| id).collect();
        let products: BTreeMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .filter(product::Column::Active.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut lines = Vec::with_capacity(products.len());
        let mut total = Decimal::ZERO;
        for (product_id, quantity) in cart.lines() {
            let Some(p) = products.get(&product_id) else {
                continue;
            };
            let subtotal = order_line::checked_subtotal(p.price, i64::from(quantity))
                .and_then(|subtotal| {
                    total = total.checked_add(subtotal)?;
                    Some(subtotal)
                })
                .ok_or_else(|| {
                    ServiceError::ValidationError("Cart total is out of range".to_string())
                })?;
            lines.push(CartLine {
                product_id,
                name: p.name.clone(),
                quantity,
                unit_price: p.price,
                subtotal,
                available_stock: p.stock,
            });
        }

        Ok(CartSummary {
            item_count: lines.iter().map(|l| l.quantity).sum(),
            total,
            lines,
        })
    }

    pub async fn total_value(&self, cart: &Cart) -> Result<Decimal, ServiceError> {
        Ok(self.summarize(cart).await?.total)
    }

    pub async fn load(&self, owner: &CartOwner) -> Result<Cart, ServiceError> {
        self.store.load(owner).await
    }

    pub async fn save(&self, owner: &CartOwner, cart: &Cart) -> Result<(), ServiceError> {
        self.store.save(owner, cart).await
    }

    /// Empties the stored cart for `owner`
    pub async fn clear_stored(&self, owner: &CartOwner) -> Result<(), ServiceError> {
        self.store.clear(owner).await?;
        self.event_sender
            .send_or_log(Event::CartCleared {
                owner: owner.to_string(),
                at: Utc::now(),
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_counts_units_and_lines() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let cart: Cart = vec![(a, 2), (b, 1), (a, 1)].into_iter().collect();
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.quantity_of(a), Some(3));
    }

    #[test]
    fn zero_quantity_drops_the_line() {
        let a = Uuid::new_v4();
        let mut cart = Cart::new();
        cart.put(a, 3);
        cart.put(a, 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn non_positive_quantities_are_invalid() {
        assert!(matches!(
            positive_quantity(0),
            Err(ServiceError::InvalidQuantity(_))
        ));
        assert!(matches!(
            positive_quantity(-4),
            Err(ServiceError::InvalidQuantity(_))
        ));
        assert_eq!(positive_quantity(7).unwrap(), 7);
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_and_clears() {
        let store = InMemoryCartStore::new();
        let owner = CartOwner::Session("sess-42".into());
        let cart: Cart = vec![(Uuid::new_v4(), 2)].into_iter().collect();

        store.save(&owner, &cart).await.unwrap();
        assert_eq!(store.load(&owner).await.unwrap(), cart);

        store.clear(&owner).await.unwrap();
        assert!(store.load(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn idle_session_carts_are_swept() {
        let store = InMemoryCartStore::with_ttl(Duration::from_secs(60));
        let cart: Cart = vec![(Uuid::new_v4(), 1)].into_iter().collect();
        for n in 0..3 {
            store
                .save(&CartOwner::Session(format!("sess-{n}")), &cart)
                .await
                .unwrap();
        }
        assert_eq!(store.len(), 3);

        assert_eq!(store.sweep_expired(), 0);
        assert_eq!(store.sweep_expired_at(Instant::now() + Duration::from_secs(61)), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expired_cart_loads_empty() {
        let store = InMemoryCartStore::with_ttl(Duration::from_millis(5));
        let owner = CartOwner::Session("sess-idle".into());
        let cart: Cart = vec![(Uuid::new_v4(), 2)].into_iter().collect();
        store.save(&owner, &cart).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.load(&owner).await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn owner_display_is_prefixed() {
        let id = Uuid::nil();
        assert_eq!(
            CartOwner::User(id).to_string(),
            format!("user:{}", id)
        );
        assert_eq!(CartOwner::Session("s".into()).to_string(), "session:s");
    }
}
