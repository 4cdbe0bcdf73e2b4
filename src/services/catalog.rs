use crate::{
    entities::{category, favorite, product, DecimalColumn},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Which rows a catalog read should see with respect to soft deletion.
/// Every read takes one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActiveFilter {
    ActiveOnly,
    InactiveOnly,
    All,
}

impl ActiveFilter {
    pub fn matches(self, active: bool) -> bool {
        match self {
            ActiveFilter::ActiveOnly => active,
            ActiveFilter::InactiveOnly => !active,
            ActiveFilter::All => true,
        }
    }

    fn apply<E, C>(self, query: Select<E>, column: C) -> Select<E>
    where
        E: EntityTrait,
        C: ColumnTrait,
    {
        match self {
            ActiveFilter::ActiveOnly => query.filter(column.eq(true)),
            ActiveFilter::InactiveOnly => query.filter(column.eq(false)),
            ActiveFilter::All => query,
        }
    }
}

/// Product listing filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub active: ActiveFilter,
    pub category_id: Option<Uuid>,
    /// Substring matched against name and description
    pub search: Option<String>,
    pub in_stock_only: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ProductFilter {
    pub fn new(active: ActiveFilter) -> Self {
        Self {
            active,
            category_id: None,
            search: None,
            in_stock_only: false,
            limit: None,
            offset: None,
        }
    }

    fn query(&self) -> Select<product::Entity> {
        let mut query = self
            .active
            .apply(product::Entity::find(), product::Column::Active);

        if let Some(category_id) = self.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }

        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(term))
                    .add(product::Column::Description.contains(term)),
            );
        }

        if self.in_stock_only {
            query = query.filter(product::Column::Stock.gt(0));
        }

        query
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    let message = if *price <= Decimal::ZERO {
        "Price must be greater than zero"
    } else if !DecimalColumn::PRICE.holds(*price) {
        "Price allows at most 2 decimals and 10 integer digits"
    } else {
        return Ok(());
    };
    let mut err = ValidationError::new("price");
    err.message = Some(message.into());
    Err(err)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
    pub category_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
}

/// Descriptive fields only. Price and stock have their own operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    pub description: Option<String>,
}

/// Products and categories, the read-mostly side of the shop
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Looks a product up by id, honouring the soft-delete filter
    #[instrument(skip(self))]
    pub async fn get_product(
        &self,
        id: Uuid,
        active: ActiveFilter,
    ) -> Result<Option<product::Model>, ServiceError> {
        let found = product::Entity::find_by_id(id).one(&*self.db).await?;
        Ok(found.filter(|p| active.matches(p.active)))
    }

    /// Like [`get_product`](Self::get_product) but missing products are an error
    pub async fn require_product(
        &self,
        id: Uuid,
        active: ActiveFilter,
    ) -> Result<product::Model, ServiceError> {
        self.get_product(id, active)
            .await?
            .ok_or(ServiceError::ProductNotFound(id))
    }

    /// Newest first
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = filter
            .query()
            .order_by_desc(product::Column::CreatedAt)
            .order_by_asc(product::Column::Name);

        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = filter.offset {
            query = query.offset(offset);
        }

        Ok(query.all(&*self.db).await?)
    }

    /// Number of products matching the filter, ignoring limit and offset
    pub async fn count_products(&self, filter: &ProductFilter) -> Result<u64, ServiceError> {
        Ok(filter.query().count(&*self.db).await?)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        if let Some(category_id) = input.category_id {
            self.require_category(category_id).await?;
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            price: Set(input.price),
            stock: Set(input.stock),
            category_id: Set(input.category_id),
            image_url: Set(input.image_url),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %model.id, price = %model.price, "Product created");
        Ok(model)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let existing = self.require_product(id, ActiveFilter::All).await?;
        if let Some(category_id) = input.category_id {
            self.require_category(category_id).await?;
        }

        let mut model: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            model.name = Set(name.trim().to_string());
        }
        if let Some(description) = input.description {
            model.description = Set(Some(description));
        }
        if let Some(category_id) = input.category_id {
            model.category_id = Set(Some(category_id));
        }
        if let Some(image_url) = input.image_url {
            model.image_url = Set(Some(image_url));
        }
        model.updated_at = Set(Utc::now());

        Ok(model.update(&*self.db).await?)
    }

    /// Changes the live price. Orders already placed keep the price they were
    /// sold at.
    #[instrument(skip(self))]
    pub async fn update_product_price(
        &self,
        id: Uuid,
        new_price: Decimal,
    ) -> Result<product::Model, ServiceError> {
        validate_price(&new_price).map_err(|e| {
            ServiceError::ValidationError(
                e.message.map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()),
            )
        })?;

        let existing = self.require_product(id, ActiveFilter::All).await?;
        let old_price = existing.price;

        let mut model: product::ActiveModel = existing.into();
        model.price = Set(new_price);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;

        info!(product_id = %id, %old_price, %new_price, "Product price updated");
        self.event_sender
            .send_or_log(Event::ProductPriceChanged {
                product_id: id,
                old_price,
                new_price,
            })
            .await;

        Ok(updated)
    }

    /// Adds freshly baked units to a product's stock
    #[instrument(skip(self))]
    pub async fn restock_product(
        &self,
        id: Uuid,
        quantity: u32,
    ) -> Result<product::Model, ServiceError> {
        let quantity = i32::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                ServiceError::InvalidQuantity(format!("Cannot restock {} units", quantity))
            })?;

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ProductNotFound(id));
        }

        info!(product_id = %id, quantity, "Product restocked");
        self.require_product(id, ActiveFilter::All).await
    }

    /// Soft delete or restore a product
    #[instrument(skip(self))]
    pub async fn set_product_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<product::Model, ServiceError> {
        let existing = self.require_product(id, ActiveFilter::All).await?;
        if existing.active == active {
            return Ok(existing);
        }

        let mut model: product::ActiveModel = existing.into();
        model.active = Set(active);
        model.updated_at = Set(Utc::now());
        let updated = model.update(&*self.db).await?;

        if !active {
            self.event_sender
                .send_or_log(Event::ProductDeactivated(id))
                .await;
        }
        Ok(updated)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let model = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        Ok(model)
    }

    pub async fn list_categories(
        &self,
        active: ActiveFilter,
    ) -> Result<Vec<category::Model>, ServiceError> {
        Ok(active
            .apply(category::Entity::find(), category::Column::Active)
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn require_category(&self, id: Uuid) -> Result<category::Model, ServiceError> {
        category::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::CategoryNotFound(id))
    }

    /// Soft delete or restore a category. Its products are left untouched.
    #[instrument(skip(self))]
    pub async fn set_category_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<category::Model, ServiceError> {
        let existing = self.require_category(id).await?;
        let mut model: category::ActiveModel = existing.into();
        model.active = Set(active);
        model.updated_at = Set(Utc::now());
        Ok(model.update(&*self.db).await?)
    }

    /// Marks the product as a favorite of the user, or unmarks it when it
    /// already is one. Returns whether it is a favorite afterwards.
    ///
    /// Only active products can be added; removal always works.
    #[instrument(skip(self))]
    pub async fn toggle_favorite(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, ServiceError> {
        let existing = favorite::Entity::find()
            .filter(favorite::Column::UserId.eq(user_id))
            .filter(favorite::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        if let Some(existing) = existing {
            favorite::Entity::delete_by_id(existing.id)
                .exec(&*self.db)
                .await?;
            info!(%user_id, %product_id, "Favorite removed");
            return Ok(false);
        }

        self.require_product(product_id, ActiveFilter::ActiveOnly)
            .await?;
        favorite::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        info!(%user_id, %product_id, "Favorite added");
        Ok(true)
    }

    /// The user's favorite products that are still for sale, most recently
    /// marked first
    #[instrument(skip(self))]
    pub async fn list_favorites(&self, user_id: Uuid) -> Result<Vec<product::Model>, ServiceError> {
        let rows = favorite::Entity::find()
            .filter(favorite::Column::UserId.eq(user_id))
            .order_by_desc(favorite::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(_, product)| product)
            .filter(|p| p.active)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_filter_matches() {
        assert!(ActiveFilter::ActiveOnly.matches(true));
        assert!(!ActiveFilter::ActiveOnly.matches(false));
        assert!(ActiveFilter::InactiveOnly.matches(false));
        assert!(ActiveFilter::All.matches(false));
    }

    #[test]
    fn product_input_requires_positive_price() {
        let input = CreateProductInput {
            name: "Pan Francés".into(),
            description: None,
            price: Decimal::ZERO,
            stock: 10,
            category_id: None,
            image_url: None,
        };
        assert!(input.validate().is_err());

        let input = CreateProductInput {
            price: Decimal::new(2500, 0),
            ..input
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn price_must_fit_the_money_column() {
        assert!(validate_price(&Decimal::new(250050, 2)).is_ok());
        assert!(validate_price(&Decimal::new(2500505, 3)).is_err());
        assert!(validate_price(&(Decimal::MAX / Decimal::from(2))).is_err());
    }
}
