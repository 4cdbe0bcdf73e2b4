mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use bakery_api::{
    errors::ServiceError,
    services::catalog::{ActiveFilter, CreateCategoryInput, CreateProductInput},
};
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn writes_move_updated_at_forward() {
    let app = TestApp::new().await;
    let catalog = &app.state.services.catalog;
    let pan = app.seed_product("Pan Francés", dec!(2500), 10).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let repriced = catalog.update_product_price(pan.id, dec!(2700)).await.unwrap();
    assert!(repriced.updated_at > pan.updated_at);
    assert_eq!(repriced.created_at, pan.created_at);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let hidden = catalog.set_product_active(pan.id, false).await.unwrap();
    assert!(hidden.updated_at > repriced.updated_at);

    let panaderia = catalog
        .create_category(CreateCategoryInput {
            name: "Panadería".to_string(),
            description: None,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let closed = catalog.set_category_active(panaderia.id, false).await.unwrap();
    assert!(!closed.active);
    assert!(closed.updated_at > panaderia.updated_at);
}

#[tokio::test]
async fn prices_beyond_the_money_column_are_rejected() {
    let app = TestApp::new().await;
    let catalog = &app.state.services.catalog;
    let huge = Decimal::MAX / Decimal::from(2);

    let err = catalog
        .create_product(CreateProductInput {
            name: "Torta Imposible".to_string(),
            description: None,
            price: huge,
            stock: 1,
            category_id: None,
            image_url: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let pan = app.seed_product("Pan Francés", dec!(2500), 10).await;
    let err = catalog.update_product_price(pan.id, huge).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    let err = catalog
        .update_product_price(pan.id, dec!(2500.125))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let unchanged = catalog
        .require_product(pan.id, ActiveFilter::All)
        .await
        .unwrap();
    assert_eq!(unchanged.price, dec!(2500));
}

#[tokio::test]
async fn favorites_toggle_on_and_off() {
    let app = TestApp::new().await;
    let catalog = &app.state.services.catalog;
    let croissant = app.seed_product("Croissant", dec!(3500), 10).await;
    let cafe = app.seed_product("Café Americano", dec!(2800), 10).await;
    let user_id = Uuid::new_v4();

    assert!(catalog.toggle_favorite(user_id, croissant.id).await.unwrap());
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(catalog.toggle_favorite(user_id, cafe.id).await.unwrap());

    let names: Vec<String> = catalog
        .list_favorites(user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Café Americano", "Croissant"]);

    assert!(!catalog.toggle_favorite(user_id, croissant.id).await.unwrap());
    let remaining = catalog.list_favorites(user_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, cafe.id);

    // Someone else's list is separate
    assert!(catalog.list_favorites(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn inactive_products_cannot_become_favorites() {
    let app = TestApp::new().await;
    let catalog = &app.state.services.catalog;
    let viejo = app.seed_product("Pan Viejo", dec!(900), 3).await;
    let user_id = Uuid::new_v4();

    assert!(catalog.toggle_favorite(user_id, viejo.id).await.unwrap());
    catalog.set_product_active(viejo.id, false).await.unwrap();
    assert!(catalog.list_favorites(user_id).await.unwrap().is_empty());

    // Removing still works once the product is hidden
    assert!(!catalog.toggle_favorite(user_id, viejo.id).await.unwrap());

    let err = catalog.toggle_favorite(user_id, viejo.id).await.unwrap_err();
    assert_matches!(err, ServiceError::ProductNotFound(id) if id == viejo.id);

    let err = catalog
        .toggle_favorite(user_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductNotFound(_));
}
