mod common;

use assert_matches::assert_matches;
use bakery_api::{
    errors::ServiceError,
    services::cart::{Cart, CartOwner},
};
use common::TestApp;
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn adding_more_than_stock_is_clamped() {
    let app = TestApp::new().await;
    let torta = app.seed_product("Torta de Chocolate", dec!(32000), 3).await;
    let carts = &app.state.services.cart;
    let mut cart = Cart::new();

    assert_eq!(carts.add_item(&mut cart, torta.id, 2).await.unwrap(), 2);
    assert_eq!(carts.add_item(&mut cart, torta.id, 5).await.unwrap(), 3);
    assert_eq!(cart.quantity_of(torta.id), Some(3));

    let summary = carts.summarize(&cart).await.unwrap();
    assert_eq!(summary.item_count, 3);
    assert_eq!(summary.total, dec!(96000));
}

#[tokio::test]
async fn out_of_stock_products_cannot_be_added() {
    let app = TestApp::new().await;
    let agotado = app.seed_product("Pan de Bono", dec!(1200), 0).await;
    let mut cart = Cart::new();

    let err = app
        .state
        .services
        .cart
        .add_item(&mut cart, agotado.id, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OutOfStock(id) if id == agotado.id);
    assert!(cart.is_empty());
}

#[tokio::test]
async fn unknown_products_are_not_found() {
    let app = TestApp::new().await;
    let mut cart = Cart::new();
    let missing = Uuid::new_v4();

    let err = app
        .state
        .services
        .cart
        .add_item(&mut cart, missing, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductNotFound(id) if id == missing);
}

#[rstest]
#[case(0)]
#[case(-2)]
#[tokio::test]
async fn set_quantity_rejects_non_positive_values(#[case] quantity: i64) {
    let app = TestApp::new().await;
    let pan = app.seed_product("Pan Francés", dec!(2500), 10).await;
    let mut cart = app.cart_with(&[(pan.id, 2)]).await;

    let err = app
        .state
        .services
        .cart
        .set_quantity(&mut cart, pan.id, quantity)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidQuantity(_));
    assert_eq!(cart.quantity_of(pan.id), Some(2));
}

#[tokio::test]
async fn set_quantity_replaces_and_clamps() {
    let app = TestApp::new().await;
    let pan = app.seed_product("Pan Francés", dec!(2500), 10).await;
    let mut cart = app.cart_with(&[(pan.id, 2)]).await;
    let carts = &app.state.services.cart;

    assert_eq!(carts.set_quantity(&mut cart, pan.id, 4).await.unwrap(), 4);
    assert_eq!(carts.set_quantity(&mut cart, pan.id, 40).await.unwrap(), 10);
}

#[tokio::test]
async fn removing_an_absent_product_is_a_no_op() {
    let app = TestApp::new().await;
    let pan = app.seed_product("Pan Francés", dec!(2500), 10).await;
    let mut cart = app.cart_with(&[(pan.id, 1)]).await;
    let carts = &app.state.services.cart;

    assert_eq!(carts.remove_item(&mut cart, Uuid::new_v4()), None);
    assert_eq!(carts.remove_item(&mut cart, pan.id), Some(1));
    assert!(cart.is_empty());
}

#[tokio::test]
async fn total_follows_live_prices_and_skips_inactive_products() {
    let app = TestApp::new().await;
    let croissant = app.seed_product("Croissant", dec!(3500), 10).await;
    let cafe = app.seed_product("Café Americano", dec!(2800), 10).await;
    let cart = app.cart_with(&[(croissant.id, 2), (cafe.id, 1)]).await;
    let carts = &app.state.services.cart;
    let catalog = &app.state.services.catalog;

    assert_eq!(carts.total_value(&cart).await.unwrap(), dec!(9800));

    catalog
        .update_product_price(croissant.id, dec!(4000))
        .await
        .unwrap();
    assert_eq!(carts.total_value(&cart).await.unwrap(), dec!(10800));

    catalog.set_product_active(cafe.id, false).await.unwrap();
    assert_eq!(carts.total_value(&cart).await.unwrap(), dec!(8000));

    assert_eq!(
        carts.total_value(&Cart::new()).await.unwrap(),
        Decimal::ZERO
    );
}

#[tokio::test]
async fn signed_in_carts_are_persisted() {
    let app = TestApp::new().await;
    let pan = app.seed_product("Pan Francés", dec!(2500), 10).await;
    let galletas = app.seed_product("Galletas de Avena", dec!(1500), 10).await;
    let carts = &app.state.services.cart;
    let owner = CartOwner::User(Uuid::new_v4());

    let cart = app.cart_with(&[(pan.id, 2), (galletas.id, 3)]).await;
    carts.save(&owner, &cart).await.unwrap();

    let reloaded = carts.load(&owner).await.unwrap();
    assert_eq!(reloaded, cart);

    carts.clear_stored(&owner).await.unwrap();
    assert!(carts.load(&owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn guest_carts_live_in_memory_per_session() {
    let app = TestApp::new().await;
    let pan = app.seed_product("Pan Francés", dec!(2500), 10).await;
    let carts = &app.state.services.cart;
    let first = CartOwner::Session("sess-a".to_string());
    let second = CartOwner::Session("sess-b".to_string());

    let cart = app.cart_with(&[(pan.id, 1)]).await;
    carts.save(&first, &cart).await.unwrap();

    assert_eq!(carts.load(&first).await.unwrap().quantity_of(pan.id), Some(1));
    assert!(carts.load(&second).await.unwrap().is_empty());
}
