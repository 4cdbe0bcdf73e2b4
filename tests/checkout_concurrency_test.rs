mod common;

use assert_matches::assert_matches;
use bakery_api::{
    entities::{order, order_line},
    errors::ServiceError,
};
use common::{delivery, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use uuid::Uuid;

const BUYERS: usize = 6;

#[tokio::test]
async fn last_unit_is_sold_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    let app = TestApp::on_file(&dir.path().join("bakery.db")).await;
    let torta = app.seed_product("Torta de Chocolate", dec!(32000), 1).await;

    let mut carts = Vec::with_capacity(BUYERS);
    for _ in 0..BUYERS {
        carts.push(app.cart_with(&[(torta.id, 1)]).await);
    }

    let mut tasks = Vec::with_capacity(BUYERS);
    for mut cart in carts {
        let orders = app.state.services.orders.clone();
        tasks.push(tokio::spawn(async move {
            orders
                .place_order(Uuid::new_v4(), &mut cart, delivery())
                .await
        }));
    }

    let mut placed = 0;
    for task in tasks {
        match task.await.expect("checkout task") {
            Ok(_) => placed += 1,
            // Losers either see the stock gone or lose the SQLite write lock
            Err(err) => assert_matches!(
                err,
                ServiceError::InsufficientStock { .. } | ServiceError::DatabaseError(_)
            ),
        }
    }

    assert_eq!(placed, 1, "exactly one buyer gets the last unit");
    assert_eq!(app.stock_of(torta.id).await, 0);

    let db = &*app.state.db;
    assert_eq!(order::Entity::find().count(db).await.unwrap(), 1);
    assert_eq!(order_line::Entity::find().count(db).await.unwrap(), 1);
}
