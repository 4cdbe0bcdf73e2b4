mod common;

use assert_matches::assert_matches;
use bakery_api::{
    entities::MovementDirection,
    errors::ServiceError,
    services::inventory::{MovementFilter, RecordMovementInput, UpdateSupplyItemInput},
};
use common::TestApp;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn movement(
    supply_item_id: Uuid,
    direction: MovementDirection,
    quantity: Decimal,
    reason: &str,
) -> RecordMovementInput {
    RecordMovementInput {
        supply_item_id,
        direction,
        quantity,
        reason: reason.to_string(),
        actor_id: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn outgoing_flour_drops_below_minimum() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let harina = app.seed_supply("Harina", dec!(50), dec!(10)).await;
    assert_eq!(harina.current_quantity, dec!(50));
    assert!(!inventory.is_low_stock(harina.id).await.unwrap());

    let recorded = inventory
        .record_movement(movement(
            harina.id,
            MovementDirection::Salida,
            dec!(45),
            "producción de pan",
        ))
        .await
        .unwrap();
    assert_eq!(recorded.resulting_quantity, dec!(5));

    let harina = inventory.get_supply_item(harina.id).await.unwrap();
    assert_eq!(harina.current_quantity, dec!(5));
    assert!(inventory.is_low_stock(harina.id).await.unwrap());

    let low = inventory.list_low_stock().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].id, harina.id);

    let report = app.state.services.reports.low_stock_report().await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].shortfall, dec!(5));
}

#[tokio::test]
async fn oversized_salida_floors_at_zero() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let azucar = app.seed_supply("Azúcar", dec!(5), dec!(2)).await;

    let recorded = inventory
        .record_movement(movement(
            azucar.id,
            MovementDirection::Salida,
            dec!(20),
            "merma",
        ))
        .await
        .unwrap();

    assert_eq!(recorded.quantity, dec!(20));
    assert_eq!(recorded.resulting_quantity, Decimal::ZERO);
    let azucar = inventory.get_supply_item(azucar.id).await.unwrap();
    assert_eq!(azucar.current_quantity, Decimal::ZERO);
}

#[tokio::test]
async fn invalid_movements_change_nothing() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let huevos = app.seed_supply("Huevos", dec!(30), dec!(10)).await;

    let err = inventory
        .record_movement(movement(huevos.id, MovementDirection::Entrada, dec!(0), "compra"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidMovement(_));

    let err = inventory
        .record_movement(movement(huevos.id, MovementDirection::Entrada, dec!(12), "  "))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidMovement(_));

    let missing = Uuid::new_v4();
    let err = inventory
        .record_movement(movement(missing, MovementDirection::Entrada, dec!(12), "compra"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::SupplyItemNotFound(id) if id == missing);

    let huevos = inventory.get_supply_item(huevos.id).await.unwrap();
    assert_eq!(huevos.current_quantity, dec!(30));
    let movements = inventory
        .list_movements(&MovementFilter {
            supply_item_id: Some(huevos.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(movements.len(), 1, "only the opening balance is booked");
}

#[tokio::test]
async fn updating_an_item_never_touches_its_quantity() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let mantequilla = app.seed_supply("Mantequilla", dec!(8), dec!(3)).await;

    let updated = inventory
        .update_supply_item(
            mantequilla.id,
            UpdateSupplyItemInput {
                minimum_quantity: Some(dec!(10)),
                supplier: Some("Lácteos del Valle".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.current_quantity, dec!(8));
    assert_eq!(updated.minimum_quantity, dec!(10));
    assert!(updated.is_low_stock());
}

#[tokio::test]
async fn summary_totals_each_direction() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let harina = app.seed_supply("Harina", dec!(50), dec!(10)).await;

    for (direction, quantity) in [
        (MovementDirection::Salida, dec!(12)),
        (MovementDirection::Entrada, dec!(25)),
        (MovementDirection::Salida, dec!(3)),
    ] {
        inventory
            .record_movement(movement(harina.id, direction, quantity, "turno"))
            .await
            .unwrap();
    }

    let summary = inventory.movement_summary(None, None).await.unwrap();
    assert_eq!(summary.entrada.movements, 2);
    assert_eq!(summary.entrada.quantity, dec!(75));
    assert_eq!(summary.salida.movements, 2);
    assert_eq!(summary.salida.quantity, dec!(15));

    let salidas = inventory
        .list_movements(&MovementFilter {
            direction: Some(MovementDirection::Salida),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(salidas.len(), 2);
    assert!(salidas
        .iter()
        .all(|m| m.direction == MovementDirection::Salida));
}

#[tokio::test]
async fn quantities_beyond_the_ledger_columns_are_refused() {
    let app = TestApp::new().await;
    let inventory = &app.state.services.inventory;
    let harina = app.seed_supply("Harina", dec!(999999990), dec!(10)).await;

    for quantity in [Decimal::MAX, dec!(1.0005), dec!(1000000000)] {
        let err = inventory
            .record_movement(movement(harina.id, MovementDirection::Entrada, quantity, "compra"))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidMovement(_));
    }

    // Fits on its own but not on top of the balance
    let err = inventory
        .record_movement(movement(harina.id, MovementDirection::Entrada, dec!(20), "compra"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidMovement(_));

    let harina = inventory.get_supply_item(harina.id).await.unwrap();
    assert_eq!(harina.current_quantity, dec!(999999990));
    let movements = inventory
        .list_movements(&MovementFilter {
            supply_item_id: Some(harina.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
}

fn direction_strategy() -> impl Strategy<Value = MovementDirection> {
    prop_oneof![
        Just(MovementDirection::Entrada),
        Just(MovementDirection::Salida)
    ]
}

/// Grams on a kilogram ledger: up to three decimals
fn kilograms(raw: i64) -> Decimal {
    Decimal::new(raw, 3)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn ledger_balance_matches_replayed_movements(
        opening in 0i64..100_000,
        moves in prop::collection::vec((direction_strategy(), 1i64..60_000), 1..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let app = TestApp::new().await;
            let inventory = &app.state.services.inventory;
            let item = app
                .seed_supply("Levadura", kilograms(opening), dec!(1))
                .await;

            let mut expected = kilograms(opening);
            for (direction, raw) in &moves {
                let quantity = kilograms(*raw);
                let recorded = inventory
                    .record_movement(movement(item.id, *direction, quantity, "prueba"))
                    .await
                    .unwrap();

                expected = match direction {
                    MovementDirection::Entrada => expected + quantity,
                    MovementDirection::Salida if quantity > expected => Decimal::ZERO,
                    MovementDirection::Salida => expected - quantity,
                };
                assert_eq!(recorded.resulting_quantity, expected);
            }

            let item = inventory.get_supply_item(item.id).await.unwrap();
            assert_eq!(item.current_quantity, expected);
        });
    }
}
