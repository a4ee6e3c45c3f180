use std::sync::Arc;

use obra_api::{
    auth::Actor,
    config::AppConfig,
    entities::stock_movement::MovementKind,
    events::EventSender,
    repositories::InMemoryStore,
    services::{materials::NewMaterial, stock_ledger::MovementContext, AppServices},
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

fn kind() -> impl Strategy<Value = MovementKind> {
    prop_oneof![
        Just(MovementKind::Entry),
        Just(MovementKind::Exit),
        Just(MovementKind::Adjustment),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stock_never_goes_negative_and_matches_the_ledger(
        initial in 0u32..200,
        moves in prop::collection::vec((kind(), 0u32..120), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let (tx, mut rx) = mpsc::channel(16);
            tokio::spawn(async move { while rx.recv().await.is_some() {} });
            let services = AppServices::new(
                Arc::new(InMemoryStore::new()),
                EventSender::new(tx),
                &AppConfig::in_memory(),
            );

            let material = services
                .catalog
                .create_material(
                    NewMaterial {
                        name: "Aggregate".into(),
                        category: None,
                        unit: "t".into(),
                        unit_price: Decimal::ONE,
                        minimum_stock: Decimal::from(10),
                        initial_quantity: Decimal::from(initial),
                        warehouse_id: None,
                    },
                    Actor::anonymous(),
                )
                .await
                .unwrap();

            let mut expected = Decimal::from(initial);
            for (kind, qty) in moves {
                let qty = Decimal::from(qty);
                let result = services
                    .ledger
                    .record(material.id, kind, qty, MovementContext::new("property"))
                    .await;
                match kind.apply(expected, qty) {
                    Ok(after) if kind == MovementKind::Adjustment || qty > Decimal::ZERO => {
                        let entry = result.unwrap();
                        assert_eq!(entry.stock_before, expected);
                        assert_eq!(entry.stock_after, after);
                        expected = after;
                    }
                    _ => assert!(result.is_err()),
                }

                let current = services.catalog.get_material(material.id).await.unwrap();
                assert!(current.quantity >= Decimal::ZERO);
                assert_eq!(current.quantity, expected);
            }
        });
    }
}
