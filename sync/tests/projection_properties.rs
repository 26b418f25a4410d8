//! Property-based tests for receipt projections
//!
//! - Convergence: a projection fed the change feed matches a fresh snapshot
//! - Idempotence: replaying or duplicating events changes nothing

use proptest::prelude::*;
use rust_decimal::Decimal;
use tabsplit_ledger::{
    config::StoreConfig, BackingStore, Cents, MemoryStore, NewItem, NewParticipant, NewReceipt,
    Publication,
};
use tabsplit_sync::ReceiptProjection;

#[derive(Debug, Clone)]
enum Op {
    Claim { item: usize, guest: usize, quarters: i64 },
    Unclaim { item: usize, guest: usize },
    Pay { guest: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..3, 0usize..3, 1i64..=8)
            .prop_map(|(item, guest, quarters)| Op::Claim { item, guest, quarters }),
        2 => (0usize..3, 0usize..3).prop_map(|(item, guest)| Op::Unclaim { item, guest }),
        1 => (0usize..3).prop_map(|guest| Op::Pay { guest }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_projection_converges_to_snapshot(
        ops in prop::collection::vec(op_strategy(), 1..30),
        duplicate_every in 1usize..5,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let store = MemoryStore::spawn(&StoreConfig::default());
            let receipt = store
                .insert_receipt(NewReceipt {
                    merchant_name: "Food Hall".into(),
                    subtotal: Cents::new(6000),
                    total: Cents::new(6000),
                    ..Default::default()
                })
                .await
                .unwrap();
            let items = store
                .replace_items(
                    receipt.id,
                    vec![
                        NewItem::new("Noodles", Cents::new(1200), 2),
                        NewItem::new("Bao", Cents::new(450), 4),
                        NewItem::new("Tea", Cents::new(300), 6),
                    ],
                )
                .await
                .unwrap();
            store.set_publication(receipt.id, Publication::Shared).await.unwrap();

            let mut guests = Vec::new();
            for i in 0..3 {
                let guest = store
                    .insert_participant(NewParticipant {
                        receipt_id: receipt.id,
                        display_name: format!("Guest {i}"),
                        identity: None,
                    })
                    .await
                    .unwrap();
                guests.push(guest.id);
            }

            let mut feed = store.subscribe(receipt.id);
            let mut projection = ReceiptProjection::hydrate(store.snapshot(receipt.id).await.unwrap());

            for op in &ops {
                // Overclaims and absent claims are expected outcomes here
                let _ = match *op {
                    Op::Claim { item, guest, quarters } => store
                        .upsert_claim(items[item].id, guests[guest], Decimal::new(quarters * 25, 2))
                        .await
                        .map(|_| ()),
                    Op::Unclaim { item, guest } => {
                        match store.find_claim(items[item].id, guests[guest]).await.unwrap() {
                            Some(claim) => store.delete_claim(claim.id).await.map(|_| ()),
                            None => Ok(()),
                        }
                    }
                    Op::Pay { guest } => store
                        .set_payment_status(guests[guest], tabsplit_ledger::PaymentStatus::Paid)
                        .await
                        .map(|_| ()),
                };
            }

            let mut events = Vec::new();
            while let Ok(event) = feed.try_recv() {
                events.push(event);
            }

            for (index, event) in events.iter().enumerate() {
                projection.apply(event);
                if index % duplicate_every == 0 {
                    projection.apply(event);
                }
            }
            // Full replay
            for event in &events {
                projection.apply(event);
            }

            let fresh = ReceiptProjection::hydrate(store.snapshot(receipt.id).await.unwrap());

            let mut expected = fresh.claims();
            let mut actual = projection.claims();
            expected.sort_by_key(|c| c.id);
            actual.sort_by_key(|c| c.id);
            assert_eq!(actual, expected);
            assert_eq!(projection.participants(), fresh.participants());
            assert_eq!(projection.status(), fresh.status());
            assert_eq!(projection.settlement(), fresh.settlement());
            assert_eq!(projection.watermark(), fresh.hydrated_at());

            for item in &items {
                assert!(projection.claimed(item.id) <= item.quantity);
            }
        });
    }
}
