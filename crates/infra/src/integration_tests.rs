//! Integration tests for the sale pipeline.
//!
//! Tests: TransactionEngine → UnitOfWork → InMemoryStore
//!
//! Verifies:
//! - Stock never goes negative and always matches the sale ledger
//! - Concurrent sales against one item are serialized
//! - Failed units of work leave no partial effects
//! - Sale reversal restores stock exactly

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use stockroom_core::{Entity, ItemId, Money, SaleId};
    use stockroom_inventory::StockItemDraft;
    use stockroom_sales::{FailureCause, SaleError};

    use crate::engine::TransactionEngine;
    use crate::store::{InMemoryStore, LedgerStore, SaleStore, StockItemStore};

    fn setup() -> (TransactionEngine, InMemoryStore) {
        setup_with_timeout(Duration::from_secs(5))
    }

    fn setup_with_timeout(lock_timeout: Duration) -> (TransactionEngine, InMemoryStore) {
        let store = InMemoryStore::new(lock_timeout);
        let engine = TransactionEngine::new(Arc::new(store.clone()));
        (engine, store)
    }

    async fn stock(store: &InMemoryStore, quantity: i64) -> ItemId {
        store
            .create_item(StockItemDraft {
                name: "Widget".to_string(),
                quantity,
                amount: Money::new(dec!(2.50)).unwrap(),
            })
            .await
            .unwrap()
            .id()
    }

    async fn quantity(store: &InMemoryStore, id: ItemId) -> i64 {
        store.get_item(id).await.unwrap().unwrap().quantity()
    }

    #[tokio::test]
    async fn sell_oversell_and_reverse_scenario() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;

        let sale = engine.create_sale(item, 4).await.unwrap();
        assert_eq!(sale.amount.amount(), dec!(10.00));
        assert_eq!(sale.quantity, 4);
        assert_eq!(quantity(&store, item).await, 6);

        let err = engine.create_sale(item, 7).await.unwrap_err();
        assert_eq!(
            err,
            SaleError::InsufficientStock {
                item_id: item,
                requested: 7,
                available: 6,
            }
        );
        assert_eq!(quantity(&store, item).await, 6);

        engine.delete_sale(sale.id).await.unwrap();
        assert_eq!(quantity(&store, item).await, 10);
        assert!(store.list_sales().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_touching_storage() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;

        assert_eq!(engine.create_sale(item, 0).await, Err(SaleError::InvalidQuantity(0)));
        assert_eq!(engine.create_sale(item, -3).await, Err(SaleError::InvalidQuantity(-3)));
        assert_eq!(
            engine.create_sale(ItemId::new(999), 1).await,
            Err(SaleError::item_not_found())
        );
        assert_eq!(engine.delete_sale(SaleId::new(999)).await, Err(SaleError::sale_not_found()));
        assert_eq!(quantity(&store, item).await, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_concurrent_sales_cannot_both_succeed() {
        let (engine, store) = setup();
        let item = stock(&store, 5).await;

        let (a, b) = tokio::join!(engine.create_sale(item, 3), engine.create_sale(item, 3));

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(SaleError::InsufficientStock { available: 2, .. })))
        );
        assert_eq!(quantity(&store, item).await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sales_on_different_items_do_not_wait_for_each_other() {
        let (engine, store) = setup_with_timeout(Duration::from_millis(50));
        let a = stock(&store, 5).await;
        let b = stock(&store, 5).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_item(a).await.unwrap();

        let sale = engine.create_sale(b, 2).await.unwrap();
        assert_eq!(sale.item_id, b);
        assert_eq!(quantity(&store, b).await, 3);

        holder.rollback().await.unwrap();
        assert_eq!(quantity(&store, a).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reversal_racing_a_sale_keeps_ledgers_consistent() {
        let (engine, store) = setup();
        let item = stock(&store, 5).await;
        let first = engine.create_sale(item, 3).await.unwrap();

        // Stock is 2, so the sale of 4 only fits once the reversal has landed.
        let (reversed, sold) = tokio::join!(engine.delete_sale(first.id), engine.create_sale(item, 4));
        reversed.unwrap();

        let sales = store.list_sales().await.unwrap();
        let sold_total: i64 = sales.iter().map(|s| s.quantity).sum();
        assert_eq!(quantity(&store, item).await, 5 - sold_total);
        match sold {
            Ok(sale) => {
                assert_eq!(sales, vec![sale]);
                assert_eq!(quantity(&store, item).await, 1);
            }
            Err(err) => {
                assert_eq!(
                    err,
                    SaleError::InsufficientStock {
                        item_id: item,
                        requested: 4,
                        available: 2,
                    }
                );
                assert!(sales.is_empty());
                assert_eq!(quantity(&store, item).await, 5);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reversals_of_one_sale_restore_stock_once() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;
        let sale = engine.create_sale(item, 4).await.unwrap();

        let (a, b) = tokio::join!(engine.delete_sale(sale.id), engine.delete_sale(sale.id));

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| *r == Err(SaleError::sale_not_found())));
        assert_eq!(quantity(&store, item).await, 10);
        assert!(store.list_sales().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn row_locks_are_not_retained_after_units_of_work() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;

        for id in 1..=200 {
            assert_eq!(engine.delete_sale(SaleId::new(id)).await, Err(SaleError::sale_not_found()));
        }
        let sale = engine.create_sale(item, 1).await.unwrap();
        engine.delete_sale(sale.id).await.unwrap();

        assert_eq!(store.registered_row_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_concurrent_sales_sell_exactly_the_stock() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.create_sale(item, 1).await })
            })
            .collect();

        let mut sold = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                sold += 1;
            }
        }

        assert_eq!(sold, 10);
        assert_eq!(quantity(&store, item).await, 0);
        assert_eq!(store.list_sales().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_trace() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;

        store.fail_next_commit();
        let err = engine.create_sale(item, 4).await.unwrap_err();
        assert!(matches!(err, SaleError::TransactionFailure(FailureCause::Storage(_))));
        assert_eq!(quantity(&store, item).await, 10);
        assert!(store.list_sales().await.unwrap().is_empty());

        // Same for a reversal.
        let sale = engine.create_sale(item, 4).await.unwrap();
        store.fail_next_commit();
        assert!(engine.delete_sale(sale.id).await.unwrap_err().is_retryable());
        assert_eq!(quantity(&store, item).await, 6);
        assert_eq!(store.list_sales().await.unwrap(), vec![sale]);
    }

    #[tokio::test]
    async fn reversal_restores_stock_exactly() {
        let (engine, store) = setup();
        let item = stock(&store, 17).await;

        let first = engine.create_sale(item, 4).await.unwrap();
        let second = engine.create_sale(item, 9).await.unwrap();
        assert_eq!(quantity(&store, item).await, 4);

        engine.delete_sale(first.id).await.unwrap();
        assert_eq!(quantity(&store, item).await, 8);
        engine.delete_sale(second.id).await.unwrap();
        assert_eq!(quantity(&store, item).await, 17);

        // Reversing twice is a NotFound, not a second restore.
        assert_eq!(engine.delete_sale(first.id).await, Err(SaleError::sale_not_found()));
        assert_eq!(quantity(&store, item).await, 17);
    }

    #[tokio::test]
    async fn sale_amount_is_fixed_at_sale_time() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;
        let sale = engine.create_sale(item, 2).await.unwrap();

        store
            .update_item(
                item,
                StockItemDraft {
                    name: "Widget".to_string(),
                    quantity: 8,
                    amount: Money::new(dec!(99)).unwrap(),
                },
            )
            .await
            .unwrap();

        let sales = store.list_sales().await.unwrap();
        assert_eq!(sales[0].id, sale.id);
        assert_eq!(sales[0].amount.amount(), dec!(5.00));
    }

    #[tokio::test]
    async fn lock_wait_is_bounded() {
        let (engine, store) = setup_with_timeout(Duration::from_millis(50));
        let item = stock(&store, 10).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_item(item).await.unwrap();

        assert_eq!(
            engine.create_sale(item, 1).await,
            Err(SaleError::TransactionFailure(FailureCause::LockTimeout))
        );
        assert_eq!(quantity(&store, item).await, 10);

        holder.rollback().await.unwrap();
        assert!(engine.create_sale(item, 1).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_caller_does_not_interrupt_unit_of_work() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_item(item).await.unwrap();

        let caller = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.create_sale(item, 2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();
        holder.rollback().await.unwrap();

        let mut observed = 10;
        for _ in 0..100 {
            observed = quantity(&store, item).await;
            if observed == 8 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(observed, 8);
        assert_eq!(store.list_sales().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reads_are_stable_between_mutations() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;
        engine.create_sale(item, 3).await.unwrap();

        let first = store.get_item(item).await.unwrap();
        let second = store.get_item(item).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn sold_items_cannot_be_deleted_administratively() {
        let (engine, store) = setup();
        let item = stock(&store, 10).await;
        let sale = engine.create_sale(item, 1).await.unwrap();

        assert!(store.delete_item(item).await.is_err());
        engine.delete_sale(sale.id).await.unwrap();
        assert!(store.delete_item(item).await.is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn stock_always_matches_sale_ledger(
            baselines in prop::collection::vec(0i64..20, 1..4),
            ops in prop::collection::vec((any::<bool>(), 0usize..8, 1i64..8), 1..40),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let (engine, store) = setup();
                let mut items = Vec::new();
                for b in &baselines {
                    items.push((stock(&store, *b).await, *b));
                }

                for (sell, pick, qty) in ops {
                    if sell {
                        let (id, _) = items[pick % items.len()];
                        let _ = engine.create_sale(id, qty).await;
                    } else {
                        let sales = store.list_sales().await.unwrap();
                        if !sales.is_empty() {
                            let victim = &sales[pick % sales.len()];
                            engine.delete_sale(victim.id).await.unwrap();
                        }
                    }

                    let mut sold: HashMap<ItemId, i64> = HashMap::new();
                    for s in store.list_sales().await.unwrap() {
                        *sold.entry(s.item_id).or_default() += s.quantity;
                    }
                    for (id, baseline) in &items {
                        let q = quantity(&store, *id).await;
                        assert!(q >= 0);
                        assert_eq!(q, baseline - sold.get(id).copied().unwrap_or(0));
                    }
                }
            });
        }
    }
}
