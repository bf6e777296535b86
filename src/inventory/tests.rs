use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::*;
use crate::domain::{ReservationItem, ReservationStatus};

fn item(product_id: i64, quantity: i32) -> ReservationItem {
    ReservationItem {
        product_id,
        quantity,
    }
}

async fn store_with_stock(pairs: &[(i64, i32)]) -> MemoryInventoryStore {
    let store = MemoryInventoryStore::new();
    for (product_id, quantity) in pairs {
        store.set_stock(*product_id, *quantity).await.unwrap();
    }
    store
}

#[tokio::test]
async fn reserve_holds_stock() {
    let store = store_with_stock(&[(1, 10)]).await;

    let reservation = store.reserve("c1", vec![item(1, 4)]).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Reserved);

    let stock = store.get_stock(&[1]).await.unwrap();
    assert_eq!(stock[0].total, 10);
    assert_eq!(stock[0].reserved, 4);
    assert_eq!(stock[0].available(), 6);
}

#[tokio::test]
async fn reserve_unknown_product_fails_without_mutation() {
    let store = store_with_stock(&[(1, 10)]).await;

    let result = store.reserve("c1", vec![item(1, 2), item(99, 1)]).await;
    assert!(matches!(result, Err(InventoryError::ProductNotFound(99))));

    // The known product must not carry a half-reservation.
    let stock = store.get_stock(&[1]).await.unwrap();
    assert_eq!(stock[0].reserved, 0);
}

#[tokio::test]
async fn reserve_insufficient_stock_fails_without_mutation() {
    let store = store_with_stock(&[(1, 10), (2, 1)]).await;

    let result = store.reserve("c1", vec![item(1, 5), item(2, 3)]).await;
    assert!(matches!(
        result,
        Err(InventoryError::InsufficientStock {
            product_id: 2,
            requested: 3,
            available: 1,
        })
    ));

    let stock = store.get_stock(&[1, 2]).await.unwrap();
    assert!(stock.iter().all(|s| s.reserved == 0));
}

#[tokio::test]
async fn release_restores_availability() {
    let store = store_with_stock(&[(1, 10)]).await;

    let reservation = store.reserve("c1", vec![item(1, 4)]).await.unwrap();
    store.release(reservation.id).await.unwrap();

    let stock = store.get_stock(&[1]).await.unwrap();
    assert_eq!(stock[0].available(), 10);

    let reservation = store.get_reservation(reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Released);
}

#[tokio::test]
async fn confirm_deducts_total_and_reserved() {
    let store = store_with_stock(&[(1, 10)]).await;

    let before = store.get_stock(&[1]).await.unwrap()[0].available();
    let reservation = store.reserve("c1", vec![item(1, 4)]).await.unwrap();
    store.confirm(reservation.id).await.unwrap();

    let stock = store.get_stock(&[1]).await.unwrap()[0];
    assert_eq!(stock.total, 6);
    assert_eq!(stock.reserved, 0);
    // Available drops only by the sold quantity.
    assert_eq!(stock.available(), before - 4);
}

#[tokio::test]
async fn second_release_reports_invalid_status() {
    let store = store_with_stock(&[(1, 10)]).await;

    let reservation = store.reserve("c1", vec![item(1, 4)]).await.unwrap();
    store.release(reservation.id).await.unwrap();

    // The caller must observe that nothing happened the second time.
    let result = store.release(reservation.id).await;
    assert!(matches!(
        result,
        Err(InventoryError::InvalidStatus {
            status: ReservationStatus::Released,
            ..
        })
    ));

    let stock = store.get_stock(&[1]).await.unwrap();
    assert_eq!(stock[0].reserved, 0);
}

#[tokio::test]
async fn confirm_after_release_reports_invalid_status() {
    let store = store_with_stock(&[(1, 10)]).await;

    let reservation = store.reserve("c1", vec![item(1, 4)]).await.unwrap();
    store.release(reservation.id).await.unwrap();

    let result = store.confirm(reservation.id).await;
    assert!(matches!(result, Err(InventoryError::InvalidStatus { .. })));
}

#[tokio::test]
async fn confirm_unknown_reservation_fails() {
    let store = store_with_stock(&[(1, 10)]).await;
    let result = store.confirm(Uuid::new_v4()).await;
    assert!(matches!(result, Err(InventoryError::ReservationNotFound(_))));
}

#[tokio::test]
async fn expired_reservation_cannot_be_confirmed() {
    let store = MemoryInventoryStore::with_ttl(Duration::from_millis(0));
    store.set_stock(1, 10).await.unwrap();

    let reservation = store.reserve("c1", vec![item(1, 4)]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let result = store.confirm(reservation.id).await;
    assert!(matches!(result, Err(InventoryError::ReservationExpired(_))));
}

#[tokio::test]
async fn sweeper_expires_overdue_reservations() {
    let store = MemoryInventoryStore::with_ttl(Duration::from_millis(0));
    store.set_stock(1, 10).await.unwrap();

    let reservation = store.reserve("c1", vec![item(1, 4)]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(store.sweep_expired().await, 1);

    let stock = store.get_stock(&[1]).await.unwrap();
    assert_eq!(stock[0].available(), 10);

    let reservation = store.get_reservation(reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Expired);
}

#[tokio::test]
async fn sweeper_leaves_live_reservations_alone() {
    let store = store_with_stock(&[(1, 10)]).await;

    let reservation = store.reserve("c1", vec![item(1, 4)]).await.unwrap();
    assert_eq!(store.sweep_expired().await, 0);

    let reservation = store.get_reservation(reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Reserved);
}

#[tokio::test]
async fn background_sweeper_task_expires_and_stops() {
    let store = Arc::new(MemoryInventoryStore::with_ttl(Duration::from_millis(0)));
    store.set_stock(1, 10).await.unwrap();
    store.reserve("c1", vec![item(1, 4)]).await.unwrap();

    let handle = spawn_sweeper(store.clone(), Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.stop();

    let stock = store.get_stock(&[1]).await.unwrap();
    assert_eq!(stock[0].available(), 10);
}

#[tokio::test]
async fn concurrent_reserves_never_oversell() {
    const WORKERS: usize = 32;
    const STOCK: i32 = 10;

    let store = Arc::new(MemoryInventoryStore::new());
    store.set_stock(1, STOCK).await.unwrap();

    let mut handles = Vec::with_capacity(WORKERS);
    for i in 0..WORKERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.reserve(&format!("c{i}"), vec![item(1, 1)]).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, STOCK as usize);

    let stock = store.get_stock(&[1]).await.unwrap()[0];
    assert_eq!(stock.reserved, STOCK);
    assert_eq!(stock.available(), 0);
}

#[tokio::test]
async fn concurrent_multi_item_reserves_are_all_or_nothing() {
    const WORKERS: usize = 16;

    let store = Arc::new(MemoryInventoryStore::new());
    store.set_stock(1, 8).await.unwrap();
    store.set_stock(2, 4).await.unwrap();

    let mut handles = Vec::with_capacity(WORKERS);
    for i in 0..WORKERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .reserve(&format!("c{i}"), vec![item(1, 2), item(2, 1)])
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    // Product 1 admits four reservations of 2 before product 2 runs out at
    // the same point, so both counters drain together.
    assert_eq!(succeeded, 4);

    let stock = store.get_stock(&[1, 2]).await.unwrap();
    assert_eq!(stock[0].reserved, 8);
    assert_eq!(stock[1].reserved, 4);
    assert!(stock.iter().all(|s| s.reserved <= s.total));
}
