use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::*;
use crate::cart::{CartService, MemoryCartCache, MemoryCartStore};
use crate::checkout::MemoryCheckoutRepository;
use crate::clients::{Product, SimulatedPaymentGateway, StaticProductCatalog};
use crate::inventory::MemoryInventoryStore;
use crate::orders::MemoryOrderStore;

fn meta() -> RequestMeta {
    RequestMeta {
        user_id: Some("123".to_string()),
        request_id: Some("req-1".to_string()),
    }
}

fn cart_rpc() -> CartRpc {
    let service = CartService::new(
        Arc::new(MemoryCartStore::new()),
        Arc::new(MemoryCartCache::new()),
    );
    CartRpc::new(Arc::new(service))
}

#[tokio::test]
async fn rejects_non_positive_user_id() {
    let rpc = cart_rpc();
    let err = rpc.get_cart(&meta(), 0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert_eq!(err.kind.http_status(), 400);
}

#[tokio::test]
async fn rejects_quantity_outside_range() {
    let rpc = cart_rpc();

    for quantity in [0, -1, 100] {
        let err = rpc
            .add_item(&meta(), 123, 1, quantity)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument, "quantity {quantity}");
    }

    // Boundary values pass.
    rpc.add_item(&meta(), 123, 1, 1).await.unwrap();
    rpc.add_item(&meta(), 123, 1, 99).await.unwrap();
}

#[tokio::test]
async fn rejects_non_positive_product_id() {
    let rpc = cart_rpc();
    let err = rpc.add_item(&meta(), 123, 0, 1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn missing_item_maps_to_not_found() {
    let rpc = cart_rpc();
    rpc.add_item(&meta(), 123, 1, 2).await.unwrap();

    let err = rpc.remove_item(&meta(), 123, 99).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.kind.http_status(), 404);
}

#[tokio::test]
async fn checkout_requires_an_idempotency_key() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let carts = Arc::new(CartService::new(
        Arc::new(MemoryCartStore::new()),
        Arc::new(MemoryCartCache::new()),
    ));
    let coordinator = Arc::new(crate::checkout::CheckoutCoordinator::new(
        repo,
        carts,
        Arc::new(StaticProductCatalog::new()),
        Arc::new(MemoryInventoryStore::new()),
        Arc::new(SimulatedPaymentGateway::new()),
        Duration::from_secs(5),
    ));
    let rpc = CheckoutRpc::new(coordinator);

    let err = rpc.initiate_checkout(&meta(), 123, "").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let err = rpc.initiate_checkout(&meta(), -5, "K1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn empty_cart_maps_to_failed_precondition() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let carts = Arc::new(CartService::new(
        Arc::new(MemoryCartStore::new()),
        Arc::new(MemoryCartCache::new()),
    ));
    let coordinator = Arc::new(crate::checkout::CheckoutCoordinator::new(
        repo,
        carts,
        Arc::new(StaticProductCatalog::new()),
        Arc::new(MemoryInventoryStore::new()),
        Arc::new(SimulatedPaymentGateway::new()),
        Duration::from_secs(5),
    ));
    let rpc = CheckoutRpc::new(coordinator);

    let err = rpc.initiate_checkout(&meta(), 123, "K1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    // Folded to 400 at the gateway, not 412.
    assert_eq!(err.kind.http_status(), 400);
}

#[tokio::test]
async fn insufficient_stock_maps_to_failed_precondition() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let store = Arc::new(MemoryCartStore::new());
    let carts = Arc::new(CartService::new(store, Arc::new(MemoryCartCache::new())));
    let catalog = Arc::new(StaticProductCatalog::new());
    let inventory = Arc::new(MemoryInventoryStore::new());

    catalog
        .seed(vec![Product {
            id: 1,
            name: "Widget".to_string(),
            price: 29.99,
        }])
        .await;
    inventory.set_stock(1, 1).await.unwrap();
    carts.add_item("123", 1, 5).await.unwrap();

    let coordinator = Arc::new(crate::checkout::CheckoutCoordinator::new(
        repo,
        carts,
        catalog,
        inventory,
        Arc::new(SimulatedPaymentGateway::new()),
        Duration::from_secs(5),
    ));
    let rpc = CheckoutRpc::new(coordinator);

    let err = rpc.initiate_checkout(&meta(), 123, "K1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::FailedPrecondition);
}

#[tokio::test]
async fn orders_surface_validates_and_maps() {
    let rpc = OrdersRpc::new(Arc::new(MemoryOrderStore::new()));

    let err = rpc.get_order(&meta(), "").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let err = rpc.get_order(&meta(), "not-a-uuid").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let err = rpc
        .get_order(&meta(), &Uuid::new_v4().to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let orders = rpc.list_orders(&meta(), 123).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn inventory_surface_validates_and_maps() {
    let store = Arc::new(MemoryInventoryStore::new());
    store.set_stock(1, 5).await.unwrap();
    let rpc = InventoryRpc::new(store);

    let err = rpc.reserve(&meta(), "", vec![]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let reservation_id = rpc
        .reserve(
            &meta(),
            "checkout-1",
            vec![crate::domain::ReservationItem {
                product_id: 1,
                quantity: 2,
            }],
        )
        .await
        .unwrap();

    rpc.confirm(&meta(), &reservation_id).await.unwrap();

    // Confirming twice is a precondition failure, observable by the caller.
    let err = rpc.confirm(&meta(), &reservation_id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::FailedPrecondition);

    let err = rpc
        .release(&meta(), &Uuid::new_v4().to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn http_projection_matches_the_gateway_table() {
    assert_eq!(ErrorKind::InvalidArgument.http_status(), 400);
    assert_eq!(ErrorKind::NotFound.http_status(), 404);
    assert_eq!(ErrorKind::AlreadyExists.http_status(), 409);
    assert_eq!(ErrorKind::Unauthenticated.http_status(), 401);
    assert_eq!(ErrorKind::PermissionDenied.http_status(), 403);
    assert_eq!(ErrorKind::FailedPrecondition.http_status(), 400);
    assert_eq!(ErrorKind::ResourceExhausted.http_status(), 429);
    assert_eq!(ErrorKind::Unavailable.http_status(), 503);
    assert_eq!(ErrorKind::DeadlineExceeded.http_status(), 504);
    assert_eq!(ErrorKind::Internal.http_status(), 500);
}

#[test]
fn outbound_metadata_preserves_inbound_keys() {
    let meta = meta();
    let pairs = meta.outbound();
    assert!(pairs.contains(&("user-id", "123".to_string())));
    assert!(pairs.contains(&("request-id", "req-1".to_string())));

    let empty = RequestMeta::default();
    assert!(empty.outbound().is_empty());
}
