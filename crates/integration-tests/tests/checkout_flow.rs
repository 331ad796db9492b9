//! End-to-end checkout: cart to order, and the last-unit race.

use driftwood_core::{Color, ItemId, ProductId, Size};
use driftwood_engine::{CartMirror, CheckoutError, DocumentStore};
use rust_decimal_macros::dec;

use driftwood_integration_tests::{TestContext, shipping, snapshot, usd};

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
async fn test_order_placement_consumes_stock_and_clears_cart() {
    let ctx = TestContext::new();
    ctx.seed_stock("coat-01", "M", 5).await;
    ctx.seed_stock("scarf-02", "One Size", 10).await;

    let session = ctx.session("shopper@example.com").await;
    session
        .add_to_cart(
            ProductId::new("coat-01"),
            snapshot("Wool Coat"),
            Size::new("M"),
            Color::new("navy"),
            2,
            usd(500),
        )
        .await
        .expect("add coat");
    session
        .add_to_cart(
            ProductId::new("scarf-02"),
            snapshot("Scarf"),
            Size::new("One Size"),
            Color::new("rust"),
            1,
            usd(300),
        )
        .await
        .expect("add scarf");

    let cart = session.cart().await;
    assert_eq!(cart.total().amount, dec!(1300));

    let order_id = session.place_order(shipping()).await.expect("place order");

    // Stock decremented by exactly the ordered quantities.
    let ledger = ctx.engine.ledger();
    assert_eq!(
        ledger
            .read(&ProductId::new("coat-01"), &Size::new("M"))
            .await
            .expect("read"),
        3
    );
    assert_eq!(
        ledger
            .read(&ProductId::new("scarf-02"), &Size::new("One Size"))
            .await
            .expect("read"),
        9
    );

    // The order record snapshots the cart and total.
    let order_doc = ctx
        .store
        .get("orders", &order_id.to_string())
        .await
        .expect("store read")
        .expect("order exists");
    assert_eq!(order_doc["total"]["amount"], "1300");
    assert_eq!(order_doc["items"].as_array().map(Vec::len), Some(2));

    // The cart is empty afterwards, remotely and locally.
    assert!(session.cart().await.is_empty());
    let mirrored = ctx
        .mirror
        .load(&driftwood_core::UserId::new("shopper@example.com"))
        .await
        .expect("mirror read")
        .expect("mirror exists");
    assert!(mirrored.is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_two_buyers_race_for_the_last_unit() {
    let ctx = TestContext::new();
    ctx.seed_stock("p1", "M", 1).await;

    let first = ctx.session("buyer-one").await;
    let second = ctx.session("buyer-two").await;
    for session in [&first, &second] {
        session
            .add_to_cart(
                ProductId::new("p1"),
                snapshot("Wool Coat"),
                Size::new("M"),
                Color::new("navy"),
                1,
                usd(500),
            )
            .await
            .expect("add to cart");
    }

    let (a, b) = tokio::join!(
        first.place_order(shipping()),
        second.place_order(shipping())
    );

    // Exactly one buyer wins; the loser sees the specific shortage.
    let (winner, loser) = match (&a, &b) {
        (Ok(_), Err(_)) => (&a, &b),
        (Err(_), Ok(_)) => (&b, &a),
        other => panic!("expected exactly one success, got {other:?}"),
    };
    assert!(winner.is_ok());
    match loser {
        Err(CheckoutError::InsufficientStock {
            requested,
            available,
            ..
        }) => {
            assert_eq!(*requested, 1);
            assert_eq!(*available, 0);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(
        ctx.engine
            .ledger()
            .read(&ProductId::new("p1"), &Size::new("M"))
            .await
            .expect("read"),
        0
    );
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_empty_cart_and_incomplete_shipping_are_rejected() {
    let ctx = TestContext::new();
    ctx.seed_stock("p1", "M", 5).await;
    let session = ctx.session("u1").await;

    assert!(matches!(
        session.place_order(shipping()).await,
        Err(CheckoutError::Validation(_))
    ));

    session
        .add_to_cart(
            ProductId::new("p1"),
            snapshot("Wool Coat"),
            Size::new("M"),
            Color::new("navy"),
            1,
            usd(500),
        )
        .await
        .expect("add to cart");

    let mut incomplete = shipping();
    incomplete.recipient = String::new();
    assert!(matches!(
        session.place_order(incomplete).await,
        Err(CheckoutError::Validation(_))
    ));

    // Nothing was decremented by the failed attempts.
    assert_eq!(
        ctx.engine
            .ledger()
            .read(&ProductId::new("p1"), &Size::new("M"))
            .await
            .expect("read"),
        5
    );
}

#[tokio::test]
async fn test_untracked_variant_fails_checkout_but_not_display() {
    let ctx = TestContext::new();
    let session = ctx.session("u1").await;

    // Display: absence reads as zero, not an error.
    let levels = ctx
        .engine
        .get_availability(&ProductId::new("ghost"))
        .await
        .expect("availability");
    assert!(levels.is_empty());

    // Checkout: absence is a hard per-line failure.
    session
        .add_to_cart(
            ProductId::new("ghost"),
            snapshot("Ghost Jacket"),
            Size::new("M"),
            Color::new("navy"),
            1,
            usd(200),
        )
        .await
        .expect("add to cart");
    assert!(matches!(
        session.place_order(shipping()).await,
        Err(CheckoutError::Unavailable { .. })
    ));
}

// =============================================================================
// Cart Operations
// =============================================================================

#[tokio::test]
async fn test_cart_operations_keep_total_consistent() {
    let ctx = TestContext::new();
    let session = ctx.session("u1").await;

    let coat = session
        .add_to_cart(
            ProductId::new("p1"),
            snapshot("Wool Coat"),
            Size::new("M"),
            Color::new("navy"),
            2,
            usd(500),
        )
        .await
        .expect("add coat");
    session
        .add_to_cart(
            ProductId::new("p2"),
            snapshot("Scarf"),
            Size::new("One Size"),
            Color::new("rust"),
            1,
            usd(300),
        )
        .await
        .expect("add scarf");
    assert_eq!(session.cart().await.total().amount, dec!(1300));

    session.remove_from_cart(&coat).await.expect("remove coat");
    assert_eq!(session.cart().await.total().amount, dec!(300));

    session.clear_cart().await;
    session.clear_cart().await;
    assert_eq!(session.cart().await.total().amount, dec!(0));

    assert!(matches!(
        session.remove_from_cart(&ItemId::new("gone")).await,
        Err(driftwood_engine::CartError::ItemNotFound(_))
    ));
}
