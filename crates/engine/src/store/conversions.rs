//! Normalization between stored documents and canonical types.
//!
//! Pre-existing data contains documents written by earlier storefront
//! revisions with ad-hoc field names (`qty` for `quantity`, a bare `price`
//! number instead of a unit-price object, flat item fields instead of a
//! product snapshot). All of that is absorbed here, at the storage
//! boundary; the rest of the engine only ever sees canonical shapes.
//!
//! Encoding always writes the canonical shape, so legacy documents are
//! upgraded the first time they are saved back.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use driftwood_core::{Cart, CartItem, StockKey, StockRow, UserId};

use super::{StoreError, collections};

/// Decode a stock row, filling identity fields from the storage key and
/// accepting legacy quantity field names.
pub(crate) fn stock_row_from_doc(key: &StockKey, mut value: Value) -> Result<StockRow, StoreError> {
    let storage_key = key.storage_key();
    let obj = value
        .as_object_mut()
        .ok_or_else(|| corrupt(collections::STOCK, &storage_key, "document is not an object"))?;

    // Legacy rows used assorted names for the stock level.
    if !obj.contains_key("stock") {
        for legacy in ["qty", "quantity", "count"] {
            if let Some(level) = obj.remove(legacy) {
                obj.insert("stock".to_owned(), level);
                break;
            }
        }
    }

    // The oldest rows carry no identity fields at all; the key is the
    // only authority for (product, size) there.
    ensure(obj, "product_id", || json!(key.product_id.as_str()));
    ensure(obj, "size", || json!(key.size.as_str()));
    ensure(obj, "updated_at", || json!(DateTime::<Utc>::UNIX_EPOCH));

    serde_json::from_value(value)
        .map_err(|e| corrupt(collections::STOCK, &storage_key, &e.to_string()))
}

/// Encode a stock row in the canonical shape.
pub(crate) fn stock_row_to_doc(row: &StockRow) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(row)?)
}

/// Decode a cart document.
///
/// The total is always recomputed from the decoded lines via
/// [`Cart::from_parts`]; a persisted total is never trusted.
pub(crate) fn cart_from_doc(user_id: &UserId, mut value: Value) -> Result<Cart, StoreError> {
    let obj = value.as_object_mut().ok_or_else(|| {
        corrupt(
            collections::CARTS,
            user_id.as_str(),
            "document is not an object",
        )
    })?;

    // Legacy carts called the items array "lines".
    if !obj.contains_key("items")
        && let Some(lines) = obj.remove("lines")
    {
        obj.insert("items".to_owned(), lines);
    }

    let raw_items = match obj.remove("items") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(corrupt(
                collections::CARTS,
                user_id.as_str(),
                "items is not an array",
            ));
        }
        None => Vec::new(),
    };

    let mut items = Vec::with_capacity(raw_items.len());
    for mut item in raw_items {
        normalize_item(&mut item);
        let item: CartItem = serde_json::from_value(item)
            .map_err(|e| corrupt(collections::CARTS, user_id.as_str(), &e.to_string()))?;
        items.push(item);
    }

    let created_at = timestamp(obj.get("created_at"));
    let updated_at = timestamp(obj.get("updated_at"));

    Ok(Cart::from_parts(
        user_id.clone(),
        items,
        created_at,
        updated_at,
    ))
}

/// Encode a cart in the canonical shape.
pub(crate) fn cart_to_doc(cart: &Cart) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(cart)?)
}

/// Normalize one cart line in place.
fn normalize_item(item: &mut Value) {
    let Some(obj) = item.as_object_mut() else {
        return;
    };

    rename(obj, "qty", "quantity");

    // Legacy lines carried a bare price instead of a unit-price object.
    if !obj.contains_key("unit_price")
        && let Some(price) = obj.remove("price")
    {
        let amount = match price {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s,
            other => other.to_string(),
        };
        obj.insert(
            "unit_price".to_owned(),
            json!({ "amount": amount, "currency_code": "USD" }),
        );
    }

    // Legacy lines were flat; fold the display fields into a snapshot.
    if !obj.contains_key("snapshot") {
        let name = obj.remove("name").unwrap_or_else(|| json!(""));
        let image = obj
            .remove("image")
            .or_else(|| obj.remove("img"))
            .or_else(|| obj.remove("picture"))
            .unwrap_or(Value::Null);
        let sizes = obj.remove("sizes").unwrap_or_else(|| json!([]));
        let colors = obj.remove("colors").unwrap_or_else(|| json!([]));
        obj.insert(
            "snapshot".to_owned(),
            json!({ "name": name, "image": image, "sizes": sizes, "colors": colors }),
        );
    }

    // The very oldest lines predate line ids.
    if !obj.contains_key("id") {
        let derived = format!(
            "{}:{}:{}:0",
            str_field(obj, "product_id"),
            str_field(obj, "size"),
            str_field(obj, "color"),
        );
        obj.insert("id".to_owned(), json!(derived));
    }
}

fn ensure(obj: &mut Map<String, Value>, field: &str, default: impl FnOnce() -> Value) {
    if !obj.contains_key(field) {
        obj.insert(field.to_owned(), default());
    }
}

fn rename(obj: &mut Map<String, Value>, from: &str, to: &str) {
    if !obj.contains_key(to)
        && let Some(value) = obj.remove(from)
    {
        obj.insert(to.to_owned(), value);
    }
}

fn str_field(obj: &Map<String, Value>, field: &str) -> String {
    obj.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn corrupt(collection: &str, key: &str, detail: &str) -> StoreError {
    StoreError::Corruption {
        collection: collection.to_owned(),
        key: key.to_owned(),
        detail: detail.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use driftwood_core::{ProductId, Size};
    use rust_decimal_macros::dec;

    #[test]
    fn test_canonical_stock_roundtrip() {
        let row = StockRow {
            product_id: ProductId::new("p1"),
            size: Size::new("M"),
            stock: 4,
            updated_at: Utc::now(),
        };
        let doc = stock_row_to_doc(&row).unwrap();
        let decoded = stock_row_from_doc(&row.key(), doc).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_legacy_stock_fields_normalize() {
        let key = StockKey::new("p1", "M");
        let decoded = stock_row_from_doc(&key, json!({ "qty": 7 })).unwrap();
        assert_eq!(decoded.stock, 7);
        assert_eq!(decoded.product_id, ProductId::new("p1"));
        assert_eq!(decoded.size, Size::new("M"));
        assert_eq!(decoded.updated_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_negative_stock_is_corruption() {
        let key = StockKey::new("p1", "M");
        let result = stock_row_from_doc(&key, json!({ "stock": -2 }));
        assert!(matches!(result, Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn test_legacy_cart_lines_normalize() {
        let user = UserId::new("u1");
        let doc = json!({
            "lines": [{
                "product_id": "p1",
                "name": "Wool Coat",
                "img": "https://img.example.com/coat.jpg",
                "qty": 2,
                "size": "M",
                "color": "navy",
                "price": 500
            }]
        });

        let cart = cart_from_doc(&user, doc).unwrap();
        assert_eq!(cart.items().len(), 1);
        let item = &cart.items()[0];
        assert_eq!(item.quantity, 2);
        assert_eq!(item.snapshot.name, "Wool Coat");
        assert_eq!(
            item.snapshot.image.as_deref(),
            Some("https://img.example.com/coat.jpg")
        );
        assert_eq!(item.unit_price.amount, dec!(500));
        // Derived state is recomputed, not read.
        assert_eq!(cart.total().amount, dec!(1000));
    }

    #[test]
    fn test_stored_total_is_ignored() {
        let user = UserId::new("u1");
        let doc = json!({ "items": [], "total": { "amount": "9999", "currency_code": "USD" } });
        let cart = cart_from_doc(&user, doc).unwrap();
        assert_eq!(cart.total().amount, dec!(0));
    }

    #[test]
    fn test_cart_roundtrip() {
        let user = UserId::new("u1");
        let mut cart = Cart::empty(user.clone());
        cart.add_line(
            "p1",
            driftwood_core::ProductSnapshot {
                name: "Wool Coat".to_owned(),
                image: None,
                sizes: vec![Size::new("M")],
                colors: vec![],
            },
            "M",
            "navy",
            2,
            driftwood_core::Price::new(dec!(500), driftwood_core::CurrencyCode::USD),
        );

        let doc = cart_to_doc(&cart).unwrap();
        let decoded = cart_from_doc(&user, doc).unwrap();
        assert_eq!(decoded.items(), cart.items());
        assert_eq!(decoded.total(), cart.total());
    }
}
