//! MongoDB cart store.
//!
//! One document per user in the `carts` collection:
//!
//! ```text
//! { user_id, items: [{ product_id, quantity, added_at }], created_at, updated_at }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::info;

use super::{CartError, CartStore, Result};
use crate::config::MongodbConfig;
use crate::domain::{Cart, CartItem};

const CARTS_COLLECTION: &str = "carts";

/// MongoDB implementation of [`CartStore`].
pub struct MongoCartStore {
    carts: Collection<Document>,
}

impl MongoCartStore {
    /// Connect and initialize indexes.
    pub async fn new(config: &MongodbConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.uri).await?;
        let carts = client.database(&config.database).collection(CARTS_COLLECTION);

        let store = Self { carts };
        store.init().await?;

        info!(uri = %config.uri, database = %config.database, "Connected to MongoDB");
        Ok(store)
    }

    /// Unique index on user_id: one cart document per user.
    async fn init(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.carts.create_index(index).await?;
        Ok(())
    }

    fn to_document(cart: &Cart) -> Document {
        let items: Vec<Bson> = cart
            .items
            .iter()
            .map(|item| {
                Bson::Document(doc! {
                    "product_id": item.product_id,
                    "quantity": item.quantity,
                    "added_at": to_bson_datetime(item.added_at),
                })
            })
            .collect();

        doc! {
            "user_id": &cart.user_id,
            "items": items,
            "created_at": to_bson_datetime(cart.created_at),
            "updated_at": to_bson_datetime(cart.updated_at),
        }
    }

    fn from_document(doc: &Document) -> Result<Cart> {
        let user_id = doc
            .get_str("user_id")
            .map_err(|e| CartError::Malformed(e.to_string()))?
            .to_string();

        let mut items = Vec::new();
        if let Ok(array) = doc.get_array("items") {
            for entry in array {
                let item = entry
                    .as_document()
                    .ok_or_else(|| CartError::Malformed("item is not a document".to_string()))?;
                items.push(CartItem {
                    product_id: item
                        .get_i64("product_id")
                        .map_err(|e| CartError::Malformed(e.to_string()))?,
                    quantity: item
                        .get_i32("quantity")
                        .map_err(|e| CartError::Malformed(e.to_string()))?,
                    added_at: Self::datetime(item, "added_at")?,
                });
            }
        }

        Ok(Cart {
            user_id,
            items,
            created_at: Self::datetime(doc, "created_at")?,
            updated_at: Self::datetime(doc, "updated_at")?,
        })
    }

    fn datetime(doc: &Document, key: &str) -> Result<DateTime<Utc>> {
        let millis = doc
            .get_datetime(key)
            .map_err(|e| CartError::Malformed(format!("{key}: {e}")))?
            .timestamp_millis();
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| CartError::Malformed(format!("{key}: out-of-range timestamp")))
    }
}

fn to_bson_datetime(dt: DateTime<Utc>) -> mongodb::bson::DateTime {
    mongodb::bson::DateTime::from_millis(dt.timestamp_millis())
}

#[async_trait]
impl CartStore for MongoCartStore {
    async fn get_cart(&self, user_id: &str) -> Result<Cart> {
        let doc = self
            .carts
            .find_one(doc! { "user_id": user_id })
            .await?
            .ok_or_else(|| CartError::CartNotFound(user_id.to_string()))?;

        Self::from_document(&doc)
    }

    async fn add_item(&self, user_id: &str, product_id: i64, quantity: i32) -> Result<()> {
        // Read-modify-write on the single document; the unique index keeps
        // concurrent first-writes from creating two carts.
        let mut cart = match self.get_cart(user_id).await {
            Ok(cart) => cart,
            Err(CartError::CartNotFound(_)) => Cart::empty(user_id),
            Err(e) => return Err(e),
        };

        cart.upsert_item(product_id, quantity);

        self.carts
            .replace_one(doc! { "user_id": user_id }, Self::to_document(&cart))
            .upsert(true)
            .await?;

        Ok(())
    }

    async fn update_item_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        let result = self
            .carts
            .update_one(
                doc! { "user_id": user_id, "items.product_id": product_id },
                doc! {
                    "$set": {
                        "items.$.quantity": quantity,
                        "updated_at": to_bson_datetime(Utc::now()),
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            // Distinguish a missing cart from a missing line item.
            if self
                .carts
                .find_one(doc! { "user_id": user_id })
                .await?
                .is_none()
            {
                return Err(CartError::CartNotFound(user_id.to_string()));
            }
            return Err(CartError::ItemNotFound(product_id));
        }

        Ok(())
    }

    async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<()> {
        let result = self
            .carts
            .update_one(
                doc! { "user_id": user_id, "items.product_id": product_id },
                doc! {
                    "$pull": { "items": { "product_id": product_id } },
                    "$set": { "updated_at": to_bson_datetime(Utc::now()) },
                },
            )
            .await?;

        if result.matched_count == 0 {
            if self
                .carts
                .find_one(doc! { "user_id": user_id })
                .await?
                .is_none()
            {
                return Err(CartError::CartNotFound(user_id.to_string()));
            }
            return Err(CartError::ItemNotFound(product_id));
        }

        Ok(())
    }

    async fn delete_cart(&self, user_id: &str) -> Result<()> {
        let result = self.carts.delete_one(doc! { "user_id": user_id }).await?;

        if result.deleted_count == 0 {
            return Err(CartError::CartNotFound(user_id.to_string()));
        }

        Ok(())
    }
}
