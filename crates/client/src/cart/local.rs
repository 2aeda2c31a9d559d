//! Cart persisted in client storage.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bamazon_core::ProductId;

use super::{CartBackend, CartLine, CartMode, LineRef};
use crate::error::{ClientError, Result, ValidationError};
use crate::storage::{ClientStorage, StorageError, keys};

/// Stored form of one line, keyed by product id in the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredLine {
    id: ProductId,
    price: Decimal,
    quantity: u32,
}

type Blob = BTreeMap<String, StoredLine>;

/// Cart kept under the `cart` storage key.
///
/// Every mutation is a single read-modify-write of the blob, serialized by a
/// lock. No network round-trip is involved.
pub struct LocalCart {
    storage: Arc<dyn ClientStorage>,
    write_lock: Mutex<()>,
}

impl LocalCart {
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Blob> {
        match self.storage.get(keys::CART)? {
            None => Ok(Blob::new()),
            Some(text) => Ok(serde_json::from_str(&text).map_err(StorageError::from)?),
        }
    }

    /// Read-modify-write of the blob. An unreadable blob is replaced.
    fn update(&self, apply: impl FnOnce(&mut Blob) -> Result<()>) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut blob = match self.load() {
            Ok(blob) => blob,
            Err(ClientError::Storage(StorageError::Corrupt(e))) => {
                tracing::warn!(error = %e, "Stored cart unreadable, starting from empty");
                Blob::new()
            }
            Err(e) => return Err(e),
        };
        apply(&mut blob)?;

        if blob.is_empty() {
            self.storage.remove(keys::CART)?;
        } else {
            let text = serde_json::to_string(&blob).map_err(StorageError::from)?;
            self.storage.set(keys::CART, &text)?;
        }
        Ok(())
    }
}

/// Blob key of the line a reference points at. Backend row ids do not exist
/// locally.
fn blob_key(line: LineRef) -> Option<String> {
    match line {
        LineRef::Product(id) => Some(id.to_string()),
        LineRef::Line(_) => None,
    }
}

#[async_trait]
impl CartBackend for LocalCart {
    fn mode(&self) -> CartMode {
        CartMode::Local
    }

    /// Lines ordered by product id. An unreadable blob reads as empty.
    async fn lines(&self) -> Result<Vec<CartLine>> {
        let blob = match self.load() {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "Stored cart unreadable, treating as empty");
                return Ok(Vec::new());
            }
        };

        let mut lines: Vec<CartLine> = blob
            .into_values()
            .filter(|stored| stored.quantity > 0)
            .map(|stored| CartLine {
                product_id: stored.id,
                quantity: stored.quantity,
                unit_price: stored.price,
                line_id: None,
            })
            .collect();
        lines.sort_by_key(|line| line.product_id);
        Ok(lines)
    }

    async fn add(&self, product_id: ProductId, unit_price: Decimal, quantity: u32) -> Result<()> {
        self.update(|blob| {
            match blob.entry(product_id.to_string()) {
                Entry::Occupied(mut entry) => {
                    let stored = entry.get_mut();
                    stored.quantity = stored
                        .quantity
                        .checked_add(quantity)
                        .ok_or_else(|| ValidationError::InvalidQuantity(quantity.to_string()))?;
                }
                Entry::Vacant(entry) => {
                    entry.insert(StoredLine {
                        id: product_id,
                        price: unit_price,
                        quantity,
                    });
                }
            }
            Ok(())
        })
    }

    async fn set_quantity(&self, line: LineRef, quantity: u32) -> Result<()> {
        let Some(key) = blob_key(line) else {
            return Ok(());
        };
        self.update(|blob| {
            if let Some(stored) = blob.get_mut(&key) {
                stored.quantity = quantity;
            }
            Ok(())
        })
    }

    async fn remove(&self, line: LineRef) -> Result<()> {
        let Some(key) = blob_key(line) else {
            return Ok(());
        };
        self.update(|blob| {
            blob.remove(&key);
            Ok(())
        })
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage.remove(keys::CART)?;
        Ok(())
    }

    /// No backend owns this cart, so it is emptied here.
    async fn order_placed(&self) -> Result<()> {
        self.clear().await
    }
}

impl std::fmt::Debug for LocalCart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCart").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_add_merges_quantities() {
        let cart = LocalCart::new(Arc::new(MemoryStorage::new()));
        cart.add(ProductId::new(1), dec("10.00"), 2).await.unwrap();
        cart.add(ProductId::new(1), dec("12.00"), 3).await.unwrap();

        let lines = cart.lines().await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 5);
        assert_eq!(lines[0].unit_price, dec("10.00"));
    }

    #[tokio::test]
    async fn test_lines_ordered_by_product() {
        let cart = LocalCart::new(Arc::new(MemoryStorage::new()));
        cart.add(ProductId::new(10), dec("1"), 1).await.unwrap();
        cart.add(ProductId::new(2), dec("1"), 1).await.unwrap();

        let ids: Vec<i64> = cart
            .lines()
            .await
            .unwrap()
            .iter()
            .map(|l| l.product_id.as_i64())
            .collect();
        assert_eq!(ids, vec![2, 10]);
    }

    #[tokio::test]
    async fn test_set_quantity_and_remove() {
        let storage = Arc::new(MemoryStorage::new());
        let cart = LocalCart::new(storage.clone());
        cart.add(ProductId::new(1), dec("1.50"), 1).await.unwrap();

        cart.set_quantity(LineRef::Product(ProductId::new(1)), 4).await.unwrap();
        assert_eq!(cart.lines().await.unwrap()[0].quantity, 4);

        cart.remove(LineRef::Product(ProductId::new(1))).await.unwrap();
        cart.remove(LineRef::Product(ProductId::new(1))).await.unwrap();
        assert!(cart.lines().await.unwrap().is_empty());
        assert_eq!(storage.get(keys::CART).unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_quantity_absent_line_is_noop() {
        let cart = LocalCart::new(Arc::new(MemoryStorage::new()));
        cart.set_quantity(LineRef::Product(ProductId::new(5)), 2).await.unwrap();
        assert!(cart.lines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_blob_reads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(keys::CART, "{not json").unwrap();
        let cart = LocalCart::new(storage);
        assert!(cart.lines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_replaced_on_write() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(keys::CART, "{not json").unwrap();
        let cart = LocalCart::new(storage.clone());

        cart.add(ProductId::new(4), dec("3.00"), 2).await.unwrap();

        let lines = cart.lines().await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, ProductId::new(4));
        assert_eq!(lines[0].quantity, 2);
        assert!(serde_json::from_str::<Blob>(&storage.get(keys::CART).unwrap().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_add_overflow_rejected_without_change() {
        let cart = LocalCart::new(Arc::new(MemoryStorage::new()));
        cart.add(ProductId::new(1), dec("1.00"), u32::MAX).await.unwrap();

        let err = cart.add(ProductId::new(1), dec("1.00"), 5).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::InvalidQuantity(_))
        ));
        assert_eq!(cart.lines().await.unwrap()[0].quantity, u32::MAX);
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        LocalCart::new(Arc::new(FileStorage::new(&path)))
            .add(ProductId::new(3), dec("2.00"), 2)
            .await
            .unwrap();

        let reopened = LocalCart::new(Arc::new(FileStorage::new(&path)));
        let lines = reopened.lines().await.unwrap();
        assert_eq!(lines[0].product_id, ProductId::new(3));

        reopened.order_placed().await.unwrap();
        assert!(reopened.lines().await.unwrap().is_empty());
    }
}
