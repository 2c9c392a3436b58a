use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Locally addressable reference to bytes held by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobHandle {
    pub id: Uuid,
    pub mime_type: String,
    pub size: usize,
}

impl BlobHandle {
    pub fn url(&self) -> String {
        format!("blob:vibeshift/{}", self.id)
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// In-memory registry for previews and downloaded videos.
///
/// Every registered blob stays alive until released; callers release a
/// handle when it is superseded or when the session resets.
#[derive(Clone, Default)]
pub struct BlobStore {
    blobs: Arc<RwLock<HashMap<Uuid, Arc<Vec<u8>>>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, bytes: Vec<u8>, mime_type: impl Into<String>) -> BlobHandle {
        let handle = BlobHandle {
            id: Uuid::new_v4(),
            mime_type: mime_type.into(),
            size: bytes.len(),
        };

        let mut blobs = self.blobs.write().await;
        blobs.insert(handle.id, Arc::new(bytes));
        debug!("Registered blob {} ({} bytes, {})", handle.id, handle.size, handle.mime_type);
        handle
    }

    pub async fn get(&self, handle: &BlobHandle) -> Option<Arc<Vec<u8>>> {
        let blobs = self.blobs.read().await;
        blobs.get(&handle.id).cloned()
    }

    /// Returns false if the handle was already released.
    pub async fn release(&self, handle: &BlobHandle) -> bool {
        let mut blobs = self.blobs.write().await;
        let removed = blobs.remove(&handle.id).is_some();
        if removed {
            debug!("Released blob {}", handle.id);
        }
        removed
    }

    pub async fn contains(&self, handle: &BlobHandle) -> bool {
        self.blobs.read().await.contains_key(&handle.id)
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
