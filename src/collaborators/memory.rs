use super::{ContentRepository, RepositoryError};
use crate::listing::GeneratedContent;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Store {
    history: HashMap<Uuid, Vec<GeneratedContent>>,
    by_product: HashMap<String, Uuid>,
}

/// Process-local content store. Keeps every version of every record.
#[derive(Clone, Default)]
pub struct InMemoryContentRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn get_by_product_id(
        &self,
        product_id: &str,
    ) -> Result<Option<GeneratedContent>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .by_product
            .get(product_id)
            .and_then(|id| store.history.get(id))
            .and_then(|versions| versions.last().cloned()))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<GeneratedContent>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.history.get(&id).and_then(|v| v.last().cloned()))
    }

    async fn save(&self, content: &GeneratedContent) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        store
            .history
            .entry(content.id)
            .or_default()
            .push(content.clone());
        store
            .by_product
            .insert(content.product_id.clone(), content.id);
        Ok(())
    }

    async fn update(&self, content: &GeneratedContent) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().await;
        let versions = store
            .history
            .get_mut(&content.id)
            .ok_or(RepositoryError::Missing(content.id))?;
        versions.push(content.clone());
        store
            .by_product
            .insert(content.product_id.clone(), content.id);
        Ok(())
    }

    async fn list_versions(&self, id: Uuid) -> Result<Vec<GeneratedContent>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.history.get(&id).cloned().unwrap_or_default())
    }
}
