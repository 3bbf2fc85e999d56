use super::{ContentRepository, RepositoryError};
use crate::listing::GeneratedContent;
use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

const KEY_PREFIX: &str = "hermes:listing";

/// Redis-backed store. Each content id owns a list of JSON versions and each
/// product id points at its latest content id.
#[derive(Clone)]
pub struct RedisContentRepository {
    client: redis::Client,
}

impl RedisContentRepository {
    pub fn open(url: &str) -> Result<Self, RepositoryError> {
        let client = redis::Client::open(url).map_err(backend)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, RepositoryError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }
}

fn backend(err: redis::RedisError) -> RepositoryError {
    RepositoryError::Backend(err.to_string())
}

fn versions_key(id: Uuid) -> String {
    format!("{KEY_PREFIX}:content:{id}:versions")
}

fn product_key(product_id: &str) -> String {
    format!("{KEY_PREFIX}:product:{product_id}")
}

fn decode(raw: &str) -> Result<GeneratedContent, RepositoryError> {
    serde_json::from_str(raw).map_err(|err| RepositoryError::Corrupt(err.to_string()))
}

fn encode(content: &GeneratedContent) -> Result<String, RepositoryError> {
    serde_json::to_string(content).map_err(|err| RepositoryError::Corrupt(err.to_string()))
}

#[async_trait]
impl ContentRepository for RedisContentRepository {
    async fn get_by_product_id(
        &self,
        product_id: &str,
    ) -> Result<Option<GeneratedContent>, RepositoryError> {
        let mut conn = self.connection().await?;
        let id: Option<String> = conn.get(product_key(product_id)).await.map_err(backend)?;
        let Some(id) = id.and_then(|raw| Uuid::parse_str(&raw).ok()) else {
            return Ok(None);
        };
        drop(conn);
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<GeneratedContent>, RepositoryError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.lindex(versions_key(id), -1).await.map_err(backend)?;
        raw.as_deref().map(decode).transpose()
    }

    async fn save(&self, content: &GeneratedContent) -> Result<(), RepositoryError> {
        let json = encode(content)?;
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .rpush(versions_key(content.id), json)
            .await
            .map_err(backend)?;
        let _: () = conn
            .set(product_key(&content.product_id), content.id.to_string())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn update(&self, content: &GeneratedContent) -> Result<(), RepositoryError> {
        let json = encode(content)?;
        let mut conn = self.connection().await?;
        // RPUSHX only appends to an existing history.
        let len: i64 = conn
            .rpush_exists(versions_key(content.id), json)
            .await
            .map_err(backend)?;
        if len == 0 {
            return Err(RepositoryError::Missing(content.id));
        }
        let _: () = conn
            .set(product_key(&content.product_id), content.id.to_string())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_versions(&self, id: Uuid) -> Result<Vec<GeneratedContent>, RepositoryError> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn
            .lrange(versions_key(id), 0, -1)
            .await
            .map_err(backend)?;
        raw.iter().map(|entry| decode(entry)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let id = Uuid::nil();
        assert_eq!(
            versions_key(id),
            "hermes:listing:content:00000000-0000-0000-0000-000000000000:versions"
        );
        assert_eq!(product_key("P1"), "hermes:listing:product:P1");
    }

    #[test]
    fn open_rejects_malformed_urls() {
        assert!(matches!(
            RedisContentRepository::open("not a url"),
            Err(RepositoryError::Backend(_))
        ));
    }
}
