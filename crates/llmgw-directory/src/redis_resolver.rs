use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::keys;
use crate::model::{EndpointRecord, ResolvedEndpoint, UpstreamSingleOrMultiple};
use crate::resolver::{DirectoryError, DirectoryResult, EndpointResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryLevel {
    Tenant,
    Team,
    Group,
    Endpoint,
}

impl DirectoryLevel {
    fn upstream_key(self, id: &str) -> String {
        match self {
            DirectoryLevel::Tenant => keys::upstream_by_tenant_id(id),
            DirectoryLevel::Team => keys::upstream_by_team_id(id),
            DirectoryLevel::Group => keys::upstream_by_group_id(id),
            DirectoryLevel::Endpoint => keys::upstream_by_endpoint_id(id),
        }
    }
}

/// Directory backend reading keyed entries from Redis on every lookup.
///
/// Endpoint identity lives under the api-key and alias indices; upstream
/// configuration lives under one key per tree level and is probed
/// endpoint-first on reads. Nothing is cached in-process.
#[derive(Clone)]
pub struct RedisEndpointResolver {
    conn: MultiplexedConnection,
}

impl RedisEndpointResolver {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> DirectoryResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    async fn upstream_at(&self, key: String) -> DirectoryResult<Option<UpstreamSingleOrMultiple>> {
        let raw: Option<String> = self.conn.clone().get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Probes endpoint -> group -> team -> tenant and returns the first
    /// configured upstream. Levels with an empty id are skipped.
    async fn effective_upstream(
        &self,
        record: &EndpointRecord,
    ) -> DirectoryResult<Option<UpstreamSingleOrMultiple>> {
        let probes = [
            (DirectoryLevel::Endpoint, record.id.as_str()),
            (DirectoryLevel::Group, record.group_id.as_str()),
            (DirectoryLevel::Team, record.team_id.as_str()),
            (DirectoryLevel::Tenant, record.tenant_id.as_str()),
        ];

        for (level, id) in probes {
            if id.is_empty() {
                continue;
            }
            if let Some(upstream) = self.upstream_at(level.upstream_key(id)).await? {
                return Ok(Some(upstream));
            }
        }

        Ok(None)
    }

    async fn find_at(&self, index_key: String) -> DirectoryResult<ResolvedEndpoint> {
        let raw: Option<String> = self.conn.clone().get(index_key).await?;
        let Some(raw) = raw else {
            return Err(DirectoryError::NotFound);
        };

        let record: EndpointRecord = serde_json::from_str(&raw)?;

        // An endpoint with no upstream anywhere on its path is unusable and
        // reported the same as a missing one.
        let Some(upstream) = self.effective_upstream(&record).await? else {
            return Err(DirectoryError::NotFound);
        };

        Ok(ResolvedEndpoint {
            tenant_id: record.tenant_id,
            team_id: record.team_id,
            group_id: record.group_id,
            id: record.id,
            alias: record.alias,
            api_key: record.api_key,
            upstream,
        })
    }

    /// Writes the upstream key for one level without touching siblings.
    pub async fn configure_upstream(
        &self,
        level: DirectoryLevel,
        id: &str,
        upstream: &UpstreamSingleOrMultiple,
    ) -> DirectoryResult<()> {
        let payload = serde_json::to_string(upstream)?;
        let _: () = self
            .conn
            .clone()
            .set(level.upstream_key(id), payload)
            .await?;
        Ok(())
    }

    /// Writes both lookup indices with the identical record. The two SETs
    /// are not atomic; readers tolerate the brief window where the indices
    /// disagree.
    pub async fn configure_endpoint(
        &self,
        api_key: &str,
        alias: &str,
        record: &EndpointRecord,
    ) -> DirectoryResult<()> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(keys::endpoint_metadata_by_api_key(api_key), &payload)
            .await?;
        let _: () = conn
            .set(keys::endpoint_metadata_by_alias(alias), &payload)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EndpointResolver for RedisEndpointResolver {
    async fn find_by_api_key(&self, api_key: &str) -> DirectoryResult<ResolvedEndpoint> {
        self.find_at(keys::endpoint_metadata_by_api_key(api_key))
            .await
    }

    async fn find_by_alias(&self, alias: &str) -> DirectoryResult<ResolvedEndpoint> {
        self.find_at(keys::endpoint_metadata_by_alias(alias)).await
    }
}
