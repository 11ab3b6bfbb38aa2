//! Namespaced semantic cache over a Redis vector index.
//!
//! Each entry is a JSON document `{key, ver, vec, object}` under
//! `{namespace}:{id}`; one FLAT cosine index per namespace covers `$.vec`
//! and is created lazily with the dimension of the first vector seen.
//! Writes go through a version-checking script so concurrent updates to the
//! same key lose with [`CacheError::Conflict`] instead of silently clobbering.

use std::marker::PhantomData;
use std::time::Duration;

use redis::Script;
use redis::aio::MultiplexedConnection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache storage: {0}")]
    Storage(#[from] redis::RedisError),
    #[error("cache decode: {0}")]
    Decode(#[from] serde_json::Error),
    /// The stored version moved since this entry was read; refetch and retry.
    #[error("version conflict writing {key}")]
    Conflict { key: String },
    #[error("cache reply: {0}")]
    Reply(String),
}

/// A stored entry. `ver` starts at 0 for an unsaved entry and is bumped by
/// every successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cached<T> {
    pub key: String,
    pub ver: i64,
    pub vec: Vec<f64>,
    pub object: T,
}

/// One k-NN hit, ascending distance under cosine (lower is more similar).
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved<T> {
    pub key: String,
    pub score: f64,
    pub object: T,
}

/// Compare-and-swap write: rejects the update unless the stored version
/// still matches the caller's, then installs the document (whose `ver` the
/// caller has already bumped) and refreshes the TTL.
const CAS_SAVE: &str = r#"
local current = redis.call('JSON.GET', KEYS[1], '$.ver')
local expected = tonumber(ARGV[1])
if current then
    if tonumber(cjson.decode(current)[1]) ~= expected then
        return -1
    end
elseif expected ~= 0 then
    return -1
end
redis.call('JSON.SET', KEYS[1], '$', ARGV[2])
local ttl = tonumber(ARGV[3])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return expected + 1
"#;

pub struct SemanticCache<T> {
    conn: MultiplexedConnection,
    name: String,
    dimension: Option<usize>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for SemanticCache<T> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            name: self.name.clone(),
            dimension: self.dimension,
            _payload: PhantomData,
        }
    }
}

impl<T> SemanticCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(conn: MultiplexedConnection, name: impl Into<String>) -> Self {
        Self {
            conn,
            name: name.into(),
            dimension: None,
            _payload: PhantomData,
        }
    }

    pub async fn connect(url: &str, name: impl Into<String>) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(conn, name))
    }

    /// Pins the index dimension instead of inferring it from the first
    /// vector.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    fn entry_key(&self, id: &str) -> String {
        format!("{}:{}", self.name, id)
    }

    fn index_name(&self) -> String {
        format!("{}:idx", self.name)
    }

    /// Stores a new entry under a fresh key. Returns the entry as written
    /// (version 1).
    pub async fn cache(&self, object: T, vector: Vec<f64>) -> CacheResult<Cached<T>> {
        self.cache_entry(object, vector, None).await
    }

    /// Same as [`cache`](Self::cache) with an expiry on the entry.
    pub async fn cache_with_ttl(
        &self,
        object: T,
        vector: Vec<f64>,
        ttl: Duration,
    ) -> CacheResult<Cached<T>> {
        self.cache_entry(object, vector, Some(ttl)).await
    }

    async fn cache_entry(
        &self,
        object: T,
        vector: Vec<f64>,
        ttl: Option<Duration>,
    ) -> CacheResult<Cached<T>> {
        let mut entry = Cached {
            key: self.entry_key(&uuid::Uuid::new_v4().to_string()),
            ver: 0,
            vec: vector,
            object,
        };
        self.save(&mut entry, ttl).await?;
        Ok(entry)
    }

    /// Optimistic-lock write of an entry read earlier (or freshly built with
    /// `ver == 0`). On success the entry's version reflects the store.
    pub async fn save(&self, entry: &mut Cached<T>, ttl: Option<Duration>) -> CacheResult<()> {
        let expected = entry.ver;
        entry.ver = expected + 1;
        let payload = serde_json::to_string(&entry)?;
        let ttl_secs = ttl.map(|t| t.as_secs() as i64).unwrap_or(0);

        let mut conn = self.conn.clone();
        let outcome: i64 = Script::new(CAS_SAVE)
            .key(&entry.key)
            .arg(expected)
            .arg(payload)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        if outcome < 0 {
            entry.ver = expected;
            return Err(CacheError::Conflict {
                key: entry.key.clone(),
            });
        }
        Ok(())
    }

    pub async fn retrieve_first(&self, vector: &[f64]) -> CacheResult<Option<Retrieved<T>>> {
        let mut hits = self.retrieve_top_k(vector, 1).await?;
        Ok(if hits.is_empty() {
            None
        } else {
            Some(hits.remove(0))
        })
    }

    pub async fn retrieve_top_1(&self, vector: &[f64]) -> CacheResult<Vec<Retrieved<T>>> {
        self.retrieve_top_k(vector, 1).await
    }

    pub async fn retrieve_top_3(&self, vector: &[f64]) -> CacheResult<Vec<Retrieved<T>>> {
        self.retrieve_top_k(vector, 3).await
    }

    pub async fn retrieve_top_10(&self, vector: &[f64]) -> CacheResult<Vec<Retrieved<T>>> {
        self.retrieve_top_k(vector, 10).await
    }

    /// k-NN over the namespace index, ascending distance.
    pub async fn retrieve_top_k(&self, vector: &[f64], k: usize) -> CacheResult<Vec<Retrieved<T>>> {
        self.ensure_index(vector.len()).await?;

        let query = format!("(*)=>[KNN {k} @vec $V]");
        let mut conn = self.conn.clone();
        let reply: redis::Value = redis::cmd("FT.SEARCH")
            .arg(self.index_name())
            .arg(query)
            .arg("RETURN")
            .arg(2)
            .arg("$.object")
            .arg("__vec_score")
            .arg("SORTBY")
            .arg("__vec_score")
            .arg("PARAMS")
            .arg(2)
            .arg("V")
            .arg(vector_blob(vector))
            .arg("DIALECT")
            .arg(2)
            .query_async(&mut conn)
            .await?;

        parse_search_reply(reply)
    }

    /// Creates the namespace index if the store does not list it yet. Safe
    /// under races: a concurrent creator's "already exists" error is
    /// swallowed.
    async fn ensure_index(&self, dimension: usize) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let existing: Vec<String> = redis::cmd("FT._LIST").query_async(&mut conn).await?;
        if existing.iter().any(|name| *name == self.index_name()) {
            return Ok(());
        }

        let dim = self.dimension.unwrap_or(dimension);
        let created: Result<(), redis::RedisError> = redis::cmd("FT.CREATE")
            .arg(self.index_name())
            .arg("ON")
            .arg("JSON")
            .arg("PREFIX")
            .arg(1)
            .arg(format!("{}:", self.name))
            .arg("SCHEMA")
            .arg("$.vec")
            .arg("AS")
            .arg("vec")
            .arg("VECTOR")
            .arg("FLAT")
            .arg(6)
            .arg("TYPE")
            .arg("FLOAT64")
            .arg("DIM")
            .arg(dim)
            .arg("DISTANCE_METRIC")
            .arg("COSINE")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(err) if err.to_string().to_lowercase().contains("already exists") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Little-endian FLOAT64 blob for a KNN query parameter.
fn vector_blob(vector: &[f64]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 8);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn parse_search_reply<T: DeserializeOwned>(reply: redis::Value) -> CacheResult<Vec<Retrieved<T>>> {
    let items = match reply {
        redis::Value::Array(items) => items,
        other => return Err(CacheError::Reply(format!("unexpected reply: {other:?}"))),
    };

    // Shape: total count, then alternating key / field-value array.
    let mut out = Vec::new();
    let mut iter = items.into_iter();
    let _total = iter.next();

    while let (Some(key), Some(fields)) = (iter.next(), iter.next()) {
        let key = value_to_string(&key)?;
        let redis::Value::Array(fields) = fields else {
            return Err(CacheError::Reply("expected field array".to_string()));
        };

        let mut object_json = None;
        let mut score = 0.0;
        let mut field_iter = fields.iter();
        while let (Some(name), Some(value)) = (field_iter.next(), field_iter.next()) {
            match value_to_string(name)?.as_str() {
                "$.object" => object_json = Some(value_to_string(value)?),
                "__vec_score" => score = value_to_string(value)?.parse().unwrap_or(0.0),
                _ => {}
            }
        }

        let Some(object_json) = object_json else {
            continue;
        };
        out.push(Retrieved {
            key,
            score,
            object: serde_json::from_str(&object_json)?,
        });
    }

    Ok(out)
}

fn value_to_string(value: &redis::Value) -> CacheResult<String> {
    match value {
        redis::Value::BulkString(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::SimpleString(s) => Ok(s.clone()),
        redis::Value::Int(n) => Ok(n.to_string()),
        redis::Value::Double(f) => Ok(f.to_string()),
        other => Err(CacheError::Reply(format!("unexpected element: {other:?}"))),
    }
}
