use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::resolver::DirectoryError;

/// Root of the routing directory: a four-level tree of
/// tenant -> team -> group (nesting arbitrarily) -> endpoint.
///
/// `api_key` and `alias` are globally unique across the whole tree; an
/// endpoint is usable only if some node on its path to the root carries an
/// upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Routes {
    #[serde(default)]
    pub tenants: Vec<Tenant>,
}

impl Routes {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamSingleOrMultiple>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamSingleOrMultiple>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamSingleOrMultiple>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub alias: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamSingleOrMultiple>,
}

/// One upstream, or an ordered pool of them. The single form is equivalent
/// to a one-element pool; selection among a pool is the dispatcher's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamSingleOrMultiple {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Upstream>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Upstream>,
}

impl UpstreamSingleOrMultiple {
    pub fn single(upstream: Upstream) -> Self {
        Self {
            upstream: Some(upstream),
            upstreams: Vec::new(),
        }
    }

    pub fn multiple(upstreams: Vec<Upstream>) -> Self {
        Self {
            upstream: None,
            upstreams,
        }
    }

    /// The ordered candidate sequence: the single form first, else the pool.
    pub fn candidates(&self) -> Vec<&Upstream> {
        match &self.upstream {
            Some(single) => vec![single],
            None => self.upstreams.iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upstream.is_none() && self.upstreams.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub openai: UpstreamOpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamOpenAi {
    pub base_url: String,
    pub api_key: String,
    /// Reserved for weighted selection; nothing consumes it yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<BTreeMap<String, String>>,
    /// Advisory feature flags; never used to reject a request.
    #[serde(default)]
    pub compatible: UpstreamCompatibility,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamCompatibility {
    #[serde(default)]
    pub chat: UpstreamChatCompatibility,
    #[serde(default)]
    pub models: bool,
    #[serde(default)]
    pub embeddings: bool,
    #[serde(default)]
    pub images: bool,
    #[serde(default)]
    pub audio: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamChatCompatibility {
    #[serde(default)]
    pub usage: bool,
    #[serde(default)]
    pub stream: bool,
}

/// The endpoint identity as stored in the dynamic backend, without any
/// upstream attached (upstreams live under their own per-level keys).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub group_id: String,
    pub id: String,
    pub alias: String,
    pub api_key: String,
}

/// A successful resolution: the endpoint's identity along the tree path plus
/// the effective upstream after inheritance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEndpoint {
    pub tenant_id: String,
    pub team_id: String,
    pub group_id: String,
    pub id: String,
    pub alias: String,
    pub api_key: String,
    pub upstream: UpstreamSingleOrMultiple,
}

impl ResolvedEndpoint {
    pub fn record(&self) -> EndpointRecord {
        EndpointRecord {
            tenant_id: self.tenant_id.clone(),
            team_id: self.team_id.clone(),
            group_id: self.group_id.clone(),
            id: self.id.clone(),
            alias: self.alias.clone(),
            api_key: self.api_key.clone(),
        }
    }
}
