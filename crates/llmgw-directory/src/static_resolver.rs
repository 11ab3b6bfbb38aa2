use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::model::{
    Endpoint, Group, ResolvedEndpoint, Routes, Team, Tenant, UpstreamSingleOrMultiple,
};
use crate::resolver::{DirectoryError, DirectoryResult, EndpointResolver};

/// In-memory resolver over a loaded routing directory.
///
/// The tree is read-only per load; `reload` swaps in a whole new tree so a
/// config watcher can refresh it without interrupting in-flight lookups.
pub struct StaticEndpointResolver {
    routes: ArcSwap<Routes>,
}

impl StaticEndpointResolver {
    pub fn new(routes: Routes) -> Self {
        Self {
            routes: ArcSwap::from_pointee(routes),
        }
    }

    pub fn reload(&self, routes: Routes) {
        self.routes.store(Arc::new(routes));
    }

    pub fn routes(&self) -> Arc<Routes> {
        self.routes.load_full()
    }

    fn find(&self, matches: impl Fn(&Endpoint) -> bool) -> DirectoryResult<ResolvedEndpoint> {
        let routes = self.routes.load();
        for tenant in &routes.tenants {
            for team in &tenant.teams {
                if let Some(found) = search_groups(tenant, team, &team.groups, &matches) {
                    return Ok(found);
                }
            }
        }

        Err(DirectoryError::NotFound)
    }
}

/// Nearest non-null upstream along endpoint -> enclosing group -> team ->
/// tenant. Only the immediate enclosing group participates; ancestor groups
/// of a deeper nesting are deliberately skipped (see the nested-group test).
fn effective_upstream(
    endpoint: &Endpoint,
    group: &Group,
    team: &Team,
    tenant: &Tenant,
) -> Option<UpstreamSingleOrMultiple> {
    endpoint
        .upstream
        .as_ref()
        .or(group.upstream.as_ref())
        .or(team.upstream.as_ref())
        .or(tenant.upstream.as_ref())
        .cloned()
}

fn search_groups(
    tenant: &Tenant,
    team: &Team,
    groups: &[Group],
    matches: &impl Fn(&Endpoint) -> bool,
) -> Option<ResolvedEndpoint> {
    for group in groups {
        for endpoint in &group.endpoints {
            if matches(endpoint) {
                return Some(ResolvedEndpoint {
                    tenant_id: tenant.id.clone(),
                    team_id: team.id.clone(),
                    group_id: group.id.clone(),
                    id: endpoint.id.clone(),
                    alias: endpoint.alias.clone(),
                    api_key: endpoint.api_key.clone(),
                    upstream: effective_upstream(endpoint, group, team, tenant)
                        .unwrap_or_default(),
                });
            }
        }

        if let Some(found) = search_groups(tenant, team, &group.groups, matches) {
            return Some(found);
        }
    }

    None
}

#[async_trait]
impl EndpointResolver for StaticEndpointResolver {
    async fn find_by_api_key(&self, api_key: &str) -> DirectoryResult<ResolvedEndpoint> {
        self.find(|endpoint| endpoint.api_key == api_key)
    }

    async fn find_by_alias(&self, alias: &str) -> DirectoryResult<ResolvedEndpoint> {
        self.find(|endpoint| endpoint.alias == alias)
    }
}
