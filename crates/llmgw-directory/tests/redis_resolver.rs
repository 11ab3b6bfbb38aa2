//! Integration tests against a local Redis at `redis://127.0.0.1:6379`.
//! Run with `cargo test -- --ignored` when one is available.

use llmgw_directory::{
    DirectoryLevel, EndpointRecord, EndpointResolver, RedisEndpointResolver, Upstream,
    UpstreamOpenAi, UpstreamSingleOrMultiple,
};

const REDIS_URL: &str = "redis://127.0.0.1:6379";

fn upstream(base_url: &str, api_key: &str) -> UpstreamSingleOrMultiple {
    UpstreamSingleOrMultiple::single(Upstream {
        openai: UpstreamOpenAi {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            weight: None,
            extra_headers: None,
            compatible: Default::default(),
        },
    })
}

fn record(suffix: &str) -> EndpointRecord {
    EndpointRecord {
        tenant_id: format!("tenant-{suffix}"),
        team_id: format!("team-{suffix}"),
        group_id: format!("group-{suffix}"),
        id: format!("endpoint-{suffix}"),
        alias: format!("alias-{suffix}"),
        api_key: format!("key-{suffix}"),
    }
}

#[tokio::test]
#[ignore]
async fn find_by_api_key_reads_endpoint_level_upstream() {
    let resolver = RedisEndpointResolver::connect(REDIS_URL).await.unwrap();
    let record = record("rk1");

    resolver
        .configure_upstream(
            DirectoryLevel::Endpoint,
            &record.id,
            &upstream("https://ep.example.com/v1", "sk-ep"),
        )
        .await
        .unwrap();
    resolver
        .configure_endpoint(&record.api_key, &record.alias, &record)
        .await
        .unwrap();

    let found = resolver.find_by_api_key(&record.api_key).await.unwrap();
    assert_eq!(found.id, record.id);
    assert_eq!(found.alias, record.alias);
    assert_eq!(found.tenant_id, record.tenant_id);
    assert_eq!(found.team_id, record.team_id);
    assert_eq!(found.group_id, record.group_id);
    assert_eq!(
        found.upstream.candidates()[0].openai.base_url,
        "https://ep.example.com/v1"
    );
}

#[tokio::test]
#[ignore]
async fn find_by_alias_is_symmetric() {
    let resolver = RedisEndpointResolver::connect(REDIS_URL).await.unwrap();
    let record = record("rk2");

    resolver
        .configure_upstream(
            DirectoryLevel::Endpoint,
            &record.id,
            &upstream("https://ep2.example.com/v1", "sk-ep2"),
        )
        .await
        .unwrap();
    resolver
        .configure_endpoint(&record.api_key, &record.alias, &record)
        .await
        .unwrap();

    let found = resolver.find_by_alias(&record.alias).await.unwrap();
    assert_eq!(found.id, record.id);
    assert_eq!(found.api_key, record.api_key);
}

#[tokio::test]
#[ignore]
async fn upstream_probe_order_is_endpoint_group_team_tenant() {
    let resolver = RedisEndpointResolver::connect(REDIS_URL).await.unwrap();
    let record = record("rk3");

    // Only the tenant level is configured at first.
    resolver
        .configure_upstream(
            DirectoryLevel::Tenant,
            &record.tenant_id,
            &upstream("https://tenant.example.com/v1", "sk-tenant"),
        )
        .await
        .unwrap();
    resolver
        .configure_endpoint(&record.api_key, &record.alias, &record)
        .await
        .unwrap();

    let found = resolver.find_by_api_key(&record.api_key).await.unwrap();
    assert_eq!(
        found.upstream.candidates()[0].openai.base_url,
        "https://tenant.example.com/v1"
    );

    // A group-level upstream shadows the tenant one.
    resolver
        .configure_upstream(
            DirectoryLevel::Group,
            &record.group_id,
            &upstream("https://group.example.com/v1", "sk-group"),
        )
        .await
        .unwrap();

    let found = resolver.find_by_api_key(&record.api_key).await.unwrap();
    assert_eq!(
        found.upstream.candidates()[0].openai.base_url,
        "https://group.example.com/v1"
    );
}

#[tokio::test]
#[ignore]
async fn endpoint_without_any_upstream_is_not_found() {
    let resolver = RedisEndpointResolver::connect(REDIS_URL).await.unwrap();
    let record = record("rk4");

    resolver
        .configure_endpoint(&record.api_key, &record.alias, &record)
        .await
        .unwrap();

    let err = resolver.find_by_api_key(&record.api_key).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore]
async fn unknown_key_is_not_found() {
    let resolver = RedisEndpointResolver::connect(REDIS_URL).await.unwrap();
    let err = resolver
        .find_by_api_key("definitely-not-registered")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
