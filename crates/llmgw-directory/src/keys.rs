//! Key layout of the dynamic directory backend. The format is shared
//! infrastructure: other services read these keys, so the shapes are fixed.

pub fn endpoint_metadata_by_api_key(api_key: &str) -> String {
    format!("config:providers:auth:metadata:api_key:{api_key}")
}

pub fn endpoint_metadata_by_alias(alias: &str) -> String {
    format!("config:providers:auth:metadata:alias:{alias}")
}

pub fn upstream_by_tenant_id(id: &str) -> String {
    format!("config:providers:auth:metadata:upstream:tenant:{id}")
}

pub fn upstream_by_team_id(id: &str) -> String {
    format!("config:providers:auth:metadata:upstream:team:{id}")
}

pub fn upstream_by_group_id(id: &str) -> String {
    format!("config:providers:auth:metadata:upstream:group:{id}")
}

pub fn upstream_by_endpoint_id(id: &str) -> String {
    format!("config:providers:auth:metadata:upstream:endpoint:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes_are_stable() {
        assert_eq!(
            endpoint_metadata_by_api_key("k"),
            "config:providers:auth:metadata:api_key:k"
        );
        assert_eq!(
            endpoint_metadata_by_alias("a"),
            "config:providers:auth:metadata:alias:a"
        );
        assert_eq!(
            upstream_by_tenant_id("t"),
            "config:providers:auth:metadata:upstream:tenant:t"
        );
        assert_eq!(
            upstream_by_team_id("m"),
            "config:providers:auth:metadata:upstream:team:m"
        );
        assert_eq!(
            upstream_by_group_id("g"),
            "config:providers:auth:metadata:upstream:group:g"
        );
        assert_eq!(
            upstream_by_endpoint_id("e"),
            "config:providers:auth:metadata:upstream:endpoint:e"
        );
    }
}
