use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docksync::connectors::npm::{NpmClient, ProxyManager};
use docksync::models::meta::{ownership_meta, META_PROXY_INDEX};
use docksync::models::{ProxyHostPayload, ResourceKind};

fn token_mock() -> Mock {
    Mock::given(method("POST"))
        .and(path("/api/tokens"))
        .and(body_partial_json(json!({
            "identity": "admin@example.com",
            "secret": "changeme"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-1",
            "expires": "2099-01-01T00:00:00.000Z"
        })))
}

fn client(server: &MockServer) -> NpmClient {
    NpmClient::new(&server.uri(), "admin@example.com", "changeme")
}

fn sample_payload() -> ProxyHostPayload {
    ProxyHostPayload {
        domain_names: vec!["e.test".to_string()],
        forward_scheme: "http".to_string(),
        forward_host: "echo".to_string(),
        forward_port: 5678,
        ssl_forced: true,
        caching_enabled: false,
        block_exploits: true,
        allow_websocket_upgrade: false,
        http2_support: false,
        hsts_enabled: false,
        hsts_subdomains: false,
        certificate_id: 0,
        access_list_id: 0,
        advanced_config: String::new(),
        enabled: true,
        meta: ownership_meta("inst-a", "http://npm:81", "c-echo", META_PROXY_INDEX, 0),
    }
}

#[tokio::test]
async fn test_token_is_cached_across_calls() {
    let server = MockServer::start().await;
    token_mock().expect(1).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/nginx/proxy-hosts"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    client.list_proxy_hosts().await.expect("first list");
    client.list_proxy_hosts().await.expect("second list");
}

#[tokio::test]
async fn test_create_proxy_host_writes_flags_as_integers() {
    let server = MockServer::start().await;
    token_mock().mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/nginx/proxy-hosts"))
        .and(body_partial_json(json!({
            "domain_names": ["e.test"],
            "ssl_forced": 1,
            "block_exploits": 1,
            "caching_enabled": 0,
            "enabled": 1,
            "meta": {"managed_by": "docksync", "container_id": "c-echo"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 12,
            "domain_names": ["e.test"],
            "forward_scheme": "http",
            "forward_host": "echo",
            "forward_port": 5678,
            "ssl_forced": 1,
            "meta": {"managed_by": "docksync"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client(&server)
        .create_proxy_host(&sample_payload())
        .await
        .expect("create should succeed");
    assert_eq!(created.id, 12);
    assert!(created.ssl_forced, "0/1 read converts back to bool");
}

#[tokio::test]
async fn test_duplicate_domain_maps_to_conflict() {
    let server = MockServer::start().await;
    token_mock().mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/nginx/proxy-hosts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "e.test is already in use"}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_proxy_host(&sample_payload())
        .await
        .expect_err("duplicate must fail");
    assert!(err.is_conflict(), "got: {err}");
}

#[tokio::test]
async fn test_delete_missing_host_maps_to_not_found() {
    let server = MockServer::start().await;
    token_mock().mount(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/api/nginx/proxy-hosts/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Host not found"}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .delete_proxy_host(99)
        .await
        .expect_err("missing host must 404");
    assert!(err.is_not_found(), "got: {err}");
}

#[tokio::test]
async fn test_reads_tolerate_mixed_boolean_encodings() {
    let server = MockServer::start().await;
    token_mock().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/nginx/proxy-hosts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 1,
                "domain_names": ["a.test"],
                "forward_port": 80,
                "ssl_forced": true,
                "block_exploits": 1,
                "caching_enabled": "0"
            }
        ])))
        .mount(&server)
        .await;

    let hosts = client(&server).list_proxy_hosts().await.expect("list");
    assert!(hosts[0].ssl_forced);
    assert!(hosts[0].block_exploits);
    assert!(!hosts[0].caching_enabled);
}

#[tokio::test]
async fn test_server_error_maps_to_service_unavailable() {
    let server = MockServer::start().await;
    token_mock().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/nginx/streams"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client(&server)
        .list_streams()
        .await
        .expect_err("5xx must fail");
    assert!(
        matches!(
            err,
            docksync::connectors::ConnectorError::ServiceUnavailable(_)
        ),
        "got: {err}"
    );
}

#[tokio::test]
async fn test_rejected_token_surfaces_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tokens"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Invalid email or password"}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .list_proxy_hosts()
        .await
        .expect_err("bad credentials must fail");
    assert!(
        matches!(err, docksync::connectors::ConnectorError::Unauthorized(_)),
        "got: {err}"
    );
}

#[tokio::test]
async fn test_generic_surface_uses_kind_paths() {
    let server = MockServer::start().await;
    token_mock().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/nginx/redirection-hosts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/nginx/redirection-hosts/7"))
        .and(body_partial_json(json!({"forward_domain_name": "target.test"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let listed = client
        .list_resources(ResourceKind::RedirectionHost)
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);

    client
        .update_resource(
            ResourceKind::RedirectionHost,
            7,
            &json!({"forward_domain_name": "target.test"}),
        )
        .await
        .expect("update");
}
