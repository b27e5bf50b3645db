//! Lifecycle integration tests against a mocked cloud
//!
//! Every resource kind is driven through the orchestrator with wiremock
//! standing in for the service endpoints.

use async_trait::async_trait;
use hwc_reconcile::cloud::{CloudClient, CloudSettings, Credentials, PollConfig, ServiceClient};
use hwc_reconcile::resource::extract::{path_str, rfc3339_at, ObservedStateBuilder};
use hwc_reconcile::resource::tags::TagChannel;
use hwc_reconcile::resource::{CsmsSecret, PrivateCertificate, RdsInstance};
use hwc_reconcile::schema::ResourceDescriptor;
use hwc_reconcile::{
    Attributes, ChangeSet, DesiredState, Lifecycle, ProviderError, ReadOutcome, Resource,
    ResourceHandle, Result,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_test::assert_ok;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const PROJECT: &str = "0123456789abcdef0123456789abcdef";

fn service_client(server: &MockServer, service: &str) -> ServiceClient {
    let settings = CloudSettings::new("cn-north-4", PROJECT)
        .with_endpoint(service, &server.uri())
        .with_poll(PollConfig {
            delay: Duration::ZERO,
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(300),
        });
    CloudClient::new(settings, Credentials::Token("test-token".to_string()))
        .unwrap()
        .service_client(service)
        .unwrap()
}

/// Absolute mock path with `{p}` standing for the project id
fn project_path(rest: &str) -> String {
    format!("/{}", rest.replace("{p}", PROJECT))
}

/// Non-GET requests the server saw, as `(method, path, body)`
async fn writes(server: &MockServer) -> Vec<(String, String, Value)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r: &&Request| r.method.as_str() != "GET")
        .map(|r| {
            (
                r.method.as_str().to_string(),
                r.url.path().to_string(),
                serde_json::from_slice(&r.body).unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Minimal certificate kind: a name, a key algorithm and a validity block
struct TestCertificate {
    descriptor: ResourceDescriptor,
}

impl TestCertificate {
    fn new() -> Self {
        let mut descriptor: ResourceDescriptor = serde_json::from_value(json!({
            "display_name": "test certificate",
            "service": "ccm",
            "id_format": "<certificate_id>",
            "not_found": {"error_codes": ["PCA.10010002"]},
            "attributes": [
                {"name": "name", "type": "string", "required": true, "force_new": true},
                {"name": "key_algorithm", "type": "string", "required": true, "force_new": true,
                 "validation": {"one_of": ["RSA_2048", "EC_P256"]}},
                {"name": "validity", "type": "block", "required": true, "force_new": true,
                 "attributes": [
                     {"name": "type", "type": "string", "required": true},
                     {"name": "value", "type": "int", "required": true}
                 ]},
                {"name": "status", "type": "string", "computed": true},
                {"name": "created_at", "type": "string", "computed": true}
            ]
        }))
        .unwrap();
        descriptor.kind = "test_certificate".to_string();
        Self { descriptor }
    }
}

#[async_trait]
impl Resource for TestCertificate {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn create(
        &self,
        client: &ServiceClient,
        desired: &DesiredState,
    ) -> Result<ResourceHandle> {
        let body = client
            .post("v1/test-certificates", serde_json::to_value(desired)?)
            .await?;
        path_str(&body, "certificate_id")
            .and_then(ResourceHandle::new)
            .ok_or_else(|| ProviderError::MissingIdentifier {
                kind: self.kind().to_string(),
                field: "certificate_id".to_string(),
            })
    }

    async fn get(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<Value> {
        client.get(&format!("v1/test-certificates/{}", handle)).await
    }

    fn extract(&self, raw: &Value, _handle: &ResourceHandle, out: &mut ObservedStateBuilder<'_>) {
        out.copy("name", raw, "name")
            .copy("key_algorithm", raw, "key_algorithm")
            .copy("validity", raw, "validity")
            .copy("status", raw, "status")
            .set("created_at", rfc3339_at(raw, "create_time"));
    }

    async fn update_group(
        &self,
        _client: &ServiceClient,
        _handle: &ResourceHandle,
        _group: &str,
        _desired: &DesiredState,
        _changes: &ChangeSet,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, client: &ServiceClient, handle: &ResourceHandle) -> Result<()> {
        client
            .delete(&format!("v1/test-certificates/{}", handle), None)
            .await
            .map(|_| ())
    }

    fn tag_channel(&self, _handle: &ResourceHandle) -> Option<TagChannel> {
        None
    }
}

mod generic_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_create_then_read_back() {
        let server = MockServer::start().await;
        let desired = DesiredState::new()
            .with("name", json!("cert-a"))
            .with("key_algorithm", json!("RSA_2048"))
            .with("validity", json!({"type": "YEAR", "value": 1}));

        Mock::given(method("POST"))
            .and(path("/v1/test-certificates"))
            .and(body_json(json!({
                "name": "cert-a",
                "key_algorithm": "RSA_2048",
                "validity": {"type": "YEAR", "value": 1}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"certificate_id": "cert-0001"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/test-certificates/cert-0001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "certificate_id": "cert-0001",
                "name": "cert-a",
                "key_algorithm": "RSA_2048",
                "validity": {"type": "YEAR", "value": 1},
                "status": "ISSUED",
                "create_time": 1_700_000_000_000u64
            })))
            .mount(&server)
            .await;

        let resource = TestCertificate::new();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        let done = lifecycle.create(&desired).await.unwrap();

        assert_eq!(done.handle.as_str(), "cert-0001");
        assert_eq!(done.observed.get_str("status"), Some("ISSUED"));
        let created_at = done.observed.get_str("created_at").unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
        assert_eq!(created_at, "2023-11-14T22:13:20Z");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_desired_state_without_calls() {
        let server = MockServer::start().await;
        let desired = DesiredState::new()
            .with("key_algorithm", json!("DSA"))
            .with("validity", json!({"type": "YEAR"}));

        let resource = TestCertificate::new();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        match lifecycle.create(&desired).await {
            Err(ProviderError::Validation { violations, .. }) => {
                assert!(violations.iter().any(|v| v.starts_with("name:")));
                assert!(violations.iter().any(|v| v.starts_with("key_algorithm:")));
                assert!(violations.iter().any(|v| v.starts_with("validity.value:")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_missing_identifier_in_create_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/test-certificates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})))
            .mount(&server)
            .await;

        let desired = DesiredState::new()
            .with("name", json!("cert-a"))
            .with("key_algorithm", json!("RSA_2048"))
            .with("validity", json!([{"type": "YEAR", "value": 1}]));
        let resource = TestCertificate::new();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        assert!(matches!(
            lifecycle.create(&desired).await,
            Err(ProviderError::MissingIdentifier { .. })
        ));
    }

    #[tokio::test]
    async fn test_force_new_change_is_rejected_before_any_call() {
        let server = MockServer::start().await;
        let old = DesiredState::new()
            .with("name", json!("cert-a"))
            .with("key_algorithm", json!("RSA_2048"))
            .with("validity", json!({"type": "YEAR", "value": 1}));
        let new = old.clone().with("key_algorithm", json!("EC_P256"));

        let resource = TestCertificate::new();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        let handle = ResourceHandle::new("cert-0001").unwrap();
        match lifecycle.update(&handle, &old, &new).await {
            Err(ProviderError::ReplacementRequired { fields, .. }) => {
                assert_eq!(fields, vec!["key_algorithm"]);
            }
            other => panic!("expected replacement, got {:?}", other),
        }
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}

mod ccm_certificate {
    use super::*;

    fn desired(tags: Value) -> DesiredState {
        DesiredState::new()
            .with("issuer_id", json!("ca-1"))
            .with("key_algorithm", json!("RSA_2048"))
            .with("signature_algorithm", json!("SHA256"))
            .with("distinguished_name", json!({"common_name": "example.com"}))
            .with("validity", json!({"type": "YEAR", "value": 1}))
            .with("tags", tags)
    }

    async fn mount_read(server: &MockServer, tags: Value) {
        Mock::given(method("GET"))
            .and(path("/v1/private-certificates/c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "certificate_id": "c-1",
                "issuer_id": "ca-1",
                "key_algorithm": "RSA_2048",
                "signature_algorithm": "SHA256",
                "status": "ISSUED",
                "create_time": 1_700_000_000_000u64,
                "distinguished_name": {"common_name": "example.com"}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/private-certificates/c-1/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tags": tags})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_tag_only_update_removes_then_adds() {
        let server = MockServer::start().await;
        mount_read(&server, json!([{"key": "env", "value": "prod"}])).await;
        Mock::given(method("DELETE"))
            .and(path("/v1/private-certificates/c-1/tags/delete"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/private-certificates/c-1/tags/create"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let resource = PrivateCertificate::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        let handle = ResourceHandle::new("c-1").unwrap();
        let done = lifecycle
            .update(&handle, &desired(json!({"env": "dev"})), &desired(json!({"env": "prod"})))
            .await
            .unwrap();

        assert_eq!(
            writes(&server).await,
            vec![
                (
                    "DELETE".to_string(),
                    "/v1/private-certificates/c-1/tags/delete".to_string(),
                    json!({"tags": [{"key": "env", "value": "dev"}]})
                ),
                (
                    "POST".to_string(),
                    "/v1/private-certificates/c-1/tags/create".to_string(),
                    json!({"tags": [{"key": "env", "value": "prod"}]})
                ),
            ]
        );
        assert_eq!(done.observed.tags().get("env"), Some("prod"));
        assert_eq!(done.observed.tags().len(), 1);
        assert_eq!(done.observed.get_str("region"), Some("cn-north-4"));
    }

    #[tokio::test]
    async fn test_unchanged_update_sends_nothing() {
        let server = MockServer::start().await;
        mount_read(&server, json!([{"key": "env", "value": "dev"}])).await;

        let resource = PrivateCertificate::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        let handle = ResourceHandle::new("c-1").unwrap();
        let state = desired(json!({"env": "dev"}));
        lifecycle.update(&handle, &state, &state).await.unwrap();

        assert!(writes(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_code_on_400_reads_as_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/private-certificates/c-1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "PCA.10010002",
                "error_msg": "The certificate does not exist"
            })))
            .mount(&server)
            .await;

        let resource = PrivateCertificate::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        let outcome = lifecycle
            .read(&ResourceHandle::new("c-1").unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_other_400_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/private-certificates/c-1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "PCA.10010001",
                "error_msg": "Invalid parameter"
            })))
            .mount(&server)
            .await;

        let resource = PrivateCertificate::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        let err = lifecycle
            .read(&ResourceHandle::new("c-1").unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("error retrieving CCM private certificate"));
    }

    #[tokio::test]
    async fn test_failed_tag_query_leaves_tags_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/private-certificates/c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "certificate_id": "c-1",
                "status": "ISSUED"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/private-certificates/c-1/tags"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let resource = PrivateCertificate::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        let observed = lifecycle
            .read(&ResourceHandle::new("c-1").unwrap())
            .await
            .unwrap()
            .into_present()
            .expect("certificate should be present");

        assert_eq!(observed.get_str("status"), Some("ISSUED"));
        assert!(observed.get("tags").is_none());
    }

    #[tokio::test]
    async fn test_delete_of_missing_certificate_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/private-certificates/c-1"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "PCA.10010002"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resource = PrivateCertificate::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));
        assert_ok!(lifecycle.delete(&ResourceHandle::new("c-1").unwrap()).await);
    }

    /// Tag attach failures are logged on create but fatal on update
    #[tokio::test]
    async fn test_tag_failure_is_best_effort_on_create_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/private-certificates"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"certificate_id": "c-1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/private-certificates/c-1/tags/create"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error_code": "PCA.10000001",
                "error_msg": "internal error"
            })))
            .mount(&server)
            .await;
        mount_read(&server, json!([])).await;

        let resource = PrivateCertificate::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "ccm"));

        let done = lifecycle.create(&desired(json!({"env": "prod"}))).await.unwrap();
        assert_eq!(done.handle.as_str(), "c-1");
        assert!(done.observed.tags().is_empty());

        let err = lifecycle
            .update(&done.handle, &desired(json!({})), &desired(json!({"env": "prod"})))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("error updating tags of ccm_private_certificate c-1"));
        assert_eq!(err.api_error().map(|e| e.status), Some(500));
    }
}

mod csms_secret {
    use super::*;

    fn secret_path(rest: &str) -> String {
        project_path(&format!("v1/{{p}}/secrets/db-password{}", rest))
    }

    async fn mount_secret(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(secret_path("")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"secret": {
                "id": "0f1e2d3c",
                "name": "db-password",
                "state": "ENABLED",
                "kms_key_id": "key-1",
                "description": "orders database",
                "create_time": 1_700_000_000_000u64
            }})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(project_path("v1/{p}/csms/0f1e2d3c/tags")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tags": []})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_read_resolves_latest_version() {
        let server = MockServer::start().await;
        mount_secret(&server).await;
        Mock::given(method("GET"))
            .and(path(secret_path("/versions")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version_metadatas": [
                {"id": "v1", "create_time": 1_700_000_000_000u64},
                {"id": "v3", "create_time": 1_700_000_300_000u64},
                {"id": "v2", "create_time": 1_700_000_100_000u64}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(secret_path("/versions/v3")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": {
                "version_metadata": {"id": "v3"},
                "secret_string": "abc"
            }})))
            .mount(&server)
            .await;

        let resource = CsmsSecret::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "kms"));
        let observed = lifecycle
            .read(&ResourceHandle::new("0f1e2d3c/db-password").unwrap())
            .await
            .unwrap()
            .into_present()
            .unwrap();

        assert_eq!(observed.get_str("latest_version"), Some("v3"));
        assert_eq!(
            observed.get_str("secret_text"),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(observed.get_str("create_time"), Some("2023-11-14 22:13:20 UTC"));
        assert_eq!(observed.get_str("status"), Some("ENABLED"));
    }

    #[tokio::test]
    async fn test_failed_version_query_is_a_partial_field_set() {
        let server = MockServer::start().await;
        mount_secret(&server).await;
        Mock::given(method("GET"))
            .and(path(secret_path("/versions")))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let resource = CsmsSecret::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "kms"));
        match lifecycle
            .read(&ResourceHandle::new("0f1e2d3c/db-password").unwrap())
            .await
        {
            Err(ProviderError::PartialFieldSet { kind, errors }) => {
                assert_eq!(kind, "csms_secret");
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "latest_version");
            }
            other => panic!("expected partial field set, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_import_makes_no_call() {
        let server = MockServer::start().await;
        let resource = CsmsSecret::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "kms"));

        for raw in ["0f1e2d3c", "0f1e2d3c/", "a/b/c"] {
            assert!(matches!(
                lifecycle.import_and_read(raw).await,
                Err(ProviderError::InvalidIdentifierFormat { .. })
            ));
        }
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_secret_change_adds_a_version() {
        let server = MockServer::start().await;
        mount_secret(&server).await;
        Mock::given(method("POST"))
            .and(path(secret_path("/versions")))
            .and(body_json(json!({"secret_string": "new-value"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"version_metadata": {"id": "v2"}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(secret_path("/versions")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version_metadatas": [
                {"id": "v2", "create_time": 1_700_000_100_000u64}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(secret_path("/versions/v2")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": {
                "version_metadata": {"id": "v2"},
                "secret_string": "new-value"
            }})))
            .mount(&server)
            .await;

        let old = DesiredState::new()
            .with("name", json!("db-password"))
            .with("secret_text", json!("old-value"));
        let new = old.clone().with("secret_text", json!("new-value"));

        let resource = CsmsSecret::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "kms"));
        let done = lifecycle
            .update(&ResourceHandle::new("0f1e2d3c/db-password").unwrap(), &old, &new)
            .await
            .unwrap();

        assert_eq!(done.observed.get_str("latest_version"), Some("v2"));
        assert_eq!(writes(&server).await.len(), 1);
    }
}

mod rds_instance {
    use super::*;

    fn desired() -> DesiredState {
        DesiredState::new()
            .with("name", json!("orders-db"))
            .with("flavor", json!("rds.mysql.n1.large.2"))
            .with("availability_zone", json!(["cn-north-4a"]))
            .with("vpc_id", json!("vpc-1"))
            .with("subnet_id", json!("subnet-1"))
            .with("security_group_id", json!("sg-1"))
            .with("datastore", json!({"type": "MySQL", "version": "8.0"}))
            .with("volume_type", json!("CLOUDSSD"))
            .with("volume_size", json!(100))
    }

    async fn mount_job(server: &MockServer, status: &str, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(project_path("v3/{p}/jobs")))
            .and(query_param("id", "job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job": {"id": "job-1", "status": status, "fail_reason": "insufficient capacity"}
            })));
        match times {
            Some(n) => mock.up_to_n_times(n).mount(server).await,
            None => mock.mount(server).await,
        }
    }

    async fn mount_read(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(project_path("v3/{p}/instances")))
            .and(query_param("id", "i-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instances": [{
                "id": "i-1",
                "name": "orders-db",
                "status": "ACTIVE",
                "flavor_ref": "rds.mysql.n1.large.2",
                "volume": {"type": "CLOUDSSD", "size": 100},
                "datastore": {"type": "MySQL", "version": "8.0"},
                "vpc_id": "vpc-1",
                "subnet_id": "subnet-1",
                "security_group_id": "sg-1",
                "maintenance_window": "02:00-06:00",
                "port": 3306,
                "private_ips": ["192.168.0.10"],
                "public_ips": [],
                "created": "2023-11-14T22:13:20+0000",
                "nodes": [{"id": "n-1", "availability_zone": "cn-north-4a"}]
            }]})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(project_path("v3/{p}/instances/i-1/tags")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tags": []})))
            .mount(server)
            .await;
    }

    async fn mount_create(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(project_path("v3/{p}/instances")))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "instance": {"id": "i-1"},
                "job_id": "job-1"
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_waits_for_job() {
        let server = MockServer::start().await;
        mount_create(&server).await;
        mount_job(&server, "Running", Some(2)).await;
        mount_job(&server, "Completed", None).await;
        mount_read(&server).await;

        let resource = RdsInstance::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "rds"));
        let done = lifecycle.create(&desired()).await.unwrap();

        assert_eq!(done.handle.as_str(), "i-1");
        assert_eq!(done.observed.get_str("status"), Some("ACTIVE"));
        assert_eq!(done.observed.get_str("maintain_begin"), Some("02:00"));

        let job_polls = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().ends_with("/jobs"))
            .count();
        assert_eq!(job_polls, 3);
    }

    #[tokio::test]
    async fn test_failed_job_fails_create() {
        let server = MockServer::start().await;
        mount_create(&server).await;
        mount_job(&server, "Failed", None).await;

        let resource = RdsInstance::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "rds"));
        match lifecycle.create(&desired()).await {
            Err(ProviderError::JobFailed { job_id, reason }) => {
                assert_eq!(job_id, "job-1");
                assert_eq!(reason, "insufficient capacity");
            }
            other => panic!("expected job failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_job_that_never_ends_times_out() {
        let server = MockServer::start().await;
        mount_create(&server).await;
        mount_job(&server, "Running", None).await;

        let resource = RdsInstance::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "rds"));
        assert!(matches!(
            lifecycle.create(&desired()).await,
            Err(ProviderError::JobTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_instance_list_reads_as_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(project_path("v3/{p}/instances")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "instances": [],
                "total_count": 0
            })))
            .mount(&server)
            .await;

        let resource = RdsInstance::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "rds"));
        let outcome = lifecycle
            .read(&ResourceHandle::new("i-1").unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_delete_tolerates_404() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(project_path("v3/{p}/instances/i-1")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error_code": "DBS.200823",
                "error_msg": "The DB instance does not exist"
            })))
            .mount(&server)
            .await;

        let resource = RdsInstance::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "rds"));
        assert_ok!(lifecycle.delete(&ResourceHandle::new("i-1").unwrap()).await);
    }

    #[tokio::test]
    async fn test_groups_run_in_declared_order() {
        let server = MockServer::start().await;
        mount_read(&server).await;
        mount_job(&server, "Completed", None).await;
        Mock::given(method("PUT"))
            .and(path(project_path("v3/{p}/instances/i-1/name")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(project_path("v3/{p}/instances/i-1/action")))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"job_id": "job-1"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(project_path("v3/{p}/instances/i-1/alias")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let new = desired()
            .with("description", json!("orders"))
            .with("volume_size", json!(200))
            .with("name", json!("orders-db-2"));

        let resource = RdsInstance::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "rds"));
        lifecycle
            .update(&ResourceHandle::new("i-1").unwrap(), &desired(), &new)
            .await
            .unwrap();

        let calls: Vec<(String, String)> = writes(&server)
            .await
            .into_iter()
            .map(|(m, p, _)| (m, p.rsplit('/').next().unwrap_or_default().to_string()))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("PUT".to_string(), "name".to_string()),
                ("POST".to_string(), "action".to_string()),
                ("PUT".to_string(), "alias".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_volume_shrink_is_rejected() {
        let server = MockServer::start().await;
        let old = desired().with("volume_size", json!(200));

        let resource = RdsInstance::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "rds"));
        assert!(matches!(
            lifecycle
                .update(&ResourceHandle::new("i-1").unwrap(), &old, &desired())
                .await,
            Err(ProviderError::Validation { .. })
        ));
        assert!(writes(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_shrink_blocks_earlier_groups_too() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(project_path("v3/{p}/instances/i-1/name")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let old = desired().with("volume_size", json!(200));
        let new = desired().with("name", json!("orders-db-2"));

        let resource = RdsInstance::new().unwrap();
        let lifecycle = Lifecycle::new(&resource, service_client(&server, "rds"));
        let err = lifecycle
            .update(&ResourceHandle::new("i-1").unwrap(), &old, &new)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("cannot shrink the volume from 200 to 100 GB"));
        assert!(writes(&server).await.is_empty());
    }
}
