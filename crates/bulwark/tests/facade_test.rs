//! Configuration file to working client, through the facade only.

use bulwark::{AuthConfig, BreakerState, BulwarkConfig, ResilientClient};
use std::io::Write;
use wiremock::matchers::{path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn client_built_from_toml_file_calls_provider() {
    let server = MockServer::start().await;
    Mock::given(path("/3/movie/603"))
        .and(query_param("api_key", "k"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"title": "The Matrix"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    write!(
        file,
        r#"
[clients.tmdb]
base_url = "{}/3"
threshold = 2
rate_limit_calls = 40
rate_limit_seconds = 10

[clients.tmdb.auth]
type = "api_key_param"
param = "api_key"
key = "k"
"#,
        server.uri()
    )
    .expect("write config");

    let config = BulwarkConfig::from_file(file.path()).expect("load");
    let tmdb = config.client("tmdb").expect("tmdb configured").clone();
    assert!(matches!(tmdb.auth(), AuthConfig::ApiKeyParam { .. }));

    let client = ResilientClient::builder("tmdb", tmdb).build().expect("client");
    let movie: serde_json::Value = client.get_json("/movie/603").await.expect("movie");
    assert_eq!(movie["title"], "The Matrix");
    assert_eq!(client.breaker_state(), BreakerState::Closed);
    assert_eq!(client.stats().success_count, 1);
}

#[test]
fn invalid_client_section_is_rejected_with_its_name() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    write!(
        file,
        r#"
[clients.sonarr]
rate_limit_calls = 5
"#
    )
    .expect("write config");

    let err = BulwarkConfig::from_file(file.path()).expect_err("half window");
    assert!(err.to_string().contains("client 'sonarr'"));
}
