use geocode_standardizer::{AddressHandler, Config, Error, ErrorKind, Stage, STANDARDIZE_PROMPT};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COORDS: &str = "40.714224,-73.961452";
const GEMINI_PATH: &str = "/v1beta/models/gemini-1.0-pro:generateContent";
const GEOCODE_PATH: &str = "/maps/api/geocode/json";

fn gemini_config(server: &MockServer) -> Config {
    Config::gemini_api("gemini-key", "geo-key")
        .with_gemini_base_url(format!("{}/v1beta", server.uri()))
        .with_geocoding_endpoint(format!("{}{GEOCODE_PATH}", server.uri()))
}

fn function_call_body() -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{
                    "functionCall": { "name": "getAddress", "args": { "latlng": COORDS } }
                }]
            },
            "finishReason": "STOP",
            "index": 0
        }],
        "modelVersion": "gemini-1.0-pro"
    })
}

fn standardized_body() -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{
                    "text": "```json\n{\n\"STREET_ADDRESS\": \"277 Bedford Ave\",\n\"CITY\": \"Brooklyn\"\n}\n```"
                }]
            },
            "finishReason": "STOP",
            "safetyRatings": [
                { "category": "HARM_CATEGORY_HATE_SPEECH", "probability": "NEGLIGIBLE" },
                { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "NEGLIGIBLE" }
            ],
            "index": 0
        }]
    })
}

fn geocode_body() -> Value {
    json!({
        "results": [
            { "formatted_address": "277 Bedford Ave, Brooklyn, NY 11211, USA" },
            { "formatted_address": "Williamsburg, Brooklyn, NY, USA" }
        ],
        "status": "OK"
    })
}

async fn mount_first_pass(server: &MockServer, template: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(header("x-goog-api-key", "gemini-key"))
        .and(body_string_contains("functionDeclarations"))
        .respond_with(template)
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_second_pass(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(body_string_contains("BLOCK_ONLY_HIGH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(standardized_body()))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn round_trip_through_gemini_and_geocoder() {
    let server = MockServer::start().await;
    mount_first_pass(
        &server,
        ResponseTemplate::new(200).set_body_json(function_call_body()),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(body_partial_json(json!({
            "contents": [{
                "role": "user",
                "parts": [{
                    "text": format!(
                        "{STANDARDIZE_PROMPT}: Address String:277 Bedford Ave, Brooklyn, NY 11211, USA; Williamsburg, Brooklyn, NY, USA; "
                    )
                }]
            }]
        })))
        .and(body_string_contains("HARM_CATEGORY_DANGEROUS_CONTENT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(standardized_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .and(query_param("key", "geo-key"))
        .and(query_param("latlng", COORDS))
        .respond_with(ResponseTemplate::new(200).set_body_json(geocode_body()))
        .expect(1)
        .mount(&server)
        .await;

    let handler = AddressHandler::new(&gemini_config(&server)).unwrap();
    let body = json!({ "calls": [[COORDS]] }).to_string();

    let first = handler.handle(body.as_bytes()).await.unwrap();
    let reply: Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(
        reply,
        json!({
            "replies": ["```json{\"STREET_ADDRESS\": \"277 Bedford Ave\",\"CITY\": \"Brooklyn\"}```"]
        })
    );
}

#[tokio::test]
async fn identical_requests_get_identical_replies() {
    let server = MockServer::start().await;
    mount_first_pass(
        &server,
        ResponseTemplate::new(200).set_body_json(function_call_body()),
        2,
    )
    .await;
    mount_second_pass(&server, 2).await;
    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(geocode_body()))
        .expect(2)
        .mount(&server)
        .await;

    let handler = AddressHandler::new(&gemini_config(&server)).unwrap();
    let body = json!({ "calls": [[COORDS]] }).to_string();

    let first = handler.handle(body.as_bytes()).await.unwrap();
    let second = handler.handle(body.as_bytes()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn gemini_error_status_is_a_network_failure() {
    let server = MockServer::start().await;
    mount_first_pass(
        &server,
        ResponseTemplate::new(503).set_body_string("overloaded"),
        1,
    )
    .await;
    mount_second_pass(&server, 0).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(geocode_body()))
        .expect(0)
        .mount(&server)
        .await;

    let handler = AddressHandler::new(&gemini_config(&server)).unwrap();
    let error = handler.standardize(COORDS).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Network);
    assert_eq!(error.http_status(), 502);
    assert_eq!(error.stage(), Some(Stage::FunctionSchemaBuilt));
    match &error {
        Error::Model { source, .. } => assert_eq!(source.status_code(), Some(503)),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn geocoding_error_status_skips_second_pass() {
    let server = MockServer::start().await;
    mount_first_pass(
        &server,
        ResponseTemplate::new(200).set_body_json(function_call_body()),
        1,
    )
    .await;
    mount_second_pass(&server, 0).await;
    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let handler = AddressHandler::new(&gemini_config(&server)).unwrap();
    let error = handler.standardize(COORDS).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Network);
    assert_eq!(error.stage(), Some(Stage::CallDirectiveExtracted));
}

#[tokio::test]
async fn second_pass_error_status_is_a_network_failure() {
    let server = MockServer::start().await;
    mount_first_pass(
        &server,
        ResponseTemplate::new(200).set_body_json(function_call_body()),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(body_string_contains("BLOCK_ONLY_HIGH"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(geocode_body()))
        .expect(1)
        .mount(&server)
        .await;

    let handler = AddressHandler::new(&gemini_config(&server)).unwrap();
    let error = handler.standardize(COORDS).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Network);
    assert_eq!(error.http_status(), 502);
    assert_eq!(error.stage(), Some(Stage::ReconciliationSent));
}

#[tokio::test]
async fn unusable_geocoding_body_still_reaches_second_pass() {
    let server = MockServer::start().await;
    mount_first_pass(
        &server,
        ResponseTemplate::new(200).set_body_json(function_call_body()),
        1,
    )
    .await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{ "text": format!("{STANDARDIZE_PROMPT}: Address String:") }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(standardized_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let handler = AddressHandler::new(&gemini_config(&server)).unwrap();
    let reply = handler.standardize(COORDS).await.unwrap();

    assert!(reply.contains("Brooklyn"));
}

#[tokio::test]
async fn vertex_backend_uses_bearer_token() {
    let server = MockServer::start().await;
    let vertex_path = "/v1/projects/my-project/locations/us-central1/publishers/google/models/gemini-1.0-pro:generateContent";
    Mock::given(method("POST"))
        .and(path(vertex_path))
        .and(header("authorization", "Bearer vertex-token"))
        .and(body_string_contains("functionDeclarations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(function_call_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(vertex_path))
        .and(header("authorization", "Bearer vertex-token"))
        .and(body_string_contains("BLOCK_ONLY_HIGH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(standardized_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(GEOCODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(geocode_body()))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config::vertex_ai("my-project", "us-central1", "vertex-token", "geo-key")
        .with_gemini_base_url(format!("{}/v1", server.uri()))
        .with_geocoding_endpoint(format!("{}{GEOCODE_PATH}", server.uri()));
    let handler = AddressHandler::new(&config).unwrap();

    let reply = handler.standardize(COORDS).await.unwrap();
    assert!(reply.contains("277 Bedford Ave"));
}
