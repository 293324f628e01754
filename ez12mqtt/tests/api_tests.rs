// Tests for `Ez1Api` against a wiremock HTTP server.

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ez12mqtt::api::{DeviceApi, Ez1Api};

async fn setup() -> (MockServer, Ez1Api) {
    let server = MockServer::start().await;
    let api = Ez1Api::with_client(reqwest::Client::new(), server.uri());
    (server, api)
}

fn envelope(data: serde_json::Value) -> serde_json::Value {
    json!({
        "data": data,
        "message": "SUCCESS",
        "deviceId": "E17000001234",
    })
}

#[tokio::test]
async fn device_info_is_parsed() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/getDeviceInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "deviceId": "E17000001234",
            "devVer": "EZ1 1.7.0",
            "ssid": "home",
            "ipAddr": "10.0.0.5",
            "minPower": "30",
            "maxPower": "800",
        }))))
        .mount(&server)
        .await;

    let info = api.device_info().await.unwrap();
    assert_eq!(info.device_id, "E17000001234");
    assert_eq!(info.dev_ver, "EZ1 1.7.0");
    assert_eq!(info.min_power_w(), Some(30.0));
}

#[tokio::test]
async fn output_data_is_parsed() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/getOutputData"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "p1": 120, "e1": 2.5, "te1": 300,
            "p2": 80, "e2": 1.1, "te2": 150,
        }))))
        .mount(&server)
        .await;

    let output = api.output_data().await.unwrap();
    assert_eq!(output.p1, 120.0);
    assert_eq!(output.e2, 1.1);
    assert_eq!(output.te2, 150.0);
}

#[tokio::test]
async fn alarm_and_max_power_are_parsed() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/getAlarm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "og": "1", "isce1": "0", "isce2": "0", "oe": "0",
        }))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/getMaxPower"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "power": "600" }))))
        .mount(&server)
        .await;

    assert_eq!(api.alarm().await.unwrap().og, "1");
    assert_eq!(api.max_power().await.unwrap().watts(), Some(600.0));
}

#[tokio::test]
async fn set_max_power_sends_query() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/setMaxPower"))
        .and(query_param("p", "750"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "power": "750" }))))
        .expect(1)
        .mount(&server)
        .await;

    let result = api.set_max_power(750).await.unwrap();
    assert_eq!(result.watts(), Some(750.0));
}

#[tokio::test]
async fn non_success_message_is_absence() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/getOutputData"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "p1": 1, "e1": 1, "te1": 1, "p2": 1, "e2": 1, "te2": 1 },
            "message": "FAILED",
            "deviceId": "E17000001234",
        })))
        .mount(&server)
        .await;

    assert!(api.output_data().await.is_none());
}

#[tokio::test]
async fn http_error_is_absence() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/getAlarm"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    assert!(api.alarm().await.is_none());
}

#[tokio::test]
async fn malformed_body_is_absence() {
    let (server, api) = setup().await;
    Mock::given(method("GET"))
        .and(path("/getMaxPower"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/getDeviceInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({ "deviceId": 7 }))))
        .mount(&server)
        .await;

    assert!(api.max_power().await.is_none());
    assert!(api.device_info().await.is_none());
}

#[tokio::test]
async fn unreachable_device_is_absence() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let api = Ez1Api::with_client(reqwest::Client::new(), uri);
    assert!(api.output_data().await.is_none());
}
