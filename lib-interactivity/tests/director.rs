use lib_interactivity::{director::SubscriberTokenGenerator, Director, TokenGenerator};
use serde_json::json;
use wiremock::{
  matchers::{body_json, header, method, path},
  Mock, MockServer, ResponseTemplate,
};

fn credentials() -> serde_json::Value {
  json!({
    "status": "success",
    "data": {
      "urls": ["wss://node.example/ws/v2/pub/1"],
      "jwt": "header.payload.signature",
      "streamAccountId": "k9Mwad",
      "iceServers": [{"urls": "stun:stun.example:3478"}]
    }
  })
}

#[tokio::test]
async fn publisher_credentials() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/director/publish"))
    .and(header("authorization", "Bearer publish-token"))
    .and(body_json(json!({"streamName": "myStream"})))
    .respond_with(ResponseTemplate::new(200).set_body_json(credentials()))
    .expect(1)
    .mount(&server)
    .await;

  let credentials = Director::new(server.uri())
    .publisher("publish-token", "myStream")
    .await
    .unwrap();

  assert_eq!(credentials.urls, vec!["wss://node.example/ws/v2/pub/1"]);
  assert_eq!(credentials.jwt, "header.payload.signature");
  assert_eq!(credentials.ice_servers.len(), 1);
}

#[tokio::test]
async fn unauthorized_subscriber_credentials() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/director/subscribe"))
    .and(body_json(json!({
      "streamAccountId": "k9Mwad",
      "streamName": "myStream",
      "unauthorizedSubscribe": true
    })))
    .respond_with(ResponseTemplate::new(200).set_body_json(credentials()))
    .expect(1)
    .mount(&server)
    .await;

  let credentials = Director::new(server.uri())
    .subscriber("myStream", "k9Mwad", None)
    .await
    .unwrap();

  assert_eq!(credentials.stream_account_id.as_deref(), Some("k9Mwad"));
}

#[tokio::test]
async fn token_generator_uses_subscriber_token() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/director/subscribe"))
    .and(header("authorization", "Bearer secret"))
    .and(body_json(json!({
      "streamAccountId": "k9Mwad",
      "streamName": "myStream",
      "unauthorizedSubscribe": false
    })))
    .respond_with(ResponseTemplate::new(200).set_body_json(credentials()))
    .expect(2)
    .mount(&server)
    .await;

  let generator =
    SubscriberTokenGenerator::new(Director::new(server.uri()), "myStream", "k9Mwad", Some("secret"));

  // every reconnection asks for fresh credentials
  generator.generate().await.unwrap();
  generator.generate().await.unwrap();
}

#[tokio::test]
async fn rejected_request_reports_message() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/api/director/publish"))
    .respond_with(ResponseTemplate::new(401).set_body_json(json!({
      "status": "fail",
      "data": {"message": "Unauthorized: Invalid token"}
    })))
    .mount(&server)
    .await;

  let error = Director::new(server.uri())
    .publisher("bad-token", "myStream")
    .await
    .unwrap_err();

  let message = error.to_string();
  assert!(message.contains("401"), "{}", message);
  assert!(message.contains("Invalid token"), "{}", message);
}

#[tokio::test]
async fn rejected_request_without_json() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
    .mount(&server)
    .await;

  let error = Director::new(server.uri())
    .subscriber("myStream", "k9Mwad", None)
    .await
    .unwrap_err();

  assert!(error.to_string().contains("503"));
}
