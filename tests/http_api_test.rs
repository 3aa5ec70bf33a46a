mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bankcore::interfaces::http::{ACCOUNT_NUMBER_HEADER, AUTH_TOKEN_HEADER, router};
use common::{bank, decimal};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::ServiceExt;

const FORM: &str = "application/x-www-form-urlencoded";
const DEVICE: &str = "PushToken=bob-phone&Platform=android";

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn form(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", FORM);
    if let Some(token) = token {
        builder = builder.header(AUTH_TOKEN_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(AUTH_TOKEN_HEADER, token)
        .body(Body::empty())
        .unwrap()
}

fn open_form(id: &str, given: &str, account_type: &str) -> String {
    format!(
        "AccountHolderGivenName={given}&AccountHolderFamilyName=Tester\
         &AccountHolderDateOfBirth=19900101&AccountHolderIdentificationNumber={id}\
         &AccountHolderContactNumber1=0821234567&AccountHolderEmailAddress={given}%40example.com\
         &AccountHolderAddressLine1=1+Main+Road&AccountHolderPostalCode=8001\
         &AccountType={account_type}"
    )
}

/// Opens an account, registers a password and logs in over HTTP.
async fn enrol(app: &Router, id: &str, given: &str) -> (String, String) {
    let request = form("POST", "/accounts", None, &open_form(id, given, "cheque"));
    let (status, opened) = send(app, request).await;
    assert_eq!(status, StatusCode::OK, "{}", opened);
    let account_number = opened["response"]["account_number"].as_str().unwrap().to_string();

    let body = format!("UserIdentificationNumber={}&Password=password1", id);
    let (status, _) = send(app, form("POST", "/auth/credentials", None, &body)).await;
    assert_eq!(status, StatusCode::OK);

    let body = format!("User={}&Password=password1", id);
    let (status, login) = send(app, form("POST", "/auth/login", None, &body)).await;
    assert_eq!(status, StatusCode::OK);
    let token = login["response"]["token"].as_str().unwrap().to_string();
    (token, account_number)
}

#[tokio::test]
async fn test_index() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["response"].is_string());
}

#[tokio::test]
async fn test_missing_token_is_bad_request() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);

    let request = Request::builder().uri("/accounts").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "authentication");
    assert_eq!(body["error"]["component"], "auth");
}

#[tokio::test]
async fn test_enrol_and_check_session() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);
    let (token, account_number) = enrol(&app, "8001015009087", "Alice").await;

    let (status, check) = send(&app, get("/auth", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["response"]["identification_number"], "8001015009087");

    let (status, accounts) = send(&app, get("/accounts", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let accounts = accounts["response"].as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["account_number"], account_number.as_str());
    assert_eq!(accounts[0]["holder_name"], "Tester,Alice");

    let (status, numbers) = send(&app, get("/accounts/holder/8001015009087", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(numbers["response"], serde_json::json!([account_number]));

    let (status, _) = send(&app, form("POST", "/auth/logout", Some(&token), "")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get("/auth", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_credit_transfer_and_history() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);
    let (alice, alice_number) = enrol(&app, "8001015009087", "Alice").await;
    let (_, bob_number) = enrol(&app, "8101015009088", "Bob").await;

    let body = format!(
        "SenderDetails={}%40&RecipientDetails={}%40&Amount=40.00&Lat=&Lon=&Desc=rent",
        alice_number, bob_number
    );
    let request = form("POST", "/transactions/credit", Some(&alice), &body);
    let (status, transfer) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{}", transfer);
    assert_eq!(transfer["response"]["status"], "approved");
    assert_eq!(decimal(&transfer["response"]["fee"]), dec!(0.004));

    let request = Request::builder()
        .uri("/transactions/0/10")
        .header(AUTH_TOKEN_HEADER, alice.as_str())
        .header(ACCOUNT_NUMBER_HEADER, alice_number.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, history) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let entries = history["response"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(decimal(&entries[0]["amount"]), dec!(40));

    let request = Request::builder()
        .uri("/transactions/0/101")
        .header(AUTH_TOKEN_HEADER, alice.as_str())
        .header(ACCOUNT_NUMBER_HEADER, alice_number.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
}

#[tokio::test]
async fn test_overspend_is_rejected() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);
    let (alice, alice_number) = enrol(&app, "8001015009087", "Alice").await;
    let (_, bob_number) = enrol(&app, "8101015009088", "Bob").await;

    let body = format!(
        "SenderDetails={}%40&RecipientDetails={}%40&Amount=150.00",
        alice_number, bob_number
    );
    let request = form("POST", "/transactions/credit", Some(&alice), &body);
    let (status, reply) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["error"]["kind"], "insufficient_funds");
    assert_eq!(reply["error"]["component"], "transactions");
}

#[tokio::test]
async fn test_search_terms() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);
    let (token, account_number) = enrol(&app, "8001015009087", "Alice").await;

    let (status, body) = send(&app, get("/accounts/search?term=Al", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");

    let (status, body) = send(&app, get("/accounts/search?term=Alice", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"][0]["identification_number"], "8001015009087");
    assert!(body["response"][0].get("email_address").is_none());

    let uri = format!("/accounts/search/numbers?term={}", &account_number[..6]);
    let (status, body) = send(&app, get(&uri, &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"][0]["account_number"], account_number.as_str());
}

#[tokio::test]
async fn test_merchant_lifecycle() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);
    let (token, _) = enrol(&app, "8001015009087", "Alice").await;

    let body = "Name=Corner+Cafe&Description=Coffee&ContactNumber=0211234567\
                &EmailAddress=cafe%40example.com&Sector=food&AccountType=merchant";
    let (status, created) = send(&app, form("POST", "/merchants", Some(&token), body)).await;
    assert_eq!(status, StatusCode::OK, "{}", created);
    let merchant_id = created["response"]["merchant_id"].as_str().unwrap().to_string();

    let (status, found) = send(&app, get("/merchants/search?term=Corner", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["response"][0]["merchant_id"], merchant_id.as_str());

    let uri = format!("/merchants/{}", merchant_id);
    let (status, viewed) = send(&app, get(&uri, &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(viewed["response"]["name"], "Corner Cafe");

    let (status, _) = send(&app, form("DELETE", &uri, Some(&token), "")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, get(&uri, &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
async fn test_push_tokens_receive_payment_notifications() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);
    let (alice, alice_number) = enrol(&app, "8001015009087", "Alice").await;
    let (bob, bob_number) = enrol(&app, "8101015009088", "Bob").await;

    let request = form("POST", "/accounts/push-tokens", Some(&bob), DEVICE);
    let (status, reply) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
    assert_eq!(reply["response"]["accounts"], 1);

    let body = format!(
        "SenderDetails={}%40&RecipientDetails={}%40&Amount=5",
        alice_number, bob_number
    );
    let request = form("POST", "/transactions/credit", Some(&alice), &body);
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let messages = bank.sink.wait_for("bob-phone", 1).await;
    assert_eq!(messages, vec!["Payment received".to_string()]);

    let request = form("DELETE", "/accounts/push-tokens", Some(&bob), DEVICE);
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_non_form_body_is_format_error() {
    let bank = bank().await;
    let app = router(bank.dispatcher.clone(), 8);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"User":"8001015009087","Password":"password1"}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "format");
    assert_eq!(body["error"]["component"], "decoder");

    let request = Request::builder()
        .method("POST")
        .uri("/transactions/credit")
        .body(Body::from("Amount=5"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "format");
}
