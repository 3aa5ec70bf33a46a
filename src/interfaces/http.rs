//! HTTP transport.
//!
//! Each route gathers its form, header, query and path values into a command
//! vector and hands it to the shared [`Dispatcher`]; no business rule lives
//! here.

use crate::application::decoder::CommandVector;
use crate::application::dispatcher::{Component, DispatchError, Dispatcher};
use crate::error::BankError;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, FromRequest, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tracing::info;

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
pub const ACCOUNT_NUMBER_HEADER: &str = "X-Auth-AccountNumber";
/// Token sent on the wire for commands that need no session.
const PUBLIC_TOKEN: &str = "0";

#[derive(Clone)]
pub struct ApiState {
    dispatcher: Arc<Dispatcher>,
}

/// `{"response": ...}` with 200, or `{"error": {...}}` with 400.
pub struct ApiReply(std::result::Result<Value, DispatchError>);

impl IntoResponse for ApiReply {
    fn into_response(self) -> Response {
        match self.0 {
            Ok(value) => (StatusCode::OK, Json(json!({ "response": value }))).into_response(),
            Err(err) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": err.body() }))).into_response()
            }
        }
    }
}

/// `Form` whose rejections answer in the same JSON shape as every other
/// error instead of axum's plain-text 415/422.
pub struct ApiForm<T>(pub T);

impl<S, T> FromRequest<S> for ApiForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiReply;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Form::<T>::from_request(req, state).await {
            Ok(Form(value)) => Ok(Self(value)),
            Err(rejection) => Err(form_rejected(rejection)),
        }
    }
}

fn form_rejected(rejection: FormRejection) -> ApiReply {
    ApiReply(Err(DispatchError {
        component: Component::Decoder,
        error: BankError::FormatError(rejection.body_text()),
    }))
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn session(headers: &HeaderMap) -> String {
    header(headers, AUTH_TOKEN_HEADER)
}

async fn run<I, S>(state: &ApiState, fields: I) -> ApiReply
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let vector = CommandVector::from_fields(fields);
    ApiReply(state.dispatcher.dispatch(&vector).await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoginForm {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CredentialForm {
    pub user_identification_number: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OpenAccountForm {
    pub account_holder_given_name: String,
    pub account_holder_family_name: String,
    pub account_holder_date_of_birth: String,
    pub account_holder_identification_number: String,
    pub account_holder_contact_number1: String,
    pub account_holder_contact_number2: String,
    pub account_holder_email_address: String,
    pub account_holder_address_line1: String,
    pub account_holder_address_line2: String,
    pub account_holder_address_line3: String,
    pub account_holder_postal_code: String,
    pub account_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PushTokenForm {
    pub push_token: String,
    pub platform: String,
    pub account_number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MerchantForm {
    pub name: String,
    pub description: String,
    pub contact_number: String,
    pub email_address: String,
    pub sector: String,
    pub account_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreditTransferForm {
    pub sender_details: String,
    pub recipient_details: String,
    pub amount: String,
    pub lat: String,
    pub lon: String,
    pub desc: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DepositForm {
    pub account_details: String,
    pub amount: String,
    pub lat: String,
    pub lon: String,
    pub desc: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub term: String,
}

async fn index() -> Json<Value> {
    Json(json!({ "response": "bankcore API" }))
}

async fn check_token(State(state): State<ApiState>, headers: HeaderMap) -> ApiReply {
    run(&state, [session(&headers), "appauth".into(), "1".into()]).await
}

async fn login(State(state): State<ApiState>, ApiForm(form): ApiForm<LoginForm>) -> ApiReply {
    let fields = [
        PUBLIC_TOKEN,
        "appauth",
        "2",
        form.user.as_str(),
        form.password.as_str(),
    ];
    run(&state, fields).await
}

async fn create_credential(
    State(state): State<ApiState>,
    ApiForm(form): ApiForm<CredentialForm>,
) -> ApiReply {
    let fields = [
        PUBLIC_TOKEN,
        "appauth",
        "3",
        form.user_identification_number.as_str(),
        form.password.as_str(),
    ];
    run(&state, fields).await
}

async fn remove_credential(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiForm(form): ApiForm<LoginForm>,
) -> ApiReply {
    let token = session(&headers);
    let fields = [
        token.as_str(),
        "appauth",
        "4",
        form.user.as_str(),
        form.password.as_str(),
    ];
    run(&state, fields).await
}

async fn logout(State(state): State<ApiState>, headers: HeaderMap) -> ApiReply {
    run(&state, [session(&headers), "appauth".into(), "5".into()]).await
}

async fn list_accounts(State(state): State<ApiState>, headers: HeaderMap) -> ApiReply {
    run(&state, [session(&headers), "acmt".into(), "1001".into()]).await
}

async fn open_account(
    State(state): State<ApiState>,
    ApiForm(form): ApiForm<OpenAccountForm>,
) -> ApiReply {
    let fields = [
        PUBLIC_TOKEN,
        "acmt",
        "1",
        form.account_holder_given_name.as_str(),
        form.account_holder_family_name.as_str(),
        form.account_holder_date_of_birth.as_str(),
        form.account_holder_identification_number.as_str(),
        form.account_holder_contact_number1.as_str(),
        form.account_holder_contact_number2.as_str(),
        form.account_holder_email_address.as_str(),
        form.account_holder_address_line1.as_str(),
        form.account_holder_address_line2.as_str(),
        form.account_holder_address_line3.as_str(),
        form.account_holder_postal_code.as_str(),
        form.account_type.as_str(),
    ];
    run(&state, fields).await
}

async fn close_account(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(account_number): Path<String>,
) -> ApiReply {
    let token = session(&headers);
    run(&state, [token.as_str(), "acmt", "19", account_number.as_str()]).await
}

async fn holder_accounts(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiReply {
    let token = session(&headers);
    run(&state, [token.as_str(), "acmt", "1002", id.as_str()]).await
}

async fn retrieve_accounts(State(state): State<ApiState>, headers: HeaderMap) -> ApiReply {
    let fields = [
        session(&headers),
        "acmt".into(),
        "1006".into(),
        header(&headers, "X-IDNumber"),
        header(&headers, "X-GivenName"),
        header(&headers, "X-FamilyName"),
        header(&headers, "X-EmailAddress"),
    ];
    run(&state, fields).await
}

async fn search_holders(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> ApiReply {
    let token = session(&headers);
    run(&state, [token.as_str(), "acmt", "1005", query.term.as_str()]).await
}

async fn search_account_numbers(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> ApiReply {
    let token = session(&headers);
    run(&state, [token.as_str(), "acmt", "1007", query.term.as_str()]).await
}

async fn push_token(
    code: &str,
    state: &ApiState,
    headers: &HeaderMap,
    form: PushTokenForm,
) -> ApiReply {
    let token = session(headers);
    let mut fields = vec![
        token.as_str(),
        "acmt",
        code,
        form.push_token.as_str(),
        form.platform.as_str(),
    ];
    if !form.account_number.is_empty() {
        fields.push(form.account_number.as_str());
    }
    run(state, fields).await
}

async fn add_push_token(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiForm(form): ApiForm<PushTokenForm>,
) -> ApiReply {
    push_token("1003", &state, &headers, form).await
}

async fn remove_push_token(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiForm(form): ApiForm<PushTokenForm>,
) -> ApiReply {
    push_token("1004", &state, &headers, form).await
}

async fn create_merchant(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiForm(form): ApiForm<MerchantForm>,
) -> ApiReply {
    let token = session(&headers);
    let fields = [
        token.as_str(),
        "acmt",
        "1010",
        form.name.as_str(),
        form.description.as_str(),
        form.contact_number.as_str(),
        form.email_address.as_str(),
        form.sector.as_str(),
        form.account_type.as_str(),
    ];
    run(&state, fields).await
}

async fn search_merchants(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> ApiReply {
    let token = session(&headers);
    run(&state, [token.as_str(), "acmt", "1012", query.term.as_str()]).await
}

async fn view_merchant(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(merchant_id): Path<String>,
) -> ApiReply {
    let token = session(&headers);
    run(&state, [token.as_str(), "acmt", "1011", merchant_id.as_str()]).await
}

async fn remove_merchant(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(merchant_id): Path<String>,
) -> ApiReply {
    let token = session(&headers);
    run(&state, [token.as_str(), "acmt", "1013", merchant_id.as_str()]).await
}

async fn credit_transfer(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiForm(form): ApiForm<CreditTransferForm>,
) -> ApiReply {
    let token = session(&headers);
    let fields = [
        token.as_str(),
        "pain",
        "1",
        form.sender_details.as_str(),
        form.recipient_details.as_str(),
        form.amount.as_str(),
        form.lat.as_str(),
        form.lon.as_str(),
        form.desc.as_str(),
    ];
    run(&state, fields).await
}

async fn deposit(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiForm(form): ApiForm<DepositForm>,
) -> ApiReply {
    let token = session(&headers);
    let fields = [
        token.as_str(),
        "pain",
        "1000",
        form.account_details.as_str(),
        form.amount.as_str(),
        form.lat.as_str(),
        form.lon.as_str(),
        form.desc.as_str(),
    ];
    run(&state, fields).await
}

async fn list_transactions(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((page, per_page)): Path<(String, String)>,
) -> ApiReply {
    let fields = [
        session(&headers),
        "pain".into(),
        "1001".into(),
        header(&headers, ACCOUNT_NUMBER_HEADER),
        page,
        per_page,
    ];
    run(&state, fields).await
}

async fn list_transactions_since(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path((page, per_page, timestamp)): Path<(String, String, String)>,
) -> ApiReply {
    let fields = [
        session(&headers),
        "pain".into(),
        "1001".into(),
        header(&headers, ACCOUNT_NUMBER_HEADER),
        page,
        per_page,
        timestamp,
    ];
    run(&state, fields).await
}

pub fn router(dispatcher: Arc<Dispatcher>, max_in_flight: usize) -> Router {
    let state = ApiState { dispatcher };
    Router::new()
        .route("/", get(index))
        .route("/auth", get(check_token))
        .route("/auth/login", post(login))
        .route(
            "/auth/credentials",
            post(create_credential).delete(remove_credential),
        )
        .route("/auth/logout", post(logout))
        .route("/accounts", get(list_accounts).post(open_account))
        .route("/accounts/{account_number}", delete(close_account))
        .route("/accounts/holder/{id}", get(holder_accounts))
        .route("/accounts/retrieve", post(retrieve_accounts))
        .route("/accounts/search", get(search_holders))
        .route("/accounts/search/numbers", get(search_account_numbers))
        .route(
            "/accounts/push-tokens",
            post(add_push_token).delete(remove_push_token),
        )
        .route("/merchants", post(create_merchant))
        .route("/merchants/search", get(search_merchants))
        .route(
            "/merchants/{merchant_id}",
            get(view_merchant).delete(remove_merchant),
        )
        .route("/transactions/credit", post(credit_transfer))
        .route("/transactions/deposit", post(deposit))
        .route("/transactions/{page}/{per_page}", get(list_transactions))
        .route(
            "/transactions/{page}/{per_page}/{timestamp}",
            get(list_transactions_since),
        )
        .layer(GlobalConcurrencyLimitLayer::new(max_in_flight.max(1)))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    max_in_flight: usize,
) -> std::io::Result<()> {
    info!("HTTP API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(dispatcher, max_in_flight)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::fixture;

    #[tokio::test]
    async fn test_error_reply_is_bad_request() {
        let fixture = fixture();
        let dispatcher = Dispatcher::bootstrap(fixture.ctx.clone()).await.unwrap();
        let state = ApiState {
            dispatcher: Arc::new(dispatcher),
        };
        let reply = run(&state, ["abc", "acmt", "1001"]).await;
        assert_eq!(reply.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
