use actix_web::{
    body::MessageBody,
    dev::ServiceResponse,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
    Error,
};
use ceg_common::Secret;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;

use crate::{
    auth::{JwtClaims, Role, TokenIssuer, TokenValidator},
    config::AuthConfig,
    middleware::JwtMiddlewareFactory,
};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this secret anywhere.
pub fn get_auth_config() -> AuthConfig {
    AuthConfig { jwt_secret: Secret::new("endpoint-tests-only-f1d3c9a0b27e48e5".to_string()), leeway_secs: 0 }
}

pub fn issue_token(sub: &str, roles: &[Role], expiry: DateTime<Utc>) -> String {
    let claims = JwtClaims::new(sub, roles, expiry);
    TokenIssuer::new(&get_auth_config()).issue_token(&claims).expect("Failed to sign token")
}

pub fn valid_token(sub: &str, roles: &[Role]) -> String {
    issue_token(sub, roles, Utc::now() + Duration::hours(1))
}

pub async fn get_request<F>(token: &str, path: &str, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let req = with_token(TestRequest::get().uri(path), token);
    send(req, configure).await
}

pub async fn post_request<T, F>(token: &str, path: &str, body: &T, configure: F) -> (StatusCode, String)
where
    T: Serialize,
    F: FnOnce(&mut ServiceConfig),
{
    let req = with_token(TestRequest::post().uri(path).set_json(body), token);
    send(req, configure).await
}

fn with_token(req: TestRequest, token: &str) -> TestRequest {
    if token.is_empty() {
        req
    } else {
        req.insert_header(("Authorization", format!("Bearer {token}")))
    }
}

/// Mounts the configured routes under `/api` behind the JWT middleware, the same way the server does. Errors raised by
/// middleware are rendered into the response they would produce in a running server.
async fn send<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let validator = TokenValidator::new(&get_auth_config());
    let app = App::new().service(web::scope("/api").wrap(JwtMiddlewareFactory::new(validator)).configure(configure));
    let service = test::init_service(app).await;
    debug!("Making request");
    read_response(test::try_call_service(&service, req.to_request()).await)
}

/// Sends a request straight to an unauthenticated service, as the provider callbacks are mounted.
pub async fn callback_request<T, F>(path: &str, body: &T, headers: &[(&str, &str)], configure: F) -> (StatusCode, String)
where
    T: Serialize,
    F: FnOnce(&mut ServiceConfig),
{
    let mut req = TestRequest::post().uri(path).set_json(body);
    for (name, value) in headers {
        req = req.insert_header((name.to_string(), value.to_string()));
    }
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    read_response(test::try_call_service(&service, req.to_request()).await)
}

fn read_response<B: MessageBody + 'static>(result: Result<ServiceResponse<B>, Error>) -> (StatusCode, String) {
    let res = match result {
        Ok(res) => res.into_parts().1.map_into_boxed_body(),
        Err(e) => e.error_response(),
    };
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}
