use reqwest::Method;
use serde::Serialize;
use validator::Validate;

use crate::error::ClientResult;
use crate::http_client::{HttpClient, RequestBody, RequestOptions};
use crate::models::{AuthData, LoginCredentials};

#[derive(Debug, Serialize)]
struct LoginRequestDto<'a> {
    username: &'a str,
    password: &'a str,
}

/// Вход и выход.
#[derive(Debug, Clone)]
pub struct AuthService {
    http: HttpClient,
}

impl AuthService {
    /// Создаёт сервис поверх общего HTTP-клиента.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// `POST /auth/login`. Сессию не меняет: это делает вызывающий.
    pub async fn login(&self, credentials: &LoginCredentials) -> ClientResult<AuthData> {
        credentials.validate()?;
        let body = RequestBody::json(&LoginRequestDto {
            username: credentials.username.trim(),
            password: &credentials.password,
        })?;
        self.http
            .request_data(Method::POST, "/auth/login", body, RequestOptions::default())
            .await
    }

    /// `POST /auth/logout`.
    pub async fn logout(&self) -> ClientResult<Option<String>> {
        self.http
            .acknowledge(Method::POST, "/auth/logout", RequestBody::Empty)
            .await
    }
}
