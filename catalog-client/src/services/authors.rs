use async_trait::async_trait;
use reqwest::Method;
use reqwest::multipart::Form;
use validator::Validate;

use super::{METHOD_OVERRIDE_FIELD, attach_file};
use crate::error::{ClientError, ClientResult};
use crate::http_client::{HttpClient, RequestBody, RequestOptions};
use crate::models::{Author, AuthorForm, Paginated};
use crate::params::ListParams;
use crate::query::ListFetcher;

const AUTHORS_PATH: &str = "/admin/authors";

/// Фильтр, который backend принимает без скобок.
pub const SEARCH_FILTER: &str = "search";

/// Авторы: `/admin/authors`.
#[derive(Debug, Clone)]
pub struct AuthorService {
    http: HttpClient,
}

impl AuthorService {
    /// Создаёт сервис поверх общего HTTP-клиента.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Страница авторов. Фильтр `search` уходит как `?search=`.
    pub async fn list(&self, params: &ListParams) -> ClientResult<Paginated<Author>> {
        let query = params.to_query_with(|field| {
            if field == SEARCH_FILTER {
                SEARCH_FILTER.to_string()
            } else {
                format!("filter[{field}]")
            }
        });
        self.http
            .request_data(
                Method::GET,
                AUTHORS_PATH,
                RequestBody::Empty,
                RequestOptions::with_query(query),
            )
            .await
    }

    /// Автор по идентификатору.
    pub async fn get(&self, id: i64) -> ClientResult<Author> {
        self.http
            .request_data(
                Method::GET,
                &format!("{AUTHORS_PATH}/{id}"),
                RequestBody::Empty,
                RequestOptions::default(),
            )
            .await
    }

    /// Создаёт автора; пароль обязателен.
    pub async fn create(&self, form: AuthorForm) -> ClientResult<Author> {
        form.validate()?;
        if form.password.is_none() {
            return Err(ClientError::InvalidRequest(
                "password is required for a new author".to_string(),
            ));
        }
        let body = author_multipart(form, false)?;
        self.http
            .request_data(
                Method::POST,
                AUTHORS_PATH,
                RequestBody::Multipart(body),
                RequestOptions::default(),
            )
            .await
    }

    /// Изменяет автора: multipart через POST с `_method=PUT`. Пароль не
    /// отправляется.
    pub async fn update(&self, id: i64, form: AuthorForm) -> ClientResult<Author> {
        form.validate()?;
        let body = author_multipart(form, true)?;
        self.http
            .request_data(
                Method::POST,
                &format!("{AUTHORS_PATH}/{id}"),
                RequestBody::Multipart(body),
                RequestOptions::default(),
            )
            .await
    }

    /// Удаляет автора.
    pub async fn delete(&self, id: i64) -> ClientResult<Option<String>> {
        self.http
            .acknowledge(
                Method::DELETE,
                &format!("{AUTHORS_PATH}/{id}"),
                RequestBody::Empty,
            )
            .await
    }

    /// Одобряет учётную запись автора.
    pub async fn approve(&self, id: i64) -> ClientResult<Option<String>> {
        self.http
            .acknowledge(
                Method::PATCH,
                &format!("{AUTHORS_PATH}/{id}/approve"),
                RequestBody::Empty,
            )
            .await
    }

    /// Блокирует учётную запись автора.
    pub async fn block(&self, id: i64) -> ClientResult<Option<String>> {
        self.http
            .acknowledge(
                Method::PATCH,
                &format!("{AUTHORS_PATH}/{id}/block"),
                RequestBody::Empty,
            )
            .await
    }
}

#[async_trait]
impl ListFetcher<Author> for AuthorService {
    async fn fetch(&self, params: &ListParams) -> ClientResult<Paginated<Author>> {
        self.list(params).await
    }
}

pub(crate) fn author_fields(
    form: &AuthorForm,
    method_override: bool,
) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if method_override {
        fields.push((METHOD_OVERRIDE_FIELD, "PUT".to_string()));
    }
    fields.push(("username", form.username.trim().to_string()));
    fields.push(("first_name", form.first_name.trim().to_string()));
    fields.push(("last_name", form.last_name.trim().to_string()));
    if !method_override {
        if let Some(password) = &form.password {
            fields.push(("password", password.clone()));
        }
    }
    fields.push(("bio", form.bio.clone()));
    fields.push(("country", form.country.clone()));
    fields
}

fn author_multipart(mut form: AuthorForm, method_override: bool) -> ClientResult<Form> {
    let photo = form.photo.take();
    let multipart = author_fields(&form, method_override)
        .into_iter()
        .fold(Form::new(), |multipart, (name, value)| multipart.text(name, value));
    match photo {
        Some(photo) => attach_file(multipart, "photo", photo),
        None => Ok(multipart),
    }
}
