use async_trait::async_trait;
use reqwest::Method;
use reqwest::multipart::Form;
use validator::Validate;

use super::{METHOD_OVERRIDE_FIELD, attach_file, path_key};
use crate::error::ClientResult;
use crate::http_client::{HttpClient, RequestBody, RequestOptions};
use crate::models::{Book, BookForm, Paginated};
use crate::params::ListParams;
use crate::query::ListFetcher;

const BOOKS_PATH: &str = "/admin/books";

/// Книги: `/admin/books`.
#[derive(Debug, Clone)]
pub struct BookService {
    http: HttpClient,
}

impl BookService {
    /// Создаёт сервис поверх общего HTTP-клиента.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Параметры списка по умолчанию: 15 на страницу, новые сверху.
    pub fn default_params() -> ListParams {
        ListParams::new(15).sorted_by("-created_at")
    }

    /// Страница книг. Фильтры: `title`, `isbn`, `category_id`, `is_active`.
    pub async fn list(&self, params: &ListParams) -> ClientResult<Paginated<Book>> {
        self.http
            .request_data(
                Method::GET,
                BOOKS_PATH,
                RequestBody::Empty,
                RequestOptions::with_query(params.to_query()),
            )
            .await
    }

    /// Книга по slug.
    pub async fn get(&self, slug: &str) -> ClientResult<Book> {
        let slug = path_key(slug, "book slug")?;
        self.http
            .request_data(
                Method::GET,
                &format!("{BOOKS_PATH}/{slug}"),
                RequestBody::Empty,
                RequestOptions::default(),
            )
            .await
    }

    /// Создаёт книгу (multipart).
    pub async fn create(&self, form: BookForm) -> ClientResult<Book> {
        form.validate()?;
        let body = book_multipart(form, false)?;
        self.http
            .request_data(
                Method::POST,
                BOOKS_PATH,
                RequestBody::Multipart(body),
                RequestOptions::default(),
            )
            .await
    }

    /// Изменяет книгу: multipart через POST с `_method=PUT`.
    pub async fn update(&self, slug: &str, form: BookForm) -> ClientResult<Book> {
        let slug = path_key(slug, "book slug")?;
        form.validate()?;
        let body = book_multipart(form, true)?;
        self.http
            .request_data(
                Method::POST,
                &format!("{BOOKS_PATH}/{slug}"),
                RequestBody::Multipart(body),
                RequestOptions::default(),
            )
            .await
    }

    /// Удаляет книгу.
    pub async fn delete(&self, slug: &str) -> ClientResult<Option<String>> {
        let slug = path_key(slug, "book slug")?;
        self.http
            .acknowledge(
                Method::DELETE,
                &format!("{BOOKS_PATH}/{slug}"),
                RequestBody::Empty,
            )
            .await
    }
}

#[async_trait]
impl ListFetcher<Book> for BookService {
    async fn fetch(&self, params: &ListParams) -> ClientResult<Paginated<Book>> {
        self.list(params).await
    }
}

/// Поля формы книги. Владелец не отправляется соавтором.
pub(crate) fn book_fields(form: &BookForm, method_override: bool) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if method_override {
        fields.push((METHOD_OVERRIDE_FIELD, "PUT".to_string()));
    }
    fields.push(("title", form.title.trim().to_string()));
    if let Some(category_id) = form.category_id {
        fields.push(("category_id", category_id.to_string()));
    }
    fields.push(("isbn", form.isbn.trim().to_string()));
    fields.push(("price", form.price.to_string()));
    fields.push(("publish_year", form.publish_year.to_string()));
    fields.push(("stock", form.stock.to_string()));
    if let Some(owner_id) = form.owner_id {
        fields.push(("owner_id", owner_id.to_string()));
    }
    for author_id in form
        .author_ids
        .iter()
        .filter(|id| Some(**id) != form.owner_id)
    {
        fields.push(("author_ids[]", author_id.to_string()));
    }
    fields
}

fn book_multipart(mut form: BookForm, method_override: bool) -> ClientResult<Form> {
    let cover = form.cover.take();
    let multipart = book_fields(&form, method_override)
        .into_iter()
        .fold(Form::new(), |multipart, (name, value)| multipart.text(name, value));
    match cover {
        Some(cover) => attach_file(multipart, "cover", cover),
        None => Ok(multipart),
    }
}
