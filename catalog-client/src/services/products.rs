use async_trait::async_trait;
use reqwest::Method;
use validator::Validate;

use crate::error::ClientResult;
use crate::http_client::{HttpClient, RequestBody, RequestOptions};
use crate::models::{Paginated, Product, ProductInput, ProductPage};
use crate::params::ListParams;
use crate::query::ListFetcher;

const PRODUCTS_PATH: &str = "/products";

/// Фильтр полнотекстового поиска товаров.
pub const QUERY_FILTER: &str = "q";

/// Товары (вариант каталога без конверта `data`, пагинация `limit/skip`).
#[derive(Debug, Clone)]
pub struct ProductService {
    http: HttpClient,
}

impl ProductService {
    /// Создаёт сервис поверх общего HTTP-клиента.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Параметры списка по умолчанию: 20 на страницу.
    pub fn default_params() -> ListParams {
        ListParams::new(20)
    }

    /// `GET /products?limit&skip`.
    pub async fn list(&self, limit: u32, skip: u32) -> ClientResult<Paginated<Product>> {
        let page: ProductPage = self
            .http
            .request(
                Method::GET,
                PRODUCTS_PATH,
                RequestBody::Empty,
                RequestOptions::with_query(window(limit, skip)),
            )
            .await?;
        Ok(page.into())
    }

    /// Товар по идентификатору.
    pub async fn get(&self, id: i64) -> ClientResult<Product> {
        self.http
            .request(
                Method::GET,
                &format!("{PRODUCTS_PATH}/{id}"),
                RequestBody::Empty,
                RequestOptions::default(),
            )
            .await
    }

    /// `POST /products/add`.
    pub async fn add(&self, input: &ProductInput) -> ClientResult<Product> {
        input.validate()?;
        self.http
            .request(
                Method::POST,
                &format!("{PRODUCTS_PATH}/add"),
                RequestBody::json(input)?,
                RequestOptions::default(),
            )
            .await
    }

    /// Изменяет товар.
    pub async fn update(&self, id: i64, input: &ProductInput) -> ClientResult<Product> {
        input.validate()?;
        self.http
            .request(
                Method::PUT,
                &format!("{PRODUCTS_PATH}/{id}"),
                RequestBody::json(input)?,
                RequestOptions::default(),
            )
            .await
    }

    /// Удаляет товар; возвращает удалённую запись.
    pub async fn delete(&self, id: i64) -> ClientResult<Product> {
        self.http
            .request(
                Method::DELETE,
                &format!("{PRODUCTS_PATH}/{id}"),
                RequestBody::Empty,
                RequestOptions::default(),
            )
            .await
    }

    /// `GET /products/search?q=`.
    pub async fn search(&self, q: &str) -> ClientResult<Paginated<Product>> {
        self.search_page(q, None).await
    }

    async fn search_page(
        &self,
        q: &str,
        window_query: Option<(u32, u32)>,
    ) -> ClientResult<Paginated<Product>> {
        let mut query = vec![(QUERY_FILTER.to_string(), q.trim().to_string())];
        if let Some((limit, skip)) = window_query {
            query.extend(window(limit, skip));
        }
        let page: ProductPage = self
            .http
            .request(
                Method::GET,
                &format!("{PRODUCTS_PATH}/search"),
                RequestBody::Empty,
                RequestOptions::with_query(query),
            )
            .await?;
        Ok(page.into())
    }
}

fn window(limit: u32, skip: u32) -> Vec<(String, String)> {
    vec![
        ("limit".to_string(), limit.to_string()),
        ("skip".to_string(), skip.to_string()),
    ]
}

/// `page/per_page` -> `limit/skip`.
pub(crate) fn limit_skip(params: &ListParams) -> (u32, u32) {
    let limit = params.per_page.max(1);
    let skip = params.page.saturating_sub(1).saturating_mul(limit);
    (limit, skip)
}

#[async_trait]
impl ListFetcher<Product> for ProductService {
    async fn fetch(&self, params: &ListParams) -> ClientResult<Paginated<Product>> {
        let (limit, skip) = limit_skip(params);
        match params.filter(QUERY_FILTER) {
            Some(q) => self.search_page(q, Some((limit, skip))).await,
            None => self.list(limit, skip).await,
        }
    }
}
