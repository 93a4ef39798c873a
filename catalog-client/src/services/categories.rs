use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use validator::Validate;

use super::path_key;
use crate::error::ClientResult;
use crate::http_client::{HttpClient, RequestBody, RequestOptions};
use crate::models::{Category, CategoryInput, Paginated};
use crate::params::ListParams;
use crate::query::ListFetcher;

const CATEGORIES_PATH: &str = "/admin/categories";

#[derive(Debug, Serialize)]
struct CategoryRequestDto<'a> {
    name: &'a str,
    parent_id: Option<i64>,
}

/// Категории: `/admin/categories`.
#[derive(Debug, Clone)]
pub struct CategoryService {
    http: HttpClient,
}

impl CategoryService {
    /// Создаёт сервис поверх общего HTTP-клиента.
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Параметры списка по умолчанию: корневые категории вместе с потомками.
    pub fn default_params() -> ListParams {
        ListParams::new(15)
            .filtered("roots", "true")
            .including("childrenRecursive")
    }

    /// Страница категорий. Фильтры: `name`, `slug`, `parent_id`, `roots`.
    pub async fn list(&self, params: &ListParams) -> ClientResult<Paginated<Category>> {
        self.http
            .request_data(
                Method::GET,
                CATEGORIES_PATH,
                RequestBody::Empty,
                RequestOptions::with_query(params.to_query()),
            )
            .await
    }

    /// Категория по slug с указанными связями.
    pub async fn get(&self, slug: &str, includes: &[String]) -> ClientResult<Category> {
        let slug = path_key(slug, "category slug")?;
        let query = if includes.is_empty() {
            Vec::new()
        } else {
            vec![("include".to_string(), includes.join(","))]
        };
        self.http
            .request_data(
                Method::GET,
                &format!("{CATEGORIES_PATH}/{slug}"),
                RequestBody::Empty,
                RequestOptions::with_query(query),
            )
            .await
    }

    /// Создаёт категорию.
    pub async fn create(&self, input: &CategoryInput) -> ClientResult<Category> {
        input.validate()?;
        self.http
            .request_data(
                Method::POST,
                CATEGORIES_PATH,
                category_body(input)?,
                RequestOptions::default(),
            )
            .await
    }

    /// Изменяет категорию.
    pub async fn update(&self, slug: &str, input: &CategoryInput) -> ClientResult<Category> {
        let slug = path_key(slug, "category slug")?;
        input.validate()?;
        self.http
            .request_data(
                Method::PUT,
                &format!("{CATEGORIES_PATH}/{slug}"),
                category_body(input)?,
                RequestOptions::default(),
            )
            .await
    }

    /// Удаляет категорию. Категорию с потомками backend не удаляет.
    pub async fn delete(&self, slug: &str) -> ClientResult<Option<String>> {
        let slug = path_key(slug, "category slug")?;
        self.http
            .acknowledge(
                Method::DELETE,
                &format!("{CATEGORIES_PATH}/{slug}"),
                RequestBody::Empty,
            )
            .await
    }

    /// Прямые потомки категории.
    pub async fn subcategories(&self, parent_id: i64) -> ClientResult<Vec<Category>> {
        self.http
            .request_data(
                Method::GET,
                &format!("{CATEGORIES_PATH}/{parent_id}/subcategories"),
                RequestBody::Empty,
                RequestOptions::default(),
            )
            .await
    }
}

fn category_body(input: &CategoryInput) -> ClientResult<RequestBody> {
    RequestBody::json(&CategoryRequestDto {
        name: input.name.trim(),
        parent_id: input.parent_id,
    })
}

#[async_trait]
impl ListFetcher<Category> for CategoryService {
    async fn fetch(&self, params: &ListParams) -> ClientResult<Paginated<Category>> {
        self.list(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_request_tree() {
        let query = CategoryService::default_params().to_query();
        assert!(query.contains(&("filter[roots]".to_string(), "true".to_string())));
        assert!(query.contains(&("include".to_string(), "childrenRecursive".to_string())));
    }

    #[test]
    fn blank_name_fails_validation() {
        let input = CategoryInput {
            name: String::new(),
            parent_id: None,
        };
        assert!(input.validate().is_err());
    }
}
