//! Клиентская библиотека административной панели каталога (книги, авторы,
//! категории, товары) поверх REST API.
//!
//! В основе лежит слой синхронизации данных:
//! - HTTP-клиент с bearer-токеном и однократным выходом из сессии при 401;
//! - состояние списков, где применяется только ответ на последний запрос;
//! - оптимистичное удаление с откатом.
//!
//! Точка входа [`CatalogClient`] восстанавливает сессию из хранилища и
//! связывает HTTP-клиент, сервисы и проверку маршрутов.
#![warn(missing_docs)]

pub mod analytics;
pub mod assets;
mod error;
pub mod flows;
pub mod guard;
mod http_client;
mod models;
pub mod mutation;
pub mod notify;
pub mod params;
pub mod query;
pub mod services;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use error::{ClientError, ClientResult, FieldErrors};
pub use http_client::{
    ClientSettings, HttpClient, RedirectGuard, RequestBody, RequestOptions,
    SESSION_EXPIRED_MESSAGE,
};
pub use models::{
    ApiResponse, AuthData, Author, AuthorDetails, AuthorForm, Book, BookForm, BookStatus,
    Category, CategoryInput, EntityKey, Identified, LoginCredentials, Media, PageMeta, Paginated,
    Price, Product, ProductInput, ProductPage, Upload, User,
};

use guard::{Route, RouteGuard};
use notify::{Navigator, Notifier};
use params::ListParams;
use query::{ListFetcher, ListQuery};
use services::{AuthService, AuthorService, BookService, CategoryService, ProductService};
use session::SessionState;
use storage::SessionStore;

#[derive(Debug, Clone)]
/// Клиент панели: сессия, HTTP-клиент и сервисы ресурсов.
pub struct CatalogClient {
    http: HttpClient,
    auth: AuthService,
    books: BookService,
    categories: CategoryService,
    authors: AuthorService,
    products: ProductService,
}

impl CatalogClient {
    /// Восстанавливает сессию из `store` и создаёт клиент.
    ///
    /// Восстановление синхронное и не завершается ошибкой: некорректные
    /// сохранённые данные удаляются, сессия начинается неавторизованной.
    pub fn new(
        settings: ClientSettings,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> ClientResult<Self> {
        let session = Arc::new(SessionState::bootstrap(store));
        let http = HttpClient::new(settings, session, notifier, navigator)?;

        Ok(Self {
            auth: AuthService::new(http.clone()),
            books: BookService::new(http.clone()),
            categories: CategoryService::new(http.clone()),
            authors: AuthorService::new(http.clone()),
            products: ProductService::new(http.clone()),
            http,
        })
    }

    /// Общий HTTP-клиент.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Состояние сессии.
    pub fn session(&self) -> &Arc<SessionState> {
        self.http.session()
    }

    /// Получатель уведомлений.
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        self.http.notifier()
    }

    /// Навигация.
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        self.http.navigator()
    }

    /// Вход и выход.
    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// Книги.
    pub fn books(&self) -> &BookService {
        &self.books
    }

    /// Категории.
    pub fn categories(&self) -> &CategoryService {
        &self.categories
    }

    /// Авторы.
    pub fn authors(&self) -> &AuthorService {
        &self.authors
    }

    /// Товары.
    pub fn products(&self) -> &ProductService {
        &self.products
    }

    /// Выполняет вход и сохраняет сессию.
    pub async fn login(&self, credentials: &LoginCredentials) -> ClientResult<User> {
        let data = self.auth.login(credentials).await?;
        let user = data.user.clone();
        self.session().login(data)?;
        Ok(user)
    }

    /// Завершает сессию на сервере и локально.
    ///
    /// Локальная сессия очищается в любом случае; 401 от сервера означает,
    /// что сессия и так недействительна.
    pub async fn logout(&self) -> ClientResult<()> {
        let result = self.auth.logout().await;
        self.session().logout();
        match result {
            Ok(_) | Err(ClientError::Unauthorized) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Проверяет текущий экран навигатора и при необходимости перенаправляет.
    /// Возвращает экран, который можно показывать.
    pub fn enforce_route(&self) -> Option<Route> {
        RouteGuard::resolved().enforce(self.session(), self.navigator().as_ref())
    }

    /// Состояние списка с паузой тишины из настроек клиента.
    pub fn list_query<T, F>(&self, fetcher: F, params: ListParams) -> ListQuery<T>
    where
        T: Clone + Send + Sync + 'static,
        F: ListFetcher<T> + 'static,
    {
        ListQuery::new(Arc::new(fetcher), params).with_debounce(self.http.settings().debounce)
    }

    /// Список книг с параметрами по умолчанию.
    pub fn books_query(&self) -> ListQuery<Book> {
        self.list_query(self.books.clone(), BookService::default_params())
    }

    /// Список категорий с параметрами по умолчанию.
    pub fn categories_query(&self) -> ListQuery<Category> {
        self.list_query(self.categories.clone(), CategoryService::default_params())
    }

    /// Список авторов.
    pub fn authors_query(&self) -> ListQuery<Author> {
        self.list_query(self.authors.clone(), ListParams::new(15))
    }

    /// Список товаров.
    pub fn products_query(&self) -> ListQuery<Product> {
        self.list_query(self.products.clone(), ProductService::default_params())
    }
}
