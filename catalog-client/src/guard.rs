//! Маршруты панели и проверка доступа к ним.
//!
//! Чистая логика: guard не выполняет переходы сам, а возвращает решение,
//! которое применяет вызывающая сторона.

use std::fmt;

use crate::models::EntityKey;
use crate::notify::{NavigationMode, Navigator};
use crate::session::SessionState;

/// Экран панели.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Вход.
    Login,
    /// Главная панель.
    Dashboard,
    /// Список книг.
    Books,
    /// Создание книги.
    BookNew,
    /// Редактирование книги.
    BookEdit(String),
    /// Карточка книги.
    BookDetail(String),
    /// Список авторов.
    Authors,
    /// Создание автора.
    AuthorNew,
    /// Редактирование автора.
    AuthorEdit(i64),
    /// Категории.
    Categories,
    /// Список товаров.
    Products,
    /// Создание товара.
    ProductNew,
    /// Редактирование товара.
    ProductEdit(i64),
    /// Карточка товара.
    ProductDetail(i64),
    /// Неизвестный путь.
    NotFound,
}

impl Route {
    /// Разбирает путь. Query-строка и завершающий `/` игнорируются.
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Self::Dashboard,
            ["login"] => Self::Login,
            ["books"] => Self::Books,
            ["book", "add"] => Self::BookNew,
            ["book", "edit", slug] => Self::BookEdit((*slug).to_string()),
            ["book", slug] => Self::BookDetail((*slug).to_string()),
            ["authors"] => Self::Authors,
            ["author", "add"] => Self::AuthorNew,
            ["author", "edit", id] => id.parse().map_or(Self::NotFound, Self::AuthorEdit),
            ["categories"] => Self::Categories,
            ["products"] => Self::Products,
            ["product", "add"] => Self::ProductNew,
            ["product", "edit", id] => id.parse().map_or(Self::NotFound, Self::ProductEdit),
            ["product", id] => id.parse().map_or(Self::NotFound, Self::ProductDetail),
            _ => Self::NotFound,
        }
    }

    /// Путь экрана.
    pub fn to_path(&self) -> String {
        match self {
            Self::Login => "/login".to_string(),
            Self::Dashboard => "/".to_string(),
            Self::Books => "/books".to_string(),
            Self::BookNew => "/book/add".to_string(),
            Self::BookEdit(slug) => format!("/book/edit/{slug}"),
            Self::BookDetail(slug) => format!("/book/{slug}"),
            Self::Authors => "/authors".to_string(),
            Self::AuthorNew => "/author/add".to_string(),
            Self::AuthorEdit(id) => format!("/author/edit/{id}"),
            Self::Categories => "/categories".to_string(),
            Self::Products => "/products".to_string(),
            Self::ProductNew => "/product/add".to_string(),
            Self::ProductEdit(id) => format!("/product/edit/{id}"),
            Self::ProductDetail(id) => format!("/product/{id}"),
            Self::NotFound => "/404".to_string(),
        }
    }

    /// Требует ли экран авторизации.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Self::Login | Self::NotFound)
    }

    /// Список, к которому относится экран (куда возвращаться при 404).
    pub fn parent_list(&self) -> Route {
        match self {
            Self::BookNew | Self::BookEdit(_) | Self::BookDetail(_) => Self::Books,
            Self::AuthorNew | Self::AuthorEdit(_) => Self::Authors,
            Self::ProductNew | Self::ProductEdit(_) | Self::ProductDetail(_) => Self::Products,
            Self::Books | Self::Authors | Self::Categories | Self::Products => self.clone(),
            Self::Login | Self::Dashboard | Self::NotFound => Self::Dashboard,
        }
    }

    /// Ключ сущности для экранов карточек и редактирования.
    pub fn entity_key(&self) -> Option<EntityKey> {
        match self {
            Self::BookEdit(slug) | Self::BookDetail(slug) => Some(EntityKey::Slug(slug.clone())),
            Self::AuthorEdit(id) | Self::ProductEdit(id) | Self::ProductDetail(id) => {
                Some(EntityKey::Id(*id))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

/// Готова ли сессия к проверке.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Сессия ещё восстанавливается.
    Checking,
    /// Состояние сессии известно.
    Resolved,
}

/// Решение guard для запрошенного пути.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Ждать восстановления сессии.
    Pending,
    /// Перейти на другой экран.
    Redirect(Route, NavigationMode),
    /// Показать экран.
    Render(Route),
}

/// Проверка доступа к экранам.
#[derive(Debug, Clone, Copy)]
pub struct RouteGuard {
    state: GuardState,
}

impl RouteGuard {
    /// Guard с известным состоянием сессии. Восстановление сессии синхронное,
    /// поэтому обычно guard сразу `Resolved`.
    pub fn resolved() -> Self {
        Self {
            state: GuardState::Resolved,
        }
    }

    /// Guard, ожидающий восстановления сессии.
    pub fn checking() -> Self {
        Self {
            state: GuardState::Checking,
        }
    }

    /// Отмечает сессию восстановленной.
    pub fn resolve(&mut self) {
        self.state = GuardState::Resolved;
    }

    /// Текущее состояние.
    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Решение для пути при заданном состоянии авторизации.
    pub fn decide(&self, path: &str, authenticated: bool) -> GuardDecision {
        if self.state == GuardState::Checking {
            return GuardDecision::Pending;
        }

        let route = Route::from_path(path);
        match route {
            Route::NotFound => GuardDecision::Redirect(Route::Dashboard, NavigationMode::Replace),
            Route::Login if authenticated => {
                GuardDecision::Redirect(Route::Dashboard, NavigationMode::Replace)
            }
            route if route.requires_auth() && !authenticated => {
                GuardDecision::Redirect(Route::Login, NavigationMode::Replace)
            }
            route => GuardDecision::Render(route),
        }
    }

    /// Проверяет текущий путь навигатора и при необходимости выполняет
    /// переход. Возвращает экран, который можно показывать.
    pub fn enforce(&self, session: &SessionState, navigator: &dyn Navigator) -> Option<Route> {
        let mut path = navigator.current_path();
        // NotFound -> Dashboard -> Login: не больше двух переходов.
        for _ in 0..3 {
            match self.decide(&path, session.is_authenticated()) {
                GuardDecision::Pending => return None,
                GuardDecision::Render(route) => return Some(route),
                GuardDecision::Redirect(target, mode) => {
                    path = target.to_path();
                    navigator.navigate(&path, mode);
                }
            }
        }
        None
    }
}
