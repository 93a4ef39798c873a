use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::error::FieldErrors;

/// Стабильный идентификатор сущности: для маршрутизации и сопоставления кэша.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// Числовой идентификатор.
    Id(i64),
    /// Уникальный slug или username.
    Slug(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Slug(slug) => f.write_str(slug),
        }
    }
}

/// `null` в ответе читается как значение по умолчанию, как и отсутствующий ключ.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Сущность с устойчивым ключом.
pub trait Identified {
    /// Ключ сущности.
    fn key(&self) -> EntityKey;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Пользователь панели (администратор, автор, владелец книги).
pub struct User {
    /// Идентификатор пользователя.
    pub id: i64,
    /// Отображаемое имя.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Имя.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Фамилия.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Логин.
    pub username: String,
    /// Тип учётной записи (`admin`, `author`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl User {
    /// Имя для приветствия: `name`, либо `username`, если имя пустое.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.username
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Результат успешного входа.
pub struct AuthData {
    /// Bearer-токен.
    pub token: String,
    /// Данные пользователя.
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Загруженный файл (обложка, фото автора).
pub struct Media {
    /// Идентификатор файла.
    pub id: i64,
    /// Путь к файлу на сервере.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Исходное имя файла.
    #[serde(default)]
    pub file_name: Option<String>,
    /// MIME-тип.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Размер в байтах.
    #[serde(default)]
    pub size: Option<u64>,
    /// Коллекция медиа.
    #[serde(default)]
    pub collection: Option<String>,
    /// Публичный URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Встроенные данные (data URI / base64).
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Категория каталога.
pub struct Category {
    /// Идентификатор категории.
    pub id: i64,
    /// Название.
    pub name: String,
    /// Уникальный slug.
    pub slug: String,
    /// Порядок сортировки.
    #[serde(default)]
    pub order_column: Option<i64>,
    /// Родительская категория.
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Дочерние категории (если запрошены через `include`).
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<Category>,
    /// Корневая ли категория.
    #[serde(default)]
    pub is_root: bool,
}

impl Identified for Category {
    fn key(&self) -> EntityKey {
        EntityKey::Slug(self.slug.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Дополнительные сведения об авторе.
pub struct AuthorDetails {
    /// Биография.
    #[serde(default)]
    pub bio: Option<String>,
    /// Страна.
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Автор.
pub struct Author {
    /// Идентификатор автора.
    pub id: i64,
    /// Отображаемое имя.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Логин.
    pub username: String,
    /// Имя.
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_name: String,
    /// Фамилия.
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_name: String,
    /// Фото.
    #[serde(default)]
    pub photo: Option<Media>,
    /// Статус учётной записи (`pending`, `active`, `blocked`).
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    /// Биография и страна.
    #[serde(default)]
    pub author_details: Option<AuthorDetails>,
}

impl Author {
    /// Полное имя автора.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl Identified for Author {
    fn key(&self) -> EntityKey {
        EntityKey::Id(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Цена книги.
pub struct Price {
    /// Сумма.
    pub amount: f64,
    /// Отформатированная строка.
    #[serde(default, deserialize_with = "null_as_default")]
    pub formatted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Статус книги.
pub struct BookStatus {
    /// Подпись для отображения.
    pub label: String,
    /// Машинное значение.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Книга.
pub struct Book {
    /// Идентификатор книги.
    pub id: i64,
    /// Название.
    pub title: String,
    /// Уникальный slug.
    pub slug: String,
    /// ISBN.
    #[serde(default, deserialize_with = "null_as_default")]
    pub isbn: String,
    /// Цена.
    #[serde(default)]
    pub price: Option<Price>,
    /// Год издания.
    #[serde(default)]
    pub publish_year: Option<i32>,
    /// Остаток на складе.
    #[serde(default)]
    pub stock: Option<i64>,
    /// Уровень остатка (старое имя поля `stock`).
    #[serde(default)]
    pub stock_level: Option<i64>,
    /// Идентификатор категории.
    #[serde(default)]
    pub category_id: Option<i64>,
    /// Категория.
    #[serde(default)]
    pub category: Option<Category>,
    /// Идентификатор владельца.
    #[serde(default)]
    pub owner_id: Option<i64>,
    /// Владелец.
    #[serde(default)]
    pub owner: Option<User>,
    /// Соавторы.
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<User>,
    /// Обложка.
    #[serde(default)]
    pub cover: Option<Media>,
    /// Статус.
    #[serde(default)]
    pub status: Option<BookStatus>,
    /// Дата создания.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Book {
    /// Остаток: `stock`, затем `stock_level`, иначе 0.
    pub fn effective_stock(&self) -> i64 {
        self.stock.or(self.stock_level).unwrap_or(0)
    }

    /// Соавторы без владельца книги.
    pub fn co_author_ids(&self) -> Vec<i64> {
        let owner_id = self.owner.as_ref().map(|owner| owner.id).or(self.owner_id);
        self.authors
            .iter()
            .map(|author| author.id)
            .filter(|id| Some(*id) != owner_id)
            .collect()
    }
}

impl Identified for Book {
    fn key(&self) -> EntityKey {
        EntityKey::Slug(self.slug.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Товар (альтернативный вариант каталога).
pub struct Product {
    /// Идентификатор товара.
    pub id: i64,
    /// Название.
    pub title: String,
    /// Описание.
    #[serde(default)]
    pub description: Option<String>,
    /// Категория.
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    /// Цена.
    #[serde(default)]
    pub price: f64,
    /// Скидка в процентах.
    #[serde(rename = "discountPercentage", default)]
    pub discount_percentage: Option<f64>,
    /// Рейтинг.
    #[serde(default)]
    pub rating: Option<f64>,
    /// Остаток.
    #[serde(default)]
    pub stock: Option<i64>,
    /// Бренд.
    #[serde(default)]
    pub brand: Option<String>,
    /// Превью.
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl Identified for Product {
    fn key(&self) -> EntityKey {
        EntityKey::Id(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Метаданные пагинации.
pub struct PageMeta {
    /// Текущая страница (с 1).
    pub current_page: u32,
    /// Последняя страница.
    pub last_page: u32,
    /// Размер страницы.
    #[serde(default)]
    pub per_page: u32,
    /// Общее количество записей.
    #[serde(default)]
    pub total: u64,
}

impl Default for PageMeta {
    fn default() -> Self {
        Self {
            current_page: 1,
            last_page: 1,
            per_page: 0,
            total: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Страница списка.
pub struct Paginated<T> {
    /// Записи текущей страницы.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Пагинация.
    #[serde(default)]
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Deserialize)]
/// Конверт ответа backend: `{ data, success, message, errors }`.
pub struct ApiResponse<T> {
    /// Полезная нагрузка.
    pub data: T,
    /// Признак успеха.
    #[serde(default)]
    pub success: Option<bool>,
    /// Сообщение сервера.
    #[serde(default)]
    pub message: Option<String>,
    /// Ошибки по полям.
    #[serde(default)]
    pub errors: Option<FieldErrors>,
}

#[derive(Debug, Clone, Deserialize)]
/// Ответ списка товаров в формате `limit/skip`.
pub struct ProductPage {
    /// Товары.
    #[serde(default, deserialize_with = "null_as_default")]
    pub products: Vec<Product>,
    /// Всего товаров.
    #[serde(default)]
    pub total: u64,
    /// Смещение.
    #[serde(default)]
    pub skip: u32,
    /// Размер выборки.
    #[serde(default)]
    pub limit: u32,
}

impl From<ProductPage> for Paginated<Product> {
    /// `page = skip / limit + 1`, `last_page = ceil(total / limit)`.
    fn from(value: ProductPage) -> Self {
        let per_page = value.limit.max(1);
        let current_page = value.skip / per_page + 1;
        let last_page = u32::try_from(value.total.div_ceil(u64::from(per_page)))
            .unwrap_or(u32::MAX)
            .max(1);

        Self {
            data: value.products,
            meta: PageMeta {
                current_page: current_page.min(last_page),
                last_page,
                per_page: value.limit,
                total: value.total,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Validate)]
/// Учётные данные для входа.
pub struct LoginCredentials {
    /// Логин.
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    /// Пароль.
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
/// Данные для создания или изменения категории.
pub struct CategoryInput {
    /// Название.
    #[validate(length(min = 1, max = 255, message = "Category name is required."))]
    pub name: String,
    /// Родительская категория.
    pub parent_id: Option<i64>,
}

/// Файл для multipart-загрузки.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    /// Имя файла.
    pub file_name: String,
    /// MIME-тип.
    pub mime_type: String,
    /// Содержимое.
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Создаёт файл, определяя MIME-тип по расширению.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = guess_mime(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }
}

fn guess_mime(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Validate)]
/// Форма книги (multipart).
pub struct BookForm {
    /// Название.
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    /// Категория.
    pub category_id: Option<i64>,
    /// ISBN.
    #[validate(length(min = 1, max = 32))]
    pub isbn: String,
    /// Цена.
    #[validate(range(min = 0.0))]
    pub price: f64,
    /// Год издания.
    #[validate(range(min = 1000, max = 2100))]
    pub publish_year: i32,
    /// Остаток.
    #[validate(range(min = 0))]
    pub stock: i64,
    /// Владелец.
    pub owner_id: Option<i64>,
    /// Соавторы; владелец отфильтровывается при отправке.
    pub author_ids: Vec<i64>,
    /// Новая обложка.
    pub cover: Option<Upload>,
}

impl BookForm {
    /// Заполняет форму по существующей книге (для редактирования).
    pub fn from_book(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            category_id: book
                .category
                .as_ref()
                .map(|category| category.id)
                .or(book.category_id),
            isbn: book.isbn.clone(),
            price: book.price.as_ref().map(|price| price.amount).unwrap_or(0.0),
            publish_year: book.publish_year.unwrap_or(2000),
            stock: book.effective_stock(),
            owner_id: book.owner.as_ref().map(|owner| owner.id).or(book.owner_id),
            author_ids: book.co_author_ids(),
            cover: None,
        }
    }
}

#[derive(Debug, Clone, Validate)]
/// Форма автора (multipart).
pub struct AuthorForm {
    /// Логин.
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    /// Имя.
    #[validate(length(min = 1, max = 128))]
    pub first_name: String,
    /// Фамилия.
    #[validate(length(min = 1, max = 128))]
    pub last_name: String,
    /// Пароль, отправляется только при создании.
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    /// Биография.
    pub bio: String,
    /// Страна.
    pub country: String,
    /// Новое фото.
    pub photo: Option<Upload>,
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
/// Данные товара для создания или изменения.
pub struct ProductInput {
    /// Название.
    #[validate(length(min = 1, max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Описание.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Категория.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Цена.
    #[validate(range(min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Остаток.
    #[validate(range(min = 0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    /// Бренд.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}
