//! Сервисы ресурсов REST API: один метод на один запрос.
//!
//! Сервисы проверяют ввод до отправки, ничего не кэшируют и не повторяют,
//! ошибки HTTP возвращают без изменений.

mod auth;
mod authors;
mod books;
mod categories;
mod products;

pub use auth::AuthService;
pub use authors::{AuthorService, SEARCH_FILTER};
pub use books::BookService;
pub use categories::CategoryService;
pub use products::{ProductService, QUERY_FILTER};

use reqwest::multipart::{Form, Part};

use crate::error::{ClientError, ClientResult};
use crate::models::Upload;

/// Поле формы, которым POST-запрос помечается как PUT.
pub(crate) const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Проверяет, что slug или иной ключ пути не пуст.
pub(crate) fn path_key<'a>(value: &'a str, what: &str) -> ClientResult<&'a str> {
    let value = value.trim();
    if value.is_empty() || value.contains('/') {
        return Err(ClientError::InvalidRequest(format!("invalid {what}: {value:?}")));
    }
    Ok(value)
}

/// Добавляет файл в multipart-форму.
pub(crate) fn attach_file(form: Form, field: &'static str, upload: Upload) -> ClientResult<Form> {
    let part = Part::bytes(upload.bytes)
        .file_name(upload.file_name)
        .mime_str(&upload.mime_type)
        .map_err(|err| ClientError::InvalidRequest(format!("invalid mime type: {err}")))?;
    Ok(form.part(field, part))
}
