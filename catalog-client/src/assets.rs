//! Адреса обложек и фотографий.
//!
//! Порядок выбора: встроенные данные, затем URL файла, относительный путь
//! дополняется origin сервера, иначе генерируется заглушка с инициалами.

use reqwest::Url;
use tracing::warn;

use crate::models::{Author, Book, Media};

/// Сервис заглушек с инициалами.
pub const PLACEHOLDER_ENDPOINT: &str = "https://ui-avatars.com/api/";

/// Исправляет удвоенный адрес вида `http://hosthttp://host/path` из ответа
/// backend: берётся последнее вхождение схемы.
///
/// Это правило для внешних данных, а не часть контракта: backend должен
/// отдавать корректный URL. Каждое срабатывание пишется в лог.
pub fn sanitize_asset_url(raw: &str) -> &str {
    let last_scheme = ["http://", "https://"]
        .into_iter()
        .filter_map(|scheme| raw.rfind(scheme))
        .max();

    match last_scheme {
        Some(0) | None => raw,
        Some(start) => {
            warn!(url = raw, "collapsing doubled asset url from backend");
            &raw[start..]
        }
    }
}

/// Адрес заглушки с подписью `label`.
pub fn placeholder_url(label: &str) -> String {
    let params = [
        ("name", label),
        ("background", "f1f5f9"),
        ("color", "64748b"),
        ("size", "512"),
    ];
    Url::parse_with_params(PLACEHOLDER_ENDPOINT, &params)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| PLACEHOLDER_ENDPOINT.to_string())
}

/// Адрес файла для показа.
pub fn resolve_media_url(media: Option<&Media>, label: &str, asset_origin: &str) -> String {
    let Some(media) = media else {
        return placeholder_url(label);
    };

    if let Some(data) = non_blank(media.data.as_deref()) {
        return data.to_string();
    }

    let raw = non_blank(media.url.as_deref()).or_else(|| non_blank(media.file_path.as_deref()));
    match raw {
        Some(raw) if raw.contains("http://") || raw.contains("https://") => {
            sanitize_asset_url(raw).to_string()
        }
        Some(raw) if raw.starts_with('/') => {
            format!("{}{raw}", asset_origin.trim_end_matches('/'))
        }
        _ => placeholder_url(label),
    }
}

/// Обложка книги.
pub fn book_cover_url(book: &Book, asset_origin: &str) -> String {
    resolve_media_url(book.cover.as_ref(), &book.title, asset_origin)
}

/// Фото автора.
pub fn author_photo_url(author: &Author, asset_origin: &str) -> String {
    let name = author.full_name();
    let label = if name.is_empty() { &author.username } else { &name };
    resolve_media_url(author.photo.as_ref(), label, asset_origin)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
