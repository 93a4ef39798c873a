//! Оптимистичное удаление из списка с откатом при ошибке.

use std::future::Future;

use tracing::{debug, warn};

use crate::error::ClientResult;
use crate::flows::failure_notice;
use crate::models::{EntityKey, Identified};
use crate::notify::{Notice, Notifier};
use crate::query::ListQuery;

/// Текст уведомления об успешном удалении, если сервер не прислал своего.
pub const DELETED_MESSAGE: &str = "Deleted successfully";
/// Текст уведомления об ошибке удаления, если сервер не прислал своего.
pub const DELETE_FAILED_MESSAGE: &str = "Delete failed";

/// Удаляет сущность из списка сразу, не дожидаясь сервера.
///
/// 1. Снимает снимок текущей страницы.
/// 2. Убирает запись `key` локально.
/// 3. Ждёт `delete`.
/// 4. При успехе показывает подтверждение и сбрасывает кэш остальных страниц.
/// 5. При ошибке возвращает снимок без изменений (тот же порядок, те же
///    записи) и показывает ошибку. Откат не выполняется, если за время
///    ожидания список уже обновился с сервера.
///
/// Ошибка удаления возвращается вызывающему.
pub async fn optimistic_delete<T, F>(
    query: &ListQuery<T>,
    key: &EntityKey,
    notifier: &dyn Notifier,
    delete: F,
) -> ClientResult<Option<String>>
where
    T: Identified + Clone + Send + Sync + 'static,
    F: Future<Output = ClientResult<Option<String>>>,
{
    let snapshot = query.snapshot();
    let version = query.apply_local(|page| {
        let before = page.data.len();
        page.data.retain(|item| &item.key() != key);
        let removed = (before - page.data.len()) as u64;
        page.meta.total = page.meta.total.saturating_sub(removed);
    });
    debug!(%key, "entity removed locally before delete");

    match delete.await {
        Ok(message) => {
            query.invalidate();
            notifier.notify(Notice::success(
                message.clone().unwrap_or_else(|| DELETED_MESSAGE.to_string()),
            ));
            Ok(message)
        }
        Err(err) => {
            warn!(%key, error = %err, "delete failed, rolling back");
            if let Some(version) = version {
                query.restore(snapshot, version);
            }
            if let Some(notice) = failure_notice(&err, DELETE_FAILED_MESSAGE) {
                notifier.notify(notice);
            }
            Err(err)
        }
    }
}
