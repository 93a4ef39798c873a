//! Сценарии экранов поверх сервисов: отправка формы, загрузка карточки,
//! действие над записью списка.
//!
//! Сервисы возвращают ошибки как есть, здесь решается, как их показать.

use std::collections::BTreeMap;
use std::future::Future;

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::guard::Route;
use crate::notify::{NavigationMode, Navigator, Notice, Notifier};
use crate::query::ListQuery;

/// Уведомление при ошибках валидации формы.
pub const VALIDATION_FAILED_MESSAGE: &str = "Validation failed";
/// Уведомление при прочих ошибках сохранения.
pub const SAVE_FAILED_MESSAGE: &str = "Backend communication error";
/// Уведомление, если запись не найдена.
pub const NOT_FOUND_MESSAGE: &str = "Record not found";
/// Уведомление при прочих ошибках загрузки.
pub const LOAD_FAILED_MESSAGE: &str = "Data retrieval failed";

/// Итог отправки формы.
#[derive(Debug, Clone, PartialEq)]
pub enum FormOutcome<T> {
    /// Сохранено.
    Saved(T),
    /// Сервер отклонил данные: первое сообщение для каждого поля.
    Invalid(BTreeMap<String, String>),
    /// Прочая ошибка; подробности уже показаны уведомлением.
    Failed,
}

/// Уведомление об ошибке для пользователя.
///
/// 401 уже обработан HTTP-клиентом (уведомление и переход на вход), второе
/// уведомление не нужно.
pub(crate) fn failure_notice(err: &ClientError, fallback: &str) -> Option<Notice> {
    match err {
        ClientError::Unauthorized => None,
        ClientError::InvalidRequest(message) => Some(Notice::error(message.clone())),
        other => Some(Notice::error(other.server_message().unwrap_or(fallback))),
    }
}

/// Отправляет форму. 422 превращается в ошибки по полям, остальные ошибки в
/// общее уведомление.
pub async fn submit_form<T, F>(notifier: &dyn Notifier, success: &str, submit: F) -> FormOutcome<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match submit.await {
        Ok(saved) => {
            notifier.notify(Notice::success(success));
            FormOutcome::Saved(saved)
        }
        Err(err @ ClientError::Validation { .. }) => {
            debug!(error = %err, "form rejected by server");
            notifier.notify(Notice::error(VALIDATION_FAILED_MESSAGE));
            FormOutcome::Invalid(err.first_field_errors())
        }
        Err(err) => {
            warn!(error = %err, "form submission failed");
            let notice = match &err {
                ClientError::InvalidRequest(_) | ClientError::Unauthorized => {
                    failure_notice(&err, SAVE_FAILED_MESSAGE)
                }
                _ => Some(Notice::error(SAVE_FAILED_MESSAGE)),
            };
            if let Some(notice) = notice {
                notifier.notify(notice);
            }
            FormOutcome::Failed
        }
    }
}

/// Загружает запись для карточки или формы редактирования.
///
/// 404 показывает уведомление и возвращает на список, к которому относится
/// `route`. Прочие ошибки только показываются.
pub async fn load_detail<T, F>(
    route: &Route,
    notifier: &dyn Notifier,
    navigator: &dyn Navigator,
    load: F,
) -> Option<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match load.await {
        Ok(entity) => Some(entity),
        Err(err @ ClientError::NotFound { .. }) => {
            let parent = route.parent_list();
            debug!(%route, %parent, "entity not found, returning to list");
            notifier.notify(Notice::error(
                err.server_message().unwrap_or(NOT_FOUND_MESSAGE),
            ));
            navigator.navigate(&parent.to_path(), NavigationMode::Push);
            None
        }
        Err(err) => {
            warn!(%route, error = %err, "failed to load entity");
            if let Some(notice) = failure_notice(&err, LOAD_FAILED_MESSAGE) {
                notifier.notify(notice);
            }
            None
        }
    }
}

/// Тексты уведомлений для действия над записью.
#[derive(Debug, Clone, Copy)]
pub struct ActionMessages<'a> {
    /// При успехе.
    pub success: &'a str,
    /// При ошибке, если сервер не прислал своего сообщения.
    pub failure: &'a str,
}

/// Выполняет действие над записью списка (одобрение, блокировка) и
/// перезагружает список при успехе.
pub async fn run_action<T, F>(
    query: &ListQuery<T>,
    notifier: &dyn Notifier,
    messages: ActionMessages<'_>,
    action: F,
) -> ClientResult<Option<String>>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = ClientResult<Option<String>>>,
{
    match action.await {
        Ok(message) => {
            notifier.notify(Notice::success(messages.success));
            query.invalidate();
            query.refetch().await;
            Ok(message)
        }
        Err(err) => {
            warn!(error = %err, "list action failed");
            if let Some(notice) = failure_notice(&err, messages.failure) {
                notifier.notify(notice);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldErrors;
    use crate::models::{PageMeta, Paginated};
    use crate::notify::MemoryHistory;
    use crate::params::ListParams;
    use crate::query::ListFetcher;
    use crate::testing::RecordingNotifier;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn validation_error() -> ClientError {
        let mut errors = FieldErrors::new();
        errors.insert(
            "isbn".to_string(),
            vec![
                "The isbn has already been taken.".to_string(),
                "The isbn is invalid.".to_string(),
            ],
        );
        ClientError::Validation {
            message: Some("The given data was invalid.".to_string()),
            errors,
        }
    }

    #[tokio::test]
    async fn submit_form_reports_saved_entity() {
        let notifier = RecordingNotifier::default();
        let outcome = submit_form(&notifier, "Saved", async { Ok::<_, ClientError>(7) }).await;

        assert_eq!(outcome, FormOutcome::Saved(7));
        assert_eq!(notifier.notices(), vec![Notice::success("Saved")]);
    }

    #[tokio::test]
    async fn submit_form_surfaces_first_message_per_field() {
        let notifier = RecordingNotifier::default();
        let outcome: FormOutcome<()> =
            submit_form(&notifier, "Saved", async { Err(validation_error()) }).await;

        match outcome {
            FormOutcome::Invalid(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields["isbn"], "The isbn has already been taken.");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            notifier.notices(),
            vec![Notice::error(VALIDATION_FAILED_MESSAGE)]
        );
    }

    #[tokio::test]
    async fn submit_form_maps_other_errors_to_generic_failure() {
        let notifier = RecordingNotifier::default();
        let outcome: FormOutcome<()> = submit_form(&notifier, "Saved", async {
            Err(ClientError::Status {
                status: 500,
                message: Some("SQLSTATE[23000]".to_string()),
                body: String::new(),
            })
        })
        .await;

        assert_eq!(outcome, FormOutcome::Failed);
        assert_eq!(notifier.notices(), vec![Notice::error(SAVE_FAILED_MESSAGE)]);
    }

    #[tokio::test]
    async fn submit_form_does_not_double_notify_on_401() {
        let notifier = RecordingNotifier::default();
        let outcome: FormOutcome<()> =
            submit_form(&notifier, "Saved", async { Err(ClientError::Unauthorized) }).await;

        assert_eq!(outcome, FormOutcome::Failed);
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn load_detail_returns_to_parent_list_on_404() {
        let notifier = RecordingNotifier::default();
        let history = MemoryHistory::new("/book/missing");
        let route = Route::from_path("/book/missing");

        let loaded: Option<()> = load_detail(&route, &notifier, &history, async {
            Err(ClientError::NotFound { message: None })
        })
        .await;

        assert!(loaded.is_none());
        assert_eq!(history.current_path(), "/books");
        assert_eq!(notifier.notices(), vec![Notice::error(NOT_FOUND_MESSAGE)]);
    }

    #[tokio::test]
    async fn load_detail_stays_on_page_for_other_errors() {
        let notifier = RecordingNotifier::default();
        let history = MemoryHistory::new("/author/edit/3");
        let route = Route::from_path("/author/edit/3");

        let loaded: Option<()> =
            load_detail(&route, &notifier, &history, async { Err(ClientError::Timeout) }).await;

        assert!(loaded.is_none());
        assert_eq!(history.current_path(), "/author/edit/3");
        assert_eq!(notifier.notices(), vec![Notice::error(LOAD_FAILED_MESSAGE)]);
    }

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ListFetcher<i64> for CountingFetcher {
        async fn fetch(&self, _params: &ListParams) -> ClientResult<Paginated<i64>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as i64;
            Ok(Paginated {
                data: vec![call],
                meta: PageMeta::default(),
            })
        }
    }

    const MESSAGES: ActionMessages<'static> = ActionMessages {
        success: "Account approved",
        failure: "Approval failed",
    };

    #[tokio::test]
    async fn run_action_refetches_after_success() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let query: ListQuery<i64> = ListQuery::new(fetcher.clone(), ListParams::new(15));
        query.fetch().await;
        let notifier = RecordingNotifier::default();

        let result = run_action(&query, &notifier, MESSAGES, async { Ok(None) }).await;

        assert!(result.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(query.items(), vec![1]);
        assert_eq!(notifier.notices(), vec![Notice::success("Account approved")]);
    }

    #[tokio::test]
    async fn run_action_prefers_server_message_on_failure() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let query: ListQuery<i64> = ListQuery::new(fetcher.clone(), ListParams::new(15));
        let notifier = RecordingNotifier::default();

        let result = run_action(&query, &notifier, MESSAGES, async {
            Err(ClientError::Status {
                status: 403,
                message: Some("Author is already active".to_string()),
                body: String::new(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            notifier.notices(),
            vec![Notice::error("Author is already active")]
        );

        let _ = run_action(&query, &notifier, MESSAGES, async {
            Err(ClientError::Status {
                status: 500,
                message: None,
                body: String::new(),
            })
        })
        .await;
        assert_eq!(notifier.notices()[1], Notice::error("Approval failed"));
    }
}
