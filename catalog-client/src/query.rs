//! Состояние списка: параметры, загрузка, кэш и правило «побеждает
//! последний запрос».
//!
//! Каждая загрузка получает билет из монотонной последовательности. Ответ
//! применяется только если его билет остаётся последним в момент применения,
//! поэтому поздние ответы на устаревшие параметры отбрасываются независимо от
//! порядка прихода.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::models::{PageMeta, Paginated};
use crate::params::{ListParams, ParamsUpdate};

/// Источник страниц списка.
#[async_trait]
pub trait ListFetcher<T>: Send + Sync {
    /// Загружает страницу по параметрам.
    async fn fetch(&self, params: &ListParams) -> ClientResult<Paginated<T>>;
}

/// Состояние загрузки списка.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Загрузка ещё не запускалась.
    Idle,
    /// Идёт загрузка.
    Loading,
    /// Последняя загрузка успешна.
    Success,
    /// Последняя загрузка завершилась ошибкой.
    Error,
}

/// Результат одной загрузки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Ответ применён.
    Committed,
    /// Ошибка применена к состоянию.
    Failed,
    /// Ответ или отложенное изменение вытеснены более новым запросом.
    Superseded,
    /// Параметры не изменились, запрос не отправлялся.
    Unchanged,
}

/// Снимок данных списка для отката локальных изменений.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    page: Option<Paginated<T>>,
    version: u64,
}

impl<T> Snapshot<T> {
    /// Данные на момент снимка.
    pub fn page(&self) -> Option<&Paginated<T>> {
        self.page.as_ref()
    }
}

struct QueryState<T> {
    params: ListParams,
    requested: Option<ListParams>,
    status: QueryStatus,
    data: Option<Paginated<T>>,
    data_key: Option<String>,
    /// Показана страница из кэша, ответ сервера для неё ещё не пришёл.
    showing_cached: bool,
    error: Option<Arc<ClientError>>,
    latest_ticket: u64,
    debounce_generation: u64,
    version: u64,
    cache: HashMap<String, Paginated<T>>,
}

/// Состояние одного списочного экрана.
pub struct ListQuery<T> {
    fetcher: Arc<dyn ListFetcher<T>>,
    state: Mutex<QueryState<T>>,
    debounce: Duration,
}

impl<T> std::fmt::Debug for ListQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ListQuery")
            .field("params", &state.params)
            .field("status", &state.status)
            .field("latest_ticket", &state.latest_ticket)
            .finish_non_exhaustive()
    }
}

impl<T> ListQuery<T> {
    fn lock(&self) -> MutexGuard<'_, QueryState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> ListQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Создаёт состояние с начальными параметрами. Загрузка не запускается.
    pub fn new(fetcher: Arc<dyn ListFetcher<T>>, params: ListParams) -> Self {
        Self {
            fetcher,
            state: Mutex::new(QueryState {
                params,
                requested: None,
                status: QueryStatus::Idle,
                data: None,
                data_key: None,
                showing_cached: false,
                error: None,
                latest_ticket: 0,
                debounce_generation: 0,
                version: 0,
                cache: HashMap::new(),
            }),
            debounce: Duration::from_millis(300),
        }
    }

    /// Задаёт паузу тишины для [`ListQuery::update_params_debounced`].
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Текущие параметры.
    pub fn params(&self) -> ListParams {
        self.lock().params.clone()
    }

    /// Текущий статус.
    pub fn status(&self) -> QueryStatus {
        self.lock().status
    }

    /// Идёт ли загрузка.
    pub fn is_loading(&self) -> bool {
        self.status() == QueryStatus::Loading
    }

    /// Завершилась ли последняя загрузка ошибкой.
    pub fn is_error(&self) -> bool {
        self.status() == QueryStatus::Error
    }

    /// Ошибка последней загрузки.
    pub fn error(&self) -> Option<Arc<ClientError>> {
        self.lock().error.clone()
    }

    /// Записи текущей страницы; пусто, пока данных нет.
    pub fn items(&self) -> Vec<T> {
        self.lock()
            .data
            .as_ref()
            .map(|page| page.data.clone())
            .unwrap_or_default()
    }

    /// Пагинация; до первой загрузки страница 1 из 1, всего 0.
    pub fn pagination(&self) -> PageMeta {
        self.lock()
            .data
            .as_ref()
            .map(|page| page.meta.clone())
            .unwrap_or_default()
    }

    /// Загружает текущие параметры.
    pub async fn fetch(&self) -> FetchOutcome {
        self.load().await
    }

    /// Повторная загрузка текущих параметров по запросу пользователя.
    pub async fn refetch(&self) -> FetchOutcome {
        self.load().await
    }

    /// Применяет изменение параметров и загружает список, если кортеж
    /// параметров отличается от последнего запрошенного.
    pub async fn update_params(&self, update: ParamsUpdate) -> FetchOutcome {
        let should_load = {
            let mut state = self.lock();
            Self::merge(&mut state, update);
            state.debounce_generation += 1;
            state.requested.as_ref() != Some(&state.params)
        };
        if !should_load {
            return FetchOutcome::Unchanged;
        }
        self.load().await
    }

    /// Применяет изменение сразу, а загрузку откладывает: запрос уходит,
    /// только если за паузу тишины не пришло новых изменений.
    pub async fn update_params_debounced(&self, update: ParamsUpdate) -> FetchOutcome {
        let generation = {
            let mut state = self.lock();
            Self::merge(&mut state, update);
            state.debounce_generation += 1;
            state.debounce_generation
        };

        tokio::time::sleep(self.debounce).await;

        {
            let state = self.lock();
            if state.debounce_generation != generation {
                return FetchOutcome::Superseded;
            }
            if state.requested.as_ref() == Some(&state.params) {
                return FetchOutcome::Unchanged;
            }
        }
        self.load().await
    }

    fn merge(state: &mut QueryState<T>, update: ParamsUpdate) {
        let last_page = state.data.as_ref().map(|page| page.meta.last_page);
        state.params.apply(update, last_page);
    }

    async fn load(&self) -> FetchOutcome {
        let (ticket, params) = {
            let mut state = self.lock();
            state.latest_ticket += 1;
            state.status = QueryStatus::Loading;
            state.requested = Some(state.params.clone());

            let key = state.params.cache_key();
            if state.data_key.as_deref() != Some(key.as_str()) {
                state.data = state.cache.get(&key).cloned();
                state.data_key = Some(key);
                state.showing_cached = true;
                state.version += 1;
            }
            (state.latest_ticket, state.params.clone())
        };

        debug!(ticket, page = params.page, "loading list page");
        let result = self.fetcher.fetch(&params).await;

        let mut state = self.lock();
        if state.latest_ticket != ticket {
            debug!(
                ticket,
                latest = state.latest_ticket,
                "discarding stale list response"
            );
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(page) => {
                let key = params.cache_key();
                state.cache.insert(key.clone(), page.clone());
                state.data = Some(page);
                state.data_key = Some(key);
                state.showing_cached = false;
                state.error = None;
                state.status = QueryStatus::Success;
                state.version += 1;
                FetchOutcome::Committed
            }
            Err(err) => {
                debug!(error = %err, "list page failed to load");
                state.error = Some(Arc::new(err));
                state.status = QueryStatus::Error;
                FetchOutcome::Failed
            }
        }
    }

    /// Снимок текущих данных.
    pub fn snapshot(&self) -> Snapshot<T> {
        let state = self.lock();
        Snapshot {
            page: state.data.clone(),
            version: state.version,
        }
    }

    /// Локально изменяет текущую страницу до подтверждения сервером.
    ///
    /// Незавершённая повторная загрузка той же страницы теряет актуальность,
    /// чтобы не вернуть устаревшие данные поверх локального изменения.
    /// Загрузка, которая обновляет показанную из кэша страницу, продолжается.
    /// Возвращает версию данных после изменения или `None`, если данных нет.
    pub fn apply_local<F>(&self, edit: F) -> Option<u64>
    where
        F: FnOnce(&mut Paginated<T>),
    {
        let mut state = self.lock();
        let page = state.data.as_mut()?;
        edit(page);

        if state.status == QueryStatus::Loading && !state.showing_cached {
            state.latest_ticket += 1;
            state.status = QueryStatus::Success;
        }
        state.version += 1;
        Some(state.version)
    }

    /// Возвращает данные из снимка, если после локального изменения с версией
    /// `expected_version` состояние больше не менялось.
    pub fn restore(&self, snapshot: Snapshot<T>, expected_version: u64) -> bool {
        let mut state = self.lock();
        if state.version != expected_version {
            debug!(
                expected_version,
                version = state.version,
                "skipping rollback, list was refreshed meanwhile"
            );
            return false;
        }
        state.data = snapshot.page;
        state.version += 1;
        true
    }

    /// Сбрасывает кэш страниц (после изменений на сервере).
    pub fn invalidate(&self) {
        self.lock().cache.clear();
    }
}
