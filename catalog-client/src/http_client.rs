use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::multipart::Form;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult, FieldErrors};
use crate::models::ApiResponse;
use crate::notify::{NavigationMode, Navigator, Notice, Notifier};
use crate::session::SessionState;

/// Текст уведомления при истечении сессии.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";

/// Настройки HTTP-клиента.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Базовый URL API, например `http://127.0.0.1:8000/api/v1`.
    pub base_url: String,
    /// Таймаут всего запроса.
    pub timeout: Duration,
    /// Таймаут установки соединения.
    pub connect_timeout: Duration,
    /// Задержка перед переходом на экран входа после 401.
    pub redirect_delay: Duration,
    /// Путь экрана входа.
    pub login_path: String,
    /// Origin для относительных путей к файлам (обложки, фото).
    pub asset_origin: String,
    /// Пауза тишины для отложенных изменений параметров списка.
    pub debounce: Duration,
}

impl ClientSettings {
    /// Настройки по умолчанию для заданного API.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let asset_origin = origin_of(&base_url).unwrap_or_else(|| base_url.clone());
        Self {
            base_url,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            redirect_delay: Duration::from_secs(1),
            login_path: "/login".to_string(),
            asset_origin,
            debounce: Duration::from_millis(300),
        }
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Тело запроса.
#[derive(Debug, Default)]
pub enum RequestBody {
    /// Без тела.
    #[default]
    Empty,
    /// JSON.
    Json(serde_json::Value),
    /// `multipart/form-data`; тип содержимого выставляет сама форма.
    Multipart(Form),
}

impl RequestBody {
    /// JSON-тело из сериализуемого значения.
    pub fn json<T: Serialize>(value: &T) -> ClientResult<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|err| ClientError::InvalidRequest(format!("failed to encode body: {err}")))
    }
}

/// Дополнительные параметры запроса.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query-параметры.
    pub query: Vec<(String, String)>,
    /// Дополнительные заголовки.
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    /// Параметры только с query-строкой.
    pub fn with_query(query: Vec<(String, String)>) -> Self {
        Self {
            query,
            headers: Vec::new(),
        }
    }
}

/// Однократный флаг «переход на вход уже выполняется».
///
/// Захватывается первым получившим 401 запросом и освобождается по
/// истечении задержки перехода, в том числе на экране входа.
#[derive(Debug, Default)]
pub struct RedirectGuard {
    in_progress: AtomicBool,
}

impl RedirectGuard {
    /// Захватывает флаг; `false`, если он уже захвачен.
    pub fn try_acquire(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Освобождает флаг.
    pub fn release(&self) {
        self.in_progress.store(false, Ordering::Release);
    }

    /// Выполняется ли переход сейчас.
    pub fn is_active(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: Option<FieldErrors>,
}

#[derive(Debug, Deserialize)]
struct AckDto {
    #[serde(default)]
    message: Option<String>,
}

struct Inner {
    settings: ClientSettings,
    client: Client,
    session: Arc<SessionState>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    redirect: RedirectGuard,
}

#[derive(Clone)]
/// HTTP-клиент для REST API каталога.
///
/// Подставляет bearer-токен из хранилища сессии, ограничивает время запроса
/// и централизованно обрабатывает 401.
pub struct HttpClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.settings.base_url)
            .field("redirect_in_progress", &self.inner.redirect.is_active())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Создаёт клиент с базовым URL, заголовками по умолчанию и таймаутом.
    pub fn new(
        settings: ClientSettings,
        session: Arc<SessionState>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ClientError::InvalidRequest(format!("failed to build http client: {err}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                client,
                session,
                notifier,
                navigator,
                redirect: RedirectGuard::default(),
            }),
        })
    }

    /// Настройки клиента.
    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    /// Общее состояние сессии.
    pub fn session(&self) -> &Arc<SessionState> {
        &self.inner.session
    }

    /// Получатель уведомлений клиента.
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.inner.notifier
    }

    /// Навигация клиента.
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.inner.navigator
    }

    /// Выполняется ли сейчас переход на экран входа после 401.
    pub fn redirect_in_progress(&self) -> bool {
        self.inner.redirect.is_active()
    }

    fn endpoint(&self, path: &str) -> String {
        if is_absolute(path) {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.inner.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Токен отправляется только в настроенный API, но не на сторонние URL;
    /// 401 от сторонних URL сессию не сбрасывает.
    fn belongs_to_api(&self, url: &str) -> bool {
        let base = self.inner.settings.base_url.trim_end_matches('/');
        match url.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }

    async fn decode_error(response: Response) -> ClientError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let (message, errors) = match serde_json::from_str::<ErrorResponseDto>(&body) {
            Ok(dto) => (dto.message.or(dto.error), dto.errors),
            Err(_) => {
                let text = body.trim();
                let message = (!text.is_empty() && !text.starts_with('{')).then(|| text.to_string());
                (message, None)
            }
        };
        let message = message.filter(|message| !message.trim().is_empty());

        ClientError::from_http_status(status, message, errors, body)
    }

    fn handle_unauthorized(&self) {
        if !self.inner.redirect.try_acquire() {
            debug!("login redirect already in progress, skipping");
            return;
        }

        warn!("received 401, clearing session and redirecting to login");
        self.inner.session.logout();
        self.inner
            .notifier
            .notify(Notice::error(SESSION_EXPIRED_MESSAGE));

        let login_path = self.inner.settings.login_path.as_str();
        let already_on_login = self.inner.navigator.current_path().starts_with(login_path);

        // Флаг держится до конца задержки, даже если переход не нужен.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.settings.redirect_delay).await;
            if !already_on_login {
                inner
                    .navigator
                    .navigate(&inner.settings.login_path, NavigationMode::Replace);
            }
            inner.redirect.release();
        });
    }

    /// Отправляет запрос и возвращает успешный (2xx) ответ.
    ///
    /// Любой другой статус превращается в [`ClientError`] без повторов; 401
    /// от настроенного API дополнительно запускает однократный выход из сессии.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> ClientResult<Response> {
        let url = self.endpoint(path);

        let mut request = self.inner.client.request(method.clone(), &url);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if self.belongs_to_api(&url) {
            if let Some(token) = self.inner.session.persisted_token() {
                request = request.bearer_auth(token);
            }
        }
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Multipart(form) => request.multipart(form),
        };

        debug!(%method, %url, "sending request");
        let response = request.send().await.map_err(ClientError::from_reqwest)?;
        let status = response.status();
        debug!(%method, %url, status = status.as_u16(), "response received");

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED && self.belongs_to_api(&url) {
            self.handle_unauthorized();
        }
        Err(Self::decode_error(response).await)
    }

    /// Отправляет запрос и разбирает JSON-ответ.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> ClientResult<T> {
        self.send(method, path, body, options)
            .await?
            .json::<T>()
            .await
            .map_err(ClientError::from_reqwest)
    }

    /// Отправляет запрос и возвращает `data` из конверта `ApiResponse`.
    pub async fn request_data<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> ClientResult<T> {
        let envelope: ApiResponse<T> = self.request(method, path, body, options).await?;
        Ok(envelope.data)
    }

    /// Запрос без полезной нагрузки в ответе (удаление, смена статуса).
    ///
    /// Возвращает `message` сервера, если он есть; пустое тело допустимо.
    pub async fn acknowledge(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> ClientResult<Option<String>> {
        let response = self
            .send(method, path, body, RequestOptions::default())
            .await?;
        let text = response.text().await.map_err(ClientError::from_reqwest)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(serde_json::from_str::<AckDto>(&text)
            .ok()
            .and_then(|ack| ack.message))
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MemoryHistory, TracingNotifier};
    use crate::storage::MemoryStore;

    fn client(base_url: &str) -> HttpClient {
        let session = Arc::new(SessionState::bootstrap(Arc::new(MemoryStore::new())));
        HttpClient::new(
            ClientSettings::new(base_url),
            session,
            Arc::new(TracingNotifier),
            Arc::new(MemoryHistory::default()),
        )
        .expect("client must build")
    }

    #[test]
    fn endpoint_normalizes_slashes() {
        let client = client("http://localhost:8000/api/v1/");
        assert_eq!(
            client.endpoint("/admin/books"),
            "http://localhost:8000/api/v1/admin/books"
        );
        assert_eq!(
            client.endpoint("admin/categories"),
            "http://localhost:8000/api/v1/admin/categories"
        );
    }

    #[test]
    fn endpoint_keeps_absolute_urls() {
        let client = client("http://localhost:8000/api/v1");
        assert_eq!(
            client.endpoint("https://ui-avatars.com/api/"),
            "https://ui-avatars.com/api/"
        );
    }

    #[test]
    fn token_is_scoped_to_configured_api() {
        let client = client("http://localhost:8000/api/v1");
        assert!(client.belongs_to_api("http://localhost:8000/api/v1/admin/books"));
        assert!(client.belongs_to_api("http://localhost:8000/api/v1"));
        assert!(!client.belongs_to_api("http://localhost:8000/api/v10/admin"));
        assert!(!client.belongs_to_api("https://ui-avatars.com/api/"));
    }

    #[test]
    fn settings_derive_asset_origin_from_base_url() {
        let settings = ClientSettings::new("http://localhost:8000/api/v1");
        assert_eq!(settings.asset_origin, "http://localhost:8000");
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.login_path, "/login");
    }

    #[test]
    fn redirect_guard_is_single_assignment() {
        let guard = RedirectGuard::default();
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());
        assert!(guard.is_active());
        guard.release();
        assert!(guard.try_acquire());
    }
}
