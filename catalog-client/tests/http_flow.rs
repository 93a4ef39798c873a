//! Сценарии клиента против встроенного тестового backend на `axum`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use catalog_client::flows::{self, ActionMessages, FormOutcome};
use catalog_client::guard::Route;
use catalog_client::mutation::optimistic_delete;
use catalog_client::notify::{MemoryHistory, NavigationMode, Navigator, Notice, Notifier};
use catalog_client::params::{ListParams, ParamsUpdate};
use catalog_client::query::FetchOutcome;
use catalog_client::storage::{MemoryStore, SessionStore, TOKEN_KEY};
use catalog_client::{
    BookForm, CatalogClient, CategoryInput, ClientError, ClientResult, ClientSettings,
    EntityKey, LoginCredentials, RequestBody, RequestOptions, SESSION_EXPIRED_MESSAGE, Upload,
};
use reqwest::Method;

const TOKEN: &str = "jwt-admin";

#[derive(Default)]
struct BackendState {
    expired: AtomicBool,
    book_queries: Mutex<Vec<HashMap<String, String>>>,
    author_queries: Mutex<Vec<HashMap<String, String>>>,
    auth_headers: Mutex<Vec<Option<String>>>,
    uploads: Mutex<Vec<(String, String)>>,
}

impl BackendState {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let header = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let ok = header.as_deref() == Some(&format!("Bearer {TOKEN}"));
        self.auth_headers
            .lock()
            .expect("auth headers mutex poisoned")
            .push(header);
        ok && !self.expired.load(Ordering::SeqCst)
    }

    fn last_book_query(&self) -> HashMap<String, String> {
        self.book_queries
            .lock()
            .expect("book queries mutex poisoned")
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

type SharedState = Arc<BackendState>;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Unauthenticated."})),
    )
        .into_response()
}

fn book_json(slug: &str) -> Value {
    json!({
        "id": slug.len(),
        "title": slug,
        "slug": slug,
        "isbn": "978",
        "price": {"amount": 10.0, "formatted": "$10.00"},
        "owner": {"id": 2, "username": "owner"},
    })
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["username"] == "admin" && body["password"] == "password" {
        return Json(json!({
            "success": true,
            "data": {
                "token": TOKEN,
                "user": {"id": 1, "name": "Admin", "username": "admin", "type": "admin"}
            }
        }))
        .into_response();
    }
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "message": "Invalid credentials",
            "errors": {"username": ["These credentials do not match our records."]}
        })),
    )
        .into_response()
}

async fn list_books(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state
        .book_queries
        .lock()
        .expect("book queries mutex poisoned")
        .push(query.clone());

    let title = query.get("filter[title]").cloned().unwrap_or_default();
    if title == "foo" {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    let page: u32 = query
        .get("page")
        .and_then(|page| page.parse().ok())
        .unwrap_or(1);

    let books: Vec<Value> = if title.is_empty() {
        ["dune", "emma", "ulysses"].iter().map(|slug| book_json(slug)).collect()
    } else {
        vec![book_json(&format!("{title}-{page}"))]
    };
    Json(json!({
        "success": true,
        "data": {
            "data": books,
            "meta": {"current_page": page, "last_page": 5, "per_page": 15, "total": 75}
        }
    }))
    .into_response()
}

async fn get_book(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    if slug == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Book not found"})),
        )
            .into_response();
    }
    Json(json!({"success": true, "data": book_json(&slug)})).into_response()
}

async fn update_book(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    body: Bytes,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state
        .uploads
        .lock()
        .expect("uploads mutex poisoned")
        .push((content_type, String::from_utf8_lossy(&body).into_owned()));
    Json(json!({"success": true, "data": book_json(&slug)})).into_response()
}

async fn delete_book(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    if slug == "emma" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "Book is locked"})),
        )
            .into_response();
    }
    Json(json!({"success": true, "message": "Book deleted", "data": null})).into_response()
}

async fn create_category() -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "message": "The given data was invalid.",
            "errors": {"name": ["The name has already been taken.", "The name is too short."]}
        })),
    )
        .into_response()
}

async fn list_authors(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state
        .author_queries
        .lock()
        .expect("author queries mutex poisoned")
        .push(query);
    Json(json!({
        "success": true,
        "data": {
            "data": [{"id": 3, "username": "fherbert", "first_name": "Frank", "last_name": "Herbert", "status": "pending"}],
            "meta": {"current_page": 1, "last_page": 1, "per_page": 15, "total": 1}
        }
    }))
    .into_response()
}

async fn approve_author(Path(id): Path<i64>) -> Response {
    Json(json!({"success": true, "message": format!("Author {id} approved")})).into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({"data": null})).into_response()
}

async fn spawn_backend(state: SharedState) -> String {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(|| async { unauthorized() }))
        .route("/admin/books", get(list_books))
        .route(
            "/admin/books/{slug}",
            get(get_book).post(update_book).delete(delete_book),
        )
        .route("/admin/categories", post(create_category))
        .route("/admin/authors", get(list_authors))
        .route("/admin/authors/{id}/approve", patch(approve_author))
        .route("/slow", get(slow))
        .with_state(state);
    let app = Router::new()
        .route("/external", get(|| async { unauthorized() }))
        .nest("/api/v1", api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener must bind");
    let addr = listener.local_addr().expect("listener must have address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("backend must run");
    });
    format!("http://{addr}/api/v1")
}

#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    token_removals: AtomicUsize,
}

impl SessionStore for CountingStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        if key == TOKEN_KEY {
            self.token_removals.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.remove(key)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices mutex poisoned").clone()
    }

    fn count(&self, message: &str) -> usize {
        self.notices()
            .iter()
            .filter(|notice| notice.message == message)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .expect("notices mutex poisoned")
            .push(notice);
    }
}

struct Harness {
    client: CatalogClient,
    backend: SharedState,
    store: Arc<CountingStore>,
    notifier: Arc<RecordingNotifier>,
    history: Arc<MemoryHistory>,
}

async fn harness_with(initial_path: &str, configure: impl FnOnce(&mut ClientSettings)) -> Harness {
    let backend = SharedState::default();
    let base_url = spawn_backend(backend.clone()).await;

    let mut settings = ClientSettings::new(base_url);
    settings.timeout = Duration::from_secs(2);
    settings.redirect_delay = Duration::from_millis(300);
    settings.debounce = Duration::from_millis(50);
    configure(&mut settings);

    let store = Arc::new(CountingStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let history = Arc::new(MemoryHistory::new(initial_path));
    let client = CatalogClient::new(settings, store.clone(), notifier.clone(), history.clone())
        .expect("client must build");

    Harness {
        client,
        backend,
        store,
        notifier,
        history,
    }
}

async fn harness(initial_path: &str) -> Harness {
    harness_with(initial_path, |_| {}).await
}

fn admin_credentials() -> LoginCredentials {
    LoginCredentials {
        username: "admin".to_string(),
        password: "password".to_string(),
    }
}

async fn logged_in(initial_path: &str) -> Harness {
    let h = harness(initial_path).await;
    h.client
        .login(&admin_credentials())
        .await
        .expect("login must succeed");
    h
}

#[tokio::test]
async fn login_then_concurrent_401s_log_out_exactly_once() {
    let h = harness("/login").await;

    let user = h
        .client
        .login(&admin_credentials())
        .await
        .expect("login must succeed");
    assert_eq!(user.username, "admin");
    assert!(h.client.session().is_authenticated());
    assert_eq!(h.store.get(TOKEN_KEY).as_deref(), Some(TOKEN));

    h.history.navigate("/books", NavigationMode::Push);
    assert_eq!(h.client.enforce_route(), Some(Route::Books));

    let params = ListParams::new(15);
    let page = h
        .client
        .books()
        .list(&params)
        .await
        .expect("authorized list must succeed");
    assert_eq!(page.data.len(), 3);

    h.backend.expired.store(true, Ordering::SeqCst);
    let books = h.client.books();
    let (a, b, c) = tokio::join!(books.list(&params), books.list(&params), books.list(&params));
    for result in [a, b, c] {
        assert!(matches!(result, Err(ClientError::Unauthorized)));
    }

    assert!(!h.client.session().is_authenticated());
    assert!(h.store.get(TOKEN_KEY).is_none());
    assert_eq!(h.store.token_removals.load(Ordering::SeqCst), 1);
    assert_eq!(h.notifier.count(SESSION_EXPIRED_MESSAGE), 1);
    assert!(h.client.http().redirect_in_progress());
    assert_eq!(h.history.current_path(), "/books");

    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(h.history.current_path(), "/login");
    assert_eq!(h.history.entries(), vec!["/login", "/login"]);
    assert!(!h.client.http().redirect_in_progress());
    assert_eq!(h.client.enforce_route(), Some(Route::Login));
    assert_eq!(h.notifier.count(SESSION_EXPIRED_MESSAGE), 1);
}

#[tokio::test]
async fn concurrent_401s_on_login_screen_log_out_once() {
    let h = logged_in("/login").await;
    h.backend.expired.store(true, Ordering::SeqCst);

    let params = ListParams::new(15);
    let books = h.client.books();
    let (a, b, c) = tokio::join!(books.list(&params), books.list(&params), books.list(&params));
    for result in [a, b, c] {
        assert!(matches!(result, Err(ClientError::Unauthorized)));
    }

    assert!(!h.client.session().is_authenticated());
    assert_eq!(h.store.token_removals.load(Ordering::SeqCst), 1);
    assert_eq!(h.notifier.count(SESSION_EXPIRED_MESSAGE), 1);
    assert!(h.client.http().redirect_in_progress());

    let late = h.client.books().list(&params).await;
    assert!(matches!(late, Err(ClientError::Unauthorized)));
    assert_eq!(h.store.token_removals.load(Ordering::SeqCst), 1);
    assert_eq!(h.notifier.count(SESSION_EXPIRED_MESSAGE), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(!h.client.http().redirect_in_progress());
    assert_eq!(h.history.entries(), vec!["/login"]);
}

#[tokio::test]
async fn unauthorized_from_foreign_url_keeps_session() {
    let h = logged_in("/books").await;
    let origin = h
        .client
        .http()
        .settings()
        .base_url
        .trim_end_matches("/api/v1")
        .to_string();

    let result = h
        .client
        .http()
        .send(
            Method::GET,
            &format!("{origin}/external"),
            RequestBody::Empty,
            RequestOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(ClientError::Unauthorized)));

    assert!(h.client.session().is_authenticated());
    assert_eq!(h.store.token_removals.load(Ordering::SeqCst), 0);
    assert_eq!(h.notifier.count(SESSION_EXPIRED_MESSAGE), 0);
    assert!(!h.client.http().redirect_in_progress());
    assert_eq!(h.history.current_path(), "/books");
}

#[tokio::test]
async fn bearer_token_is_sent_only_after_login() {
    let h = harness("/").await;
    let params = ListParams::new(15);

    let anonymous = h.client.books().list(&params).await;
    assert!(matches!(anonymous, Err(ClientError::Unauthorized)));
    tokio::time::sleep(Duration::from_millis(400)).await;

    h.client
        .login(&admin_credentials())
        .await
        .expect("login must succeed");
    h.client
        .books()
        .list(&params)
        .await
        .expect("list must succeed");

    let headers = h
        .backend
        .auth_headers
        .lock()
        .expect("auth headers mutex poisoned")
        .clone();
    assert_eq!(headers.first(), Some(&None));
    assert_eq!(headers.last(), Some(&Some(format!("Bearer {TOKEN}"))));
}

#[tokio::test]
async fn invalid_credentials_surface_as_validation_error() {
    let h = harness("/login").await;
    let err = h
        .client
        .login(&LoginCredentials {
            username: "admin".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .expect_err("wrong password must fail");

    assert_eq!(
        err.first_field_errors()["username"],
        "These credentials do not match our records."
    );
    assert!(!h.client.session().is_authenticated());
    assert_eq!(h.notifier.count(SESSION_EXPIRED_MESSAGE), 0);
}

#[tokio::test]
async fn blank_credentials_are_rejected_without_request() {
    let h = harness("/login").await;
    let err = h
        .client
        .login(&LoginCredentials {
            username: String::new(),
            password: String::new(),
        })
        .await
        .expect_err("blank credentials must fail");

    assert!(matches!(err, ClientError::InvalidRequest(_)));
}

#[tokio::test]
async fn timeout_is_distinct_from_server_errors() {
    let h = harness_with("/", |settings| {
        settings.timeout = Duration::from_millis(200);
    })
    .await;

    let err = h
        .client
        .http()
        .send(
            reqwest::Method::GET,
            "/slow",
            Default::default(),
            Default::default(),
        )
        .await
        .expect_err("slow endpoint must time out");
    assert!(matches!(err, ClientError::Timeout));
    assert!(err.is_transport());
}

#[tokio::test]
async fn missing_book_returns_to_list() {
    let h = logged_in("/book/missing").await;

    let err = h
        .client
        .books()
        .get("missing")
        .await
        .expect_err("missing book must fail");
    assert!(matches!(
        &err,
        ClientError::NotFound { message } if message.as_deref() == Some("Book not found")
    ));

    let route = Route::from_path(&h.history.current_path());
    let loaded = flows::load_detail(
        &route,
        h.notifier.as_ref(),
        h.history.as_ref(),
        h.client.books().get("missing"),
    )
    .await;

    assert!(loaded.is_none());
    assert_eq!(h.history.current_path(), "/books");
    assert_eq!(h.notifier.count("Book not found"), 1);
}

#[tokio::test]
async fn book_update_uses_multipart_method_override() {
    let h = logged_in("/book/edit/dune").await;

    let book = h.client.books().get("dune").await.expect("book must load");
    let mut form = BookForm::from_book(&book);
    form.author_ids = vec![2, 7];
    form.cover = Some(Upload::new("cover.png", vec![0x89, 0x50, 0x4e, 0x47]));

    let saved = h
        .client
        .books()
        .update("dune", form)
        .await
        .expect("update must succeed");
    assert_eq!(saved.slug, "dune");

    let uploads = h.backend.uploads.lock().expect("uploads mutex poisoned").clone();
    let (content_type, body) = uploads.last().expect("upload must be recorded");
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    assert!(body.contains("name=\"_method\"\r\n\r\nPUT"));
    assert_eq!(body.matches("name=\"author_ids[]\"").count(), 1);
    assert!(body.contains("name=\"author_ids[]\"\r\n\r\n7"));
    assert!(body.contains("filename=\"cover.png\""));
    assert!(body.contains("image/png"));
}

#[tokio::test]
async fn category_validation_errors_reach_the_form() {
    let h = logged_in("/categories").await;
    let input = CategoryInput {
        name: "Fiction".to_string(),
        parent_id: None,
    };

    let outcome = flows::submit_form(
        h.notifier.as_ref(),
        "Category created",
        h.client.categories().create(&input),
    )
    .await;

    match outcome {
        FormOutcome::Invalid(fields) => {
            assert_eq!(fields["name"], "The name has already been taken.");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.notifier.count(flows::VALIDATION_FAILED_MESSAGE), 1);
}

#[tokio::test]
async fn typing_in_filter_discards_stale_page() {
    let h = logged_in("/books").await;
    let query = h.client.books_query();

    assert_eq!(
        query
            .update_params(ParamsUpdate::new().filter("title", "foo"))
            .await,
        FetchOutcome::Committed
    );
    assert_eq!(
        query.update_params(ParamsUpdate::new().page(3)).await,
        FetchOutcome::Committed
    );
    assert_eq!(query.params().page, 3);

    let (stale, fresh) = tokio::join!(query.refetch(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        query
            .update_params(ParamsUpdate::new().filter("title", "foobar"))
            .await
    });

    assert_eq!(stale, FetchOutcome::Superseded);
    assert_eq!(fresh, FetchOutcome::Committed);
    assert_eq!(query.params().page, 1);
    let items = query.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].slug, "foobar-1");

    // Ответ на устаревший запрос приходит позже, но уже ничего не меняет.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(query.items()[0].slug, "foobar-1");

    let last = h.backend.last_book_query();
    assert_eq!(last.get("filter[title]").map(String::as_str), Some("foobar"));
    assert_eq!(last.get("page").map(String::as_str), Some("1"));
    assert_eq!(last.get("sort").map(String::as_str), Some("-created_at"));
}

#[tokio::test]
async fn optimistic_delete_rolls_back_on_server_error() {
    let h = logged_in("/books").await;
    let query = h.client.books_query();
    query.fetch().await;
    let before = query.items();
    assert_eq!(before.len(), 3);

    let failed = optimistic_delete(
        &query,
        &EntityKey::Slug("emma".to_string()),
        h.notifier.as_ref(),
        h.client.books().delete("emma"),
    )
    .await;
    assert!(failed.is_err());
    assert_eq!(query.items(), before);
    assert_eq!(h.notifier.count("Book is locked"), 1);

    let deleted = optimistic_delete(
        &query,
        &EntityKey::Slug("dune".to_string()),
        h.notifier.as_ref(),
        h.client.books().delete("dune"),
    )
    .await
    .expect("delete must succeed");
    assert_eq!(deleted.as_deref(), Some("Book deleted"));
    let slugs: Vec<String> = query.items().into_iter().map(|book| book.slug).collect();
    assert_eq!(slugs, vec!["emma", "ulysses"]);
}

#[tokio::test]
async fn author_search_and_approve() {
    let h = logged_in("/authors").await;
    let query = h.client.authors_query();

    query
        .update_params_debounced(ParamsUpdate::new().filter("search", "herb"))
        .await;
    let recorded = h
        .backend
        .author_queries
        .lock()
        .expect("author queries mutex poisoned")
        .clone();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].get("search").map(String::as_str), Some("herb"));
    assert!(!recorded[0].contains_key("filter[search]"));

    let messages = ActionMessages {
        success: "Account approved",
        failure: "Approval failed",
    };
    let message = flows::run_action(
        &query,
        h.notifier.as_ref(),
        messages,
        h.client.authors().approve(3),
    )
    .await
    .expect("approve must succeed");

    assert_eq!(message.as_deref(), Some("Author 3 approved"));
    assert_eq!(h.notifier.count("Account approved"), 1);
    assert_eq!(
        h.backend
            .author_queries
            .lock()
            .expect("author queries mutex poisoned")
            .len(),
        2
    );
}

#[tokio::test]
async fn logout_clears_session_even_if_server_rejects_it() {
    let h = logged_in("/").await;
    h.client.logout().await.expect("logout must succeed");

    assert!(!h.client.session().is_authenticated());
    assert!(h.store.get(TOKEN_KEY).is_none());
    assert_eq!(h.client.enforce_route(), Some(Route::Login));
}
