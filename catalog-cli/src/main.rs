mod logging;
mod output;
mod settings;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use catalog_client::analytics::{Overview, average_price_by_category};
use catalog_client::flows::{self, ActionMessages, FormOutcome};
use catalog_client::guard::Route;
use catalog_client::mutation::DELETED_MESSAGE;
use catalog_client::notify::{MemoryHistory, Notice, Notifier};
use catalog_client::params::{ListParams, ParamsUpdate};
use catalog_client::query::{FetchOutcome, ListQuery};
use catalog_client::services::{QUERY_FILTER, SEARCH_FILTER};
use catalog_client::storage::FileStore;
use catalog_client::{
    BookForm, CatalogClient, CategoryInput, ClientError, LoginCredentials, Upload,
};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::output::ConsoleNotifier;
use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "catalog-cli",
    version,
    about = "CLI клиент административной панели каталога"
)]
struct Cli {
    /// Адрес API (перекрывает CATALOG_API_URL).
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Вход администратора.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Выход и очистка сохранённой сессии.
    Logout,
    /// Текущий пользователь из сохранённой сессии.
    Whoami,
    /// Книги.
    #[command(subcommand)]
    Books(BookCommand),
    /// Категории.
    #[command(subcommand)]
    Categories(CategoryCommand),
    /// Авторы.
    #[command(subcommand)]
    Authors(AuthorCommand),
    /// Товары.
    #[command(subcommand)]
    Products(ProductCommand),
    /// Сводка главной панели.
    Analytics {
        /// Средние цены считать по товарам, а не по книгам.
        #[arg(long)]
        products: bool,
        /// Вывести сводку в JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    per_page: Option<u32>,
}

impl PageArgs {
    fn update(&self) -> ParamsUpdate {
        let update = ParamsUpdate::new().page(self.page);
        match self.per_page {
            Some(per_page) => update.per_page(per_page),
            None => update,
        }
    }
}

#[derive(Debug, Subcommand)]
enum BookCommand {
    /// Список книг.
    List {
        #[command(flatten)]
        paging: PageArgs,
        /// Фильтр по названию.
        #[arg(long)]
        title: Option<String>,
        /// Сортировка, например `-created_at` или `title`.
        #[arg(long)]
        sort: Option<String>,
    },
    /// Карточка книги.
    Get {
        #[arg(long)]
        slug: String,
    },
    /// Создание книги.
    Create(BookArgs),
    /// Изменение книги; не указанные поля остаются прежними.
    Update {
        #[arg(long)]
        slug: String,
        #[command(flatten)]
        fields: BookArgs,
    },
    /// Удаление книги.
    Delete {
        #[arg(long)]
        slug: String,
    },
}

#[derive(Debug, Args)]
struct BookArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    isbn: Option<String>,
    #[arg(long)]
    price: Option<f64>,
    #[arg(long)]
    year: Option<i32>,
    #[arg(long)]
    stock: Option<i64>,
    #[arg(long)]
    category: Option<i64>,
    #[arg(long)]
    owner: Option<i64>,
    /// Соавторы через запятую.
    #[arg(long, value_delimiter = ',')]
    authors: Option<Vec<i64>>,
    /// Файл обложки.
    #[arg(long)]
    cover: Option<PathBuf>,
}

impl BookArgs {
    fn into_new_form(self) -> Result<BookForm> {
        let form = BookForm {
            title: required(self.title.clone(), "--title")?,
            category_id: None,
            isbn: required(self.isbn.clone(), "--isbn")?,
            price: required(self.price, "--price")?,
            publish_year: required(self.year, "--year")?,
            stock: 0,
            owner_id: None,
            author_ids: Vec::new(),
            cover: None,
        };
        self.apply(form)
    }

    fn apply(self, mut form: BookForm) -> Result<BookForm> {
        if let Some(title) = self.title {
            form.title = title;
        }
        if let Some(isbn) = self.isbn {
            form.isbn = isbn;
        }
        if let Some(price) = self.price {
            form.price = price;
        }
        if let Some(year) = self.year {
            form.publish_year = year;
        }
        if let Some(stock) = self.stock {
            form.stock = stock;
        }
        if self.category.is_some() {
            form.category_id = self.category;
        }
        if self.owner.is_some() {
            form.owner_id = self.owner;
        }
        if let Some(authors) = self.authors {
            form.author_ids = authors;
        }
        if let Some(path) = self.cover {
            form.cover = Some(read_upload(&path)?);
        }
        Ok(form)
    }
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    /// Дерево корневых категорий.
    List {
        #[command(flatten)]
        paging: PageArgs,
    },
    /// Категория по slug.
    Get {
        #[arg(long)]
        slug: String,
        /// Связи для подгрузки, например `children`.
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,
    },
    /// Создание категории.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Изменение категории.
    Update {
        #[arg(long)]
        slug: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Удаление категории.
    Delete {
        #[arg(long)]
        slug: String,
    },
    /// Подкатегории.
    Subcategories {
        #[arg(long)]
        parent: i64,
    },
}

#[derive(Debug, Subcommand)]
enum AuthorCommand {
    /// Список авторов.
    List {
        #[command(flatten)]
        paging: PageArgs,
        #[arg(long)]
        search: Option<String>,
    },
    /// Карточка автора.
    Get {
        #[arg(long)]
        id: i64,
    },
    /// Одобрение учётной записи.
    Approve {
        #[arg(long)]
        id: i64,
    },
    /// Блокировка учётной записи.
    Block {
        #[arg(long)]
        id: i64,
    },
    /// Удаление автора.
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum ProductCommand {
    /// Список товаров.
    List {
        #[command(flatten)]
        paging: PageArgs,
        /// Поисковый запрос.
        #[arg(long)]
        q: Option<String>,
    },
    /// Товар по id.
    Get {
        #[arg(long)]
        id: i64,
    },
    /// Поиск товаров.
    Search {
        #[arg(long)]
        q: String,
    },
    /// Удаление товара.
    Delete {
        #[arg(long)]
        id: i64,
    },
}

impl Command {
    /// Экран панели, которому соответствует команда.
    fn route(&self) -> Route {
        match self {
            Self::Login { .. } | Self::Logout => Route::Login,
            Self::Whoami | Self::Analytics { .. } => Route::Dashboard,
            Self::Books(command) => match command {
                BookCommand::Get { slug } => Route::BookDetail(slug.clone()),
                BookCommand::Create(_) => Route::BookNew,
                BookCommand::Update { slug, .. } => Route::BookEdit(slug.clone()),
                BookCommand::List { .. } | BookCommand::Delete { .. } => Route::Books,
            },
            Self::Categories(_) => Route::Categories,
            Self::Authors(command) => match command {
                AuthorCommand::Get { id } => Route::AuthorEdit(*id),
                _ => Route::Authors,
            },
            Self::Products(command) => match command {
                ProductCommand::Get { id } => Route::ProductDetail(*id),
                _ => Route::Products,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::from_env()?.with_server(cli.server);
    logging::init_logging(&settings.log_level)?;
    debug!(api_url = %settings.api_url, session = %settings.session_file.display(), "starting");

    let route = cli.command.route();
    let history = Arc::new(MemoryHistory::new(route.to_path()));
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let client = CatalogClient::new(
        settings.client_settings(),
        Arc::new(FileStore::new(&settings.session_file)),
        notifier,
        history.clone(),
    )
    .map_err(client_error)
    .context("не удалось создать HTTP клиент")?;

    if route.requires_auth() {
        ensure_access(&client, &route)?;
    }

    match cli.command {
        Command::Login { username, password } => {
            let user = client
                .login(&LoginCredentials { username, password })
                .await
                .map_err(client_error)?;
            output::print_user("Вход выполнен", &user);
        }
        Command::Logout => {
            client.logout().await.map_err(client_error)?;
            println!("Сессия завершена");
        }
        Command::Whoami => {
            let session = client.session().snapshot();
            let user = session
                .user()
                .ok_or_else(|| anyhow!("сессия не найдена"))?;
            output::print_user("Текущий пользователь", user);
        }
        Command::Books(command) => books(&client, history.as_ref(), command, &settings).await?,
        Command::Categories(command) => categories(&client, history.as_ref(), command).await?,
        Command::Authors(command) => authors(&client, history.as_ref(), command, &settings).await?,
        Command::Products(command) => products(&client, history.as_ref(), command).await?,
        Command::Analytics { products, json } => analytics(&client, products, json).await?,
    }

    Ok(())
}

/// Проверяет сессию так же, как панель проверяет экран перед показом.
fn ensure_access(client: &CatalogClient, route: &Route) -> Result<()> {
    let rendered = client.enforce_route();
    if !client.session().is_authenticated() {
        bail!("требуется авторизация: выполните `catalog-cli login --username ... --password ...`");
    }
    match rendered {
        Some(rendered) if rendered == *route => Ok(()),
        _ => Err(anyhow!("некорректный адрес экрана: {route}")),
    }
}

async fn books(
    client: &CatalogClient,
    history: &MemoryHistory,
    command: BookCommand,
    settings: &Settings,
) -> Result<()> {
    let notifier = client.notifier().as_ref();
    match command {
        BookCommand::List { paging, title, sort } => {
            let mut update = paging.update();
            if let Some(title) = title {
                update = update.filter("title", title);
            }
            if let Some(sort) = sort {
                update = update.sort(sort);
            }
            let query = client.books_query();
            let books = load_list(&query, update).await?;
            output::print_page_meta("Книг", &query.pagination(), books.len());
            books.iter().for_each(output::print_book_line);
        }
        BookCommand::Get { slug } => {
            let route = Route::BookDetail(slug.clone());
            let book = flows::load_detail(&route, notifier, history, client.books().get(&slug))
                .await
                .ok_or_else(|| anyhow!("книга не загружена"))?;
            output::print_book("Книга", &book, &settings.asset_origin);
        }
        BookCommand::Create(fields) => {
            let form = fields.into_new_form()?;
            let book = saved(
                flows::submit_form(notifier, "Book created", client.books().create(form)).await,
            )?;
            output::print_book("Книга создана", &book, &settings.asset_origin);
        }
        BookCommand::Update { slug, fields } => {
            let route = Route::BookEdit(slug.clone());
            let current = flows::load_detail(&route, notifier, history, client.books().get(&slug))
                .await
                .ok_or_else(|| anyhow!("книга не загружена"))?;
            let form = fields.apply(BookForm::from_book(&current))?;
            let book = saved(
                flows::submit_form(notifier, "Book updated", client.books().update(&slug, form))
                    .await,
            )?;
            output::print_book("Книга обновлена", &book, &settings.asset_origin);
        }
        BookCommand::Delete { slug } => {
            let message = client.books().delete(&slug).await.map_err(client_error)?;
            println!("{}", message.as_deref().unwrap_or(DELETED_MESSAGE));
        }
    }
    Ok(())
}

async fn categories(
    client: &CatalogClient,
    history: &MemoryHistory,
    command: CategoryCommand,
) -> Result<()> {
    let notifier = client.notifier().as_ref();
    match command {
        CategoryCommand::List { paging } => {
            let query = client.categories_query();
            let categories = load_list(&query, paging.update()).await?;
            output::print_page_meta("Категорий", &query.pagination(), categories.len());
            output::print_category_tree(&categories, 0);
        }
        CategoryCommand::Get { slug, include } => {
            let category = flows::load_detail(
                &Route::Categories,
                notifier,
                history,
                client.categories().get(&slug, &include),
            )
            .await
            .ok_or_else(|| anyhow!("категория не загружена"))?;
            output::print_category("Категория", &category);
        }
        CategoryCommand::Create { name, parent } => {
            let input = CategoryInput {
                name,
                parent_id: parent,
            };
            let category = saved(
                flows::submit_form(notifier, "Category created", client.categories().create(&input))
                    .await,
            )?;
            output::print_category("Категория создана", &category);
        }
        CategoryCommand::Update { slug, name, parent } => {
            let input = CategoryInput {
                name,
                parent_id: parent,
            };
            let category = saved(
                flows::submit_form(
                    notifier,
                    "Category updated",
                    client.categories().update(&slug, &input),
                )
                .await,
            )?;
            output::print_category("Категория обновлена", &category);
        }
        CategoryCommand::Delete { slug } => {
            let message = client
                .categories()
                .delete(&slug)
                .await
                .map_err(client_error)?;
            println!("{}", message.as_deref().unwrap_or(DELETED_MESSAGE));
        }
        CategoryCommand::Subcategories { parent } => {
            let children = client
                .categories()
                .subcategories(parent)
                .await
                .map_err(client_error)?;
            println!("Подкатегорий: {}", children.len());
            output::print_category_tree(&children, 0);
        }
    }
    Ok(())
}

async fn authors(
    client: &CatalogClient,
    history: &MemoryHistory,
    command: AuthorCommand,
    settings: &Settings,
) -> Result<()> {
    let notifier = client.notifier().as_ref();
    match command {
        AuthorCommand::List { paging, search } => {
            let mut update = paging.update();
            if let Some(search) = search {
                update = update.filter(SEARCH_FILTER, search);
            }
            let query = client.authors_query();
            let authors = load_list(&query, update).await?;
            output::print_page_meta("Авторов", &query.pagination(), authors.len());
            authors.iter().for_each(output::print_author_line);
        }
        AuthorCommand::Get { id } => {
            let author = flows::load_detail(
                &Route::AuthorEdit(id),
                notifier,
                history,
                client.authors().get(id),
            )
            .await
            .ok_or_else(|| anyhow!("автор не загружен"))?;
            output::print_author("Автор", &author, &settings.asset_origin);
        }
        AuthorCommand::Approve { id } => {
            let messages = ActionMessages {
                success: "Author approved",
                failure: "Approval failed",
            };
            author_action(client, messages, client.authors().approve(id)).await?;
        }
        AuthorCommand::Block { id } => {
            let messages = ActionMessages {
                success: "Author blocked",
                failure: "Blocking failed",
            };
            author_action(client, messages, client.authors().block(id)).await?;
        }
        AuthorCommand::Delete { id } => {
            let message = client.authors().delete(id).await.map_err(client_error)?;
            println!("{}", message.as_deref().unwrap_or(DELETED_MESSAGE));
        }
    }
    Ok(())
}

/// Действие над автором с последующим обновлением списка.
async fn author_action<F>(
    client: &CatalogClient,
    messages: ActionMessages<'_>,
    action: F,
) -> Result<()>
where
    F: std::future::Future<Output = catalog_client::ClientResult<Option<String>>>,
{
    let query = client.authors_query();
    let message = flows::run_action(&query, client.notifier().as_ref(), messages, action)
        .await
        .map_err(client_error)?;
    if let Some(message) = message {
        println!("{message}");
    }
    let authors = query.items();
    output::print_page_meta("Авторов", &query.pagination(), authors.len());
    authors.iter().for_each(output::print_author_line);
    Ok(())
}

async fn products(
    client: &CatalogClient,
    history: &MemoryHistory,
    command: ProductCommand,
) -> Result<()> {
    let notifier = client.notifier().as_ref();
    match command {
        ProductCommand::List { paging, q } => {
            let mut update = paging.update();
            if let Some(q) = q {
                update = update.filter(QUERY_FILTER, q);
            }
            let query = client.products_query();
            let products = load_list(&query, update).await?;
            output::print_page_meta("Товаров", &query.pagination(), products.len());
            products.iter().for_each(output::print_product_line);
        }
        ProductCommand::Get { id } => {
            let product = flows::load_detail(
                &Route::ProductDetail(id),
                notifier,
                history,
                client.products().get(id),
            )
            .await
            .ok_or_else(|| anyhow!("товар не загружен"))?;
            output::print_product("Товар", &product);
        }
        ProductCommand::Search { q } => {
            let page = client.products().search(&q).await.map_err(client_error)?;
            output::print_page_meta("Найдено", &page.meta, page.data.len());
            page.data.iter().for_each(output::print_product_line);
        }
        ProductCommand::Delete { id } => {
            let product = client.products().delete(id).await.map_err(client_error)?;
            println!("{DELETED_MESSAGE}: {}", product.title);
        }
    }
    Ok(())
}

async fn analytics(client: &CatalogClient, products: bool, json: bool) -> Result<()> {
    let books_params = ListParams::new(100).sorted_by("-created_at");
    let authors_params = ListParams::new(100);
    let (books, authors) = tokio::join!(
        client.books().list(&books_params),
        client.authors().list(&authors_params),
    );
    let mut overview =
        Overview::from_pages(&books.map_err(client_error)?, &authors.map_err(client_error)?);

    if products {
        let page = client.products().list(100, 0).await.map_err(client_error)?;
        overview.price_by_category = average_price_by_category(&page.data);
    }
    if overview.price_by_category.is_empty() {
        client
            .notifier()
            .notify(Notice::info("No priced items to average"));
    }

    if json {
        let raw = serde_json::to_string_pretty(&overview).context("не удалось сериализовать сводку")?;
        println!("{raw}");
        return Ok(());
    }

    println!("Книг: {}", overview.books_total);
    println!(
        "Авторов: {} (активных на странице: {})",
        overview.authors_total, overview.active_authors
    );
    println!("Последние книги:");
    for title in &overview.recent_books {
        println!("  - {title}");
    }
    println!("Средняя цена по категориям:");
    output::print_prices(&overview.price_by_category);
    Ok(())
}

async fn load_list<T>(query: &ListQuery<T>, update: ParamsUpdate) -> Result<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    match query.update_params(update).await {
        FetchOutcome::Failed => Err(query
            .error()
            .map(|err| describe(&err))
            .unwrap_or_else(|| anyhow!("не удалось загрузить список"))),
        _ => Ok(query.items()),
    }
}

fn saved<T>(outcome: FormOutcome<T>) -> Result<T> {
    match outcome {
        FormOutcome::Saved(value) => Ok(value),
        FormOutcome::Invalid(fields) => {
            let details: Vec<String> = fields
                .iter()
                .map(|(field, message)| format!("{field}: {message}"))
                .collect();
            Err(anyhow!("сервер отклонил данные: {}", details.join("; ")))
        }
        FormOutcome::Failed => Err(anyhow!("не удалось сохранить данные")),
    }
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("не указан обязательный параметр {flag}"))
}

fn read_upload(path: &Path) -> Result<Upload> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("не удалось прочитать файл {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("некорректное имя файла {}", path.display()))?;
    Ok(Upload::new(file_name, bytes))
}

fn client_error(err: ClientError) -> anyhow::Error {
    describe(&err)
}

fn describe(err: &ClientError) -> anyhow::Error {
    let message = match err {
        ClientError::Unauthorized => {
            "требуется авторизация: выполните `catalog-cli login ...`".to_string()
        }
        ClientError::Timeout => "сервер не ответил вовремя".to_string(),
        ClientError::Network(err) => format!("ошибка соединения: {err}"),
        ClientError::Validation { .. } => {
            let fields: Vec<String> = err
                .first_field_errors()
                .into_iter()
                .map(|(field, message)| format!("{field}: {message}"))
                .collect();
            match err.server_message() {
                Some(message) if fields.is_empty() => format!("ошибка валидации: {message}"),
                _ => format!("ошибка валидации: {}", fields.join("; ")),
            }
        }
        ClientError::NotFound { .. } => match err.server_message() {
            Some(message) => format!("ресурс не найден: {message}"),
            None => "ресурс не найден".to_string(),
        },
        ClientError::Status { status, .. } => format!(
            "ошибка сервера ({status}): {}",
            err.server_message().unwrap_or("без сообщения")
        ),
        ClientError::Decode(message) => format!("некорректный ответ сервера: {message}"),
        ClientError::InvalidRequest(message) => format!("некорректный запрос: {message}"),
        ClientError::Storage(message) => format!("ошибка хранилища сессии: {message}"),
    };
    anyhow!(message)
}
