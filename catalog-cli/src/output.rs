use catalog_client::analytics::CategoryPrice;
use catalog_client::assets::{author_photo_url, book_cover_url};
use catalog_client::notify::{Notice, NoticeLevel, Notifier};
use catalog_client::{Author, Book, Category, PageMeta, Product, User};

/// Уведомления клиента печатаются в stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        eprintln!("{}", format_notice(&notice));
    }
}

pub fn format_notice(notice: &Notice) -> String {
    let marker = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Info => "info",
        NoticeLevel::Error => "error",
    };
    format!("[{marker}] {}", notice.message)
}

pub fn print_user(title: &str, user: &User) {
    println!("{title}");
    println!("  id: {}", user.id);
    println!("  username: {}", user.username);
    println!("  name: {}", user.display_name());
    if let Some(kind) = &user.kind {
        println!("  type: {kind}");
    }
}

pub fn print_page_meta(what: &str, meta: &PageMeta, shown: usize) {
    println!(
        "{what}: {shown} (page={}/{}, per_page={}, total={})",
        meta.current_page, meta.last_page, meta.per_page, meta.total
    );
}

pub fn print_book(title: &str, book: &Book, asset_origin: &str) {
    println!("{title}");
    println!("id: {}", book.id);
    println!("slug: {}", book.slug);
    println!("title: {}", book.title);
    println!("isbn: {}", book.isbn);
    if let Some(price) = &book.price {
        println!("price: {}", price_label(price.amount, &price.formatted));
    }
    if let Some(year) = book.publish_year {
        println!("publish_year: {year}");
    }
    println!("stock: {}", book.effective_stock());
    if let Some(category) = &book.category {
        println!("category: {}", category.name);
    }
    if let Some(owner) = &book.owner {
        println!("owner: {}", owner.display_name());
    }
    if !book.authors.is_empty() {
        let names: Vec<&str> = book.authors.iter().map(User::display_name).collect();
        println!("authors: {}", names.join(", "));
    }
    if let Some(status) = &book.status {
        println!("status: {}", status.label);
    }
    println!("cover: {}", book_cover_url(book, asset_origin));
}

pub fn print_book_line(book: &Book) {
    let price = book
        .price
        .as_ref()
        .map(|price| price_label(price.amount, &price.formatted))
        .unwrap_or_else(|| "-".to_string());
    println!("- [{}] {} ({price}, stock={})", book.slug, book.title, book.effective_stock());
}

pub fn print_category(title: &str, category: &Category) {
    println!("{title}");
    println!("id: {}", category.id);
    println!("slug: {}", category.slug);
    println!("name: {}", category.name);
    if let Some(parent_id) = category.parent_id {
        println!("parent_id: {parent_id}");
    }
    print_category_tree(&category.children, 1);
}

/// Печатает дерево категорий с отступом по глубине.
pub fn print_category_tree(categories: &[Category], depth: usize) {
    for category in categories {
        println!(
            "{}- [{}] {}",
            "  ".repeat(depth),
            category.slug,
            category.name
        );
        print_category_tree(&category.children, depth + 1);
    }
}

pub fn print_author(title: &str, author: &Author, asset_origin: &str) {
    println!("{title}");
    println!("id: {}", author.id);
    println!("username: {}", author.username);
    println!("name: {}", author.full_name());
    println!("status: {}", author.status);
    if let Some(details) = &author.author_details {
        if let Some(country) = &details.country {
            println!("country: {country}");
        }
        if let Some(bio) = &details.bio {
            println!("bio: {bio}");
        }
    }
    println!("photo: {}", author_photo_url(author, asset_origin));
}

pub fn print_author_line(author: &Author) {
    println!(
        "- [{}] {} @{} ({})",
        author.id,
        author.full_name(),
        author.username,
        author.status
    );
}

pub fn print_product(title: &str, product: &Product) {
    println!("{title}");
    println!("id: {}", product.id);
    println!("title: {}", product.title);
    println!("category: {}", product.category);
    println!("price: {:.2}", product.price);
    if let Some(stock) = product.stock {
        println!("stock: {stock}");
    }
    if let Some(brand) = &product.brand {
        println!("brand: {brand}");
    }
}

pub fn print_product_line(product: &Product) {
    println!(
        "- [{}] {} ({}, {:.2})",
        product.id, product.title, product.category, product.price
    );
}

pub fn print_prices(prices: &[CategoryPrice]) {
    for price in prices {
        println!("  {}: {}", price.name, price.avg_price);
    }
}

fn price_label(amount: f64, formatted: &str) -> String {
    if formatted.trim().is_empty() {
        format!("{amount:.2}")
    } else {
        formatted.to_string()
    }
}
