//! Данные для сводки на главной панели.

use serde::Serialize;

use crate::models::{Author, Book, Paginated, Product};

/// Сколько категорий показывает диаграмма.
pub const CHART_CATEGORIES: usize = 5;
/// Сколько последних книг показывает сводка.
pub const RECENT_BOOKS: usize = 5;

/// Запись с ценой и категорией.
pub trait Priced {
    /// Название категории для группировки.
    fn category_label(&self) -> String;
    /// Цена.
    fn price_amount(&self) -> f64;
}

impl Priced for Product {
    fn category_label(&self) -> String {
        self.category.clone()
    }

    fn price_amount(&self) -> f64 {
        self.price
    }
}

impl Priced for Book {
    fn category_label(&self) -> String {
        self.category
            .as_ref()
            .map(|category| category.name.clone())
            .unwrap_or_else(|| "Uncategorized".to_string())
    }

    fn price_amount(&self) -> f64 {
        self.price.as_ref().map(|price| price.amount).unwrap_or(0.0)
    }
}

/// Средняя цена в категории.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryPrice {
    /// Категория.
    pub name: String,
    /// Средняя цена, округлённая до целого.
    pub avg_price: i64,
}

/// Средняя цена по категориям: первые [`CHART_CATEGORIES`] категорий в
/// порядке первого появления.
pub fn average_price_by_category<T: Priced>(items: &[T]) -> Vec<CategoryPrice> {
    let mut totals: Vec<(String, f64, u32)> = Vec::new();
    for item in items {
        let label = item.category_label();
        match totals.iter_mut().find(|(name, _, _)| *name == label) {
            Some((_, total, count)) => {
                *total += item.price_amount();
                *count += 1;
            }
            None => totals.push((label, item.price_amount(), 1)),
        }
    }

    totals
        .into_iter()
        .take(CHART_CATEGORIES)
        .map(|(name, total, count)| CategoryPrice {
            name,
            avg_price: (total / f64::from(count)).round() as i64,
        })
        .collect()
}

/// Сводка главной панели.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    /// Всего книг.
    pub books_total: u64,
    /// Всего авторов.
    pub authors_total: u64,
    /// Активных авторов на загруженной странице.
    pub active_authors: usize,
    /// Последние книги.
    pub recent_books: Vec<String>,
    /// Средние цены по категориям.
    pub price_by_category: Vec<CategoryPrice>,
}

impl Overview {
    /// Строит сводку по загруженным страницам книг и авторов.
    pub fn from_pages(books: &Paginated<Book>, authors: &Paginated<Author>) -> Self {
        Self {
            books_total: books.meta.total.max(books.data.len() as u64),
            authors_total: authors.meta.total.max(authors.data.len() as u64),
            active_authors: authors
                .data
                .iter()
                .filter(|author| author.status == "active")
                .count(),
            recent_books: books
                .data
                .iter()
                .take(RECENT_BOOKS)
                .map(|book| book.title.clone())
                .collect(),
            price_by_category: average_price_by_category(&books.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageMeta;

    fn product(category: &str, price: f64) -> Product {
        Product {
            id: 1,
            title: "p".to_string(),
            description: None,
            category: category.to_string(),
            price,
            discount_percentage: None,
            rating: None,
            stock: None,
            brand: None,
            thumbnail: None,
        }
    }

    #[test]
    fn averages_keep_first_seen_order_and_round() {
        let products = vec![
            product("phones", 10.0),
            product("laptops", 1000.0),
            product("phones", 15.0),
            product("laptops", 1001.0),
        ];
        let chart = average_price_by_category(&products);
        assert_eq!(
            chart,
            vec![
                CategoryPrice {
                    name: "phones".to_string(),
                    avg_price: 13,
                },
                CategoryPrice {
                    name: "laptops".to_string(),
                    avg_price: 1001,
                },
            ]
        );
    }

    #[test]
    fn chart_is_limited_to_five_categories() {
        let products: Vec<Product> = (0..8).map(|i| product(&format!("c{i}"), 1.0)).collect();
        let chart = average_price_by_category(&products);
        assert_eq!(chart.len(), CHART_CATEGORIES);
        assert_eq!(chart[4].name, "c4");
    }

    #[test]
    fn overview_uses_server_totals() {
        let books: Paginated<Book> = serde_json::from_value(serde_json::json!({
            "data": [
                {"id": 1, "title": "Dune", "slug": "dune", "price": {"amount": 20.0},
                 "category": {"id": 1, "name": "Sci-Fi", "slug": "sci-fi"}},
                {"id": 2, "title": "Emma", "slug": "emma"}
            ],
            "meta": {"current_page": 1, "last_page": 3, "per_page": 2, "total": 6}
        }))
        .expect("books should parse");
        let authors = Paginated::<Author> {
            data: vec![],
            meta: PageMeta::default(),
        };

        let overview = Overview::from_pages(&books, &authors);
        assert_eq!(overview.books_total, 6);
        assert_eq!(overview.authors_total, 0);
        assert_eq!(overview.recent_books, vec!["Dune", "Emma"]);
        assert_eq!(overview.price_by_category[0].name, "Sci-Fi");
        assert_eq!(overview.price_by_category[1].name, "Uncategorized");
    }
}
