//! Параметры списка: пагинация, сортировка, фильтры.

use std::collections::BTreeMap;

/// Кортеж параметров, управляющий загрузкой списка.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListParams {
    /// Страница (с 1).
    pub page: u32,
    /// Размер страницы.
    pub per_page: u32,
    /// Ключ сортировки, например `-created_at`.
    pub sort: Option<String>,
    /// Фильтры: текстовые поля и идентификаторы связей.
    pub filters: BTreeMap<String, String>,
    /// Связи для подгрузки (`include`).
    pub include: Vec<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self::new(15)
    }
}

impl ListParams {
    /// Первая страница заданного размера без фильтров.
    pub fn new(per_page: u32) -> Self {
        Self {
            page: 1,
            per_page: per_page.max(1),
            sort: None,
            filters: BTreeMap::new(),
            include: Vec::new(),
        }
    }

    /// Задаёт сортировку.
    pub fn sorted_by(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Задаёт фильтр.
    pub fn filtered(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Добавляет связь для подгрузки.
    pub fn including(mut self, relation: impl Into<String>) -> Self {
        self.include.push(relation.into());
        self
    }

    /// Значение фильтра.
    pub fn filter(&self, field: &str) -> Option<&str> {
        self.filters.get(field).map(String::as_str)
    }

    /// Query-параметры: `page`, `per_page`, `sort`, `filter[field]`, `include`.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.to_query_with(|field| format!("filter[{field}]"))
    }

    /// Query-параметры с собственным именованием ключей фильтров.
    pub fn to_query_with<F>(&self, filter_key: F) -> Vec<(String, String)>
    where
        F: Fn(&str) -> String,
    {
        let mut query = vec![
            ("page".to_string(), self.page.to_string()),
            ("per_page".to_string(), self.per_page.to_string()),
        ];
        if let Some(sort) = &self.sort {
            query.push(("sort".to_string(), sort.clone()));
        }
        for (field, value) in &self.filters {
            query.push((filter_key(field), value.clone()));
        }
        if !self.include.is_empty() {
            query.push(("include".to_string(), self.include.join(",")));
        }
        query
    }

    /// Ключ кэша: закодированный кортеж параметров.
    pub fn cache_key(&self) -> String {
        self.to_query()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Применяет изменение. Если фактически изменился хотя бы один фильтр,
    /// страница сбрасывается на 1. Страница ограничивается `[1, last_page]`,
    /// если последняя страница уже известна.
    ///
    /// Возвращает `true`, если изменился какой-либо фильтр.
    pub fn apply(&mut self, update: ParamsUpdate, last_page: Option<u32>) -> bool {
        let mut filters_changed = false;
        for (field, value) in update.filters {
            let value = value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
            let changed = match value {
                Some(value) => {
                    let previous = self.filters.insert(field, value.clone());
                    previous.as_deref() != Some(value.as_str())
                }
                None => self.filters.remove(&field).is_some(),
            };
            filters_changed |= changed;
        }

        if let Some(per_page) = update.per_page {
            self.per_page = per_page.max(1);
        }
        if let Some(sort) = update.sort {
            self.sort = sort;
        }
        if let Some(include) = update.include {
            self.include = include;
        }
        if let Some(page) = update.page {
            self.page = page;
        }

        if filters_changed {
            self.page = 1;
        }
        self.page = clamp_page(self.page, last_page);
        filters_changed
    }
}

fn clamp_page(page: u32, last_page: Option<u32>) -> u32 {
    let page = page.max(1);
    match last_page {
        Some(last) => page.min(last.max(1)),
        None => page,
    }
}

/// Частичное изменение параметров списка.
///
/// Пустая строка фильтра эквивалентна его удалению.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamsUpdate {
    page: Option<u32>,
    per_page: Option<u32>,
    sort: Option<Option<String>>,
    include: Option<Vec<String>>,
    filters: Vec<(String, Option<String>)>,
}

impl ParamsUpdate {
    /// Пустое изменение.
    pub fn new() -> Self {
        Self::default()
    }

    /// Переход на страницу.
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Новый размер страницы.
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    /// Новая сортировка.
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(Some(sort.into()));
        self
    }

    /// Сброс сортировки.
    pub fn clear_sort(mut self) -> Self {
        self.sort = Some(None);
        self
    }

    /// Новый список связей.
    pub fn include(mut self, relations: Vec<String>) -> Self {
        self.include = Some(relations);
        self
    }

    /// Новое значение фильтра.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), Some(value.into())));
        self
    }

    /// Удаление фильтра.
    pub fn clear_filter(mut self, field: impl Into<String>) -> Self {
        self.filters.push((field.into(), None));
        self
    }
}
