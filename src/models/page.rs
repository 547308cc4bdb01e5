// src/models/page.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

// Paginação simples (page começa em 0)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PageLink {
    #[serde(default)]
    pub page: u32,

    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 1000, message = "pageSize deve estar entre 1 e 1000."))]
    pub page_size: u32,

    pub text_search: Option<String>,
}

fn default_page_size() -> u32 {
    20
}

impl PageLink {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            text_search: None,
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData<T> {
    pub data: Vec<T>,
    pub total_pages: u32,
    pub total_elements: u64,
    pub has_next: bool,
}

impl<T> PageData<T> {
    pub fn new(data: Vec<T>, total_elements: u64, link: &PageLink) -> Self {
        let size = u64::from(link.page_size.max(1));
        let total_pages = total_elements.div_ceil(size) as u32;
        Self {
            data,
            total_pages,
            total_elements,
            has_next: link.page + 1 < total_pages,
        }
    }

    /// Recorta uma página a partir de uma lista completa (usado pelo backend em memória).
    pub fn slice(all: Vec<T>, link: &PageLink) -> Self {
        let total = all.len() as u64;
        let data = all
            .into_iter()
            .skip(link.offset() as usize)
            .take(link.page_size as usize)
            .collect();
        Self::new(data, total, link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_reports_next_page() {
        let page = PageData::slice((0..45).collect::<Vec<_>>(), &PageLink::new(1, 20));
        assert_eq!(page.data.first(), Some(&20));
        assert_eq!(page.data.len(), 20);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
    }

    #[test]
    fn last_page_has_no_next() {
        let page = PageData::slice((0..45).collect::<Vec<_>>(), &PageLink::new(2, 20));
        assert_eq!(page.data.len(), 5);
        assert!(!page.has_next);
    }
}
