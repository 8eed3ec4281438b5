use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>) -> Self {
        let total = data.len() as u64;
        Self {
            data,
            total_count: Some(total),
            next_cursor: None,
            prev_cursor: None,
        }
    }
}

/// Cursor-paginated query data: the shape of every list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfiniteData<T> {
    pub pages: Vec<Page<T>>,
    #[serde(default)]
    pub page_params: Vec<Value>,
}

impl<T> InfiniteData<T> {
    /// First page holding exactly one item, used when nothing was cached yet.
    pub fn single(item: T) -> Self {
        Self {
            pages: vec![Page::new(vec![item])],
            page_params: Vec::new(),
        }
    }

    /// Insert at the top of the first page.
    pub fn prepend(&mut self, item: T) {
        match self.pages.first_mut() {
            Some(first) => first.data.insert(0, item),
            None => self.pages.push(Page::new(vec![item])),
        }
    }

    /// Insert at the end of the last page.
    pub fn append(&mut self, item: T) {
        match self.pages.last_mut() {
            Some(last) => last.data.push(item),
            None => self.pages.push(Page::new(vec![item])),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.data.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.data.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for page in &mut self.pages {
            page.data.retain(&mut keep);
        }
    }
}
