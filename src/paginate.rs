use std::marker::PhantomData;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::client::{HttpClient, Transport};
use crate::error::{Result, Stage};

pub const DEFAULT_PAGE_SIZE: u64 = 5000;

/// Envelope of one page of a dataset.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct Page<R> {
    #[serde(default)]
    pub total: u64,
    #[serde(default = "Vec::new")]
    pub records: Vec<R>,
}

/// Records of one page, with where they sit in the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<R> {
    pub offset: u64,
    /// Dataset size declared by the first page.
    pub total: u64,
    pub records: Vec<R>,
}

/// Walks an offset/limit dataset one page per `next()`.
///
/// Stops once the next offset would reach the declared total, when a page
/// comes back empty, or after the first error (which is yielded).
pub struct Paginator<'a, T, R> {
    client: &'a HttpClient<T>,
    endpoint: String,
    params: Vec<(String, String)>,
    limit: u64,
    offset: u64,
    total: Option<u64>,
    done: bool,
    _record: PhantomData<R>,
}

impl<'a, T: Transport, R: DeserializeOwned> Paginator<'a, T, R> {
    pub fn new(
        client: &'a HttpClient<T>,
        endpoint: impl Into<String>,
        params: Vec<(String, String)>,
        limit: u64,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            params,
            limit: limit.max(1),
            offset: 0,
            total: None,
            done: false,
            _record: PhantomData,
        }
    }

    fn query(&self) -> Vec<(String, String)> {
        let mut query = self.params.clone();
        query.push(("limit".to_string(), self.limit.to_string()));
        query.push(("offset".to_string(), self.offset.to_string()));
        query
    }
}

impl<T: Transport, R: DeserializeOwned> Iterator for Paginator<'_, T, R> {
    type Item = Result<Batch<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let page: Page<R> = match self.client.get_with_query(&self.endpoint, &self.query()) {
            Ok(page) => page,
            Err(e) => {
                self.done = true;
                return Some(Err(e.in_stage(Stage::Pagination)));
            }
        };

        let total = *self.total.get_or_insert(page.total);
        if page.records.is_empty() {
            self.done = true;
            return None;
        }

        let offset = self.offset;
        self.offset += self.limit;
        if self.offset >= total {
            self.done = true;
        }

        Some(Ok(Batch {
            offset,
            total,
            records: page.records,
        }))
    }
}
