// ABOUTME: Keyset pagination over id-ordered listings
// ABOUTME: Page size defaults to 10 and is clamped to 50; the page token is the last-seen id
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use serde::{Deserialize, Serialize};

/// Page size used when the caller sends 0 or nothing
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upper bound on page size
pub const MAX_PAGE_SIZE: u32 = 50;

/// Caller pagination parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    /// Requested size
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Last id of the previous page
    #[serde(default)]
    pub page_token: Option<String>,
}

impl PageRequest {
    /// First page of `size`
    #[must_use]
    pub const fn first(size: u32) -> Self {
        Self {
            page_size: Some(size),
            page_token: None,
        }
    }

    /// Page of `size` after `token`
    #[must_use]
    pub fn after(size: u32, token: impl Into<String>) -> Self {
        Self {
            page_size: Some(size),
            page_token: Some(token.into()),
        }
    }

    /// Effective page size
    #[must_use]
    pub fn limit(&self) -> u32 {
        match self.page_size {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(size) => size.min(MAX_PAGE_SIZE),
        }
    }

    /// Rows a store should fetch to know whether another page exists
    #[must_use]
    pub fn fetch_limit(&self) -> i64 {
        i64::from(self.limit()) + 1
    }

    /// Exclusive lower bound on id; blank tokens mean the first page
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.page_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in id order
    pub items: Vec<T>,
    /// Token for the next page, absent on the last page
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Build a page from up to `limit + 1` id-ordered rows
    pub fn from_rows(mut rows: Vec<T>, request: &PageRequest, id_of: impl Fn(&T) -> &str) -> Self {
        let limit = request.limit() as usize;
        let next_page_token = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().map(|last| id_of(last).to_owned())
        } else {
            None
        };
        Self {
            items: rows,
            next_page_token,
        }
    }

    /// Transform items, keeping the token
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_token: self.next_page_token,
        }
    }
}
