// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FAQ lookup by keyword category.
//!
//! Categories are tested in declaration order and the first one with any
//! keyword contained in the message wins. A more specific keyword in a later
//! category never beats an earlier category.

use concierge_config::model::FaqCategory;
use tracing::trace;

/// A matched FAQ category and its canned reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaqMatch<'a> {
    pub category: &'a str,
    pub reply: &'a str,
}

#[derive(Debug, Clone)]
struct Category {
    name: String,
    keywords: Vec<String>,
    reply: String,
}

/// Ordered keyword table built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct FaqMatcher {
    categories: Vec<Category>,
}

impl FaqMatcher {
    /// Build a matcher; keywords are lowercased and blank ones dropped.
    pub fn from_categories(categories: &[FaqCategory]) -> Self {
        let categories = categories
            .iter()
            .map(|c| Category {
                name: c.name.clone(),
                keywords: c
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
                reply: c.reply.clone(),
            })
            .collect();
        Self { categories }
    }

    /// First category whose keyword appears in `message`, case-insensitively.
    pub fn lookup(&self, message: &str) -> Option<FaqMatch<'_>> {
        let lower = message.to_lowercase();
        let hit = self
            .categories
            .iter()
            .find(|c| c.keywords.iter().any(|k| lower.contains(k.as_str())))?;
        trace!(category = %hit.name, "faq match");
        Some(FaqMatch {
            category: &hit.name,
            reply: &hit.reply,
        })
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
