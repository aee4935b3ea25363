use mongodb::bson::{doc, oid::ObjectId, Document};
use serde::Serialize;

use super::types::{Difficulty, Recipe};

/// Recognized recipe search filters. The set is closed on purpose: a filter
/// that is not listed here cannot reach the database as a raw equality match.
#[derive(Debug, Clone, PartialEq)]
pub enum RecipeFilter {
    /// Tags intersect the given list.
    Tags(Vec<String>),
    /// Difficulty is one of the given values.
    Difficulty(Vec<Difficulty>),
    /// Exact cuisine match.
    Cuisine(String),
    /// Preparation time at most the given minutes.
    PreparationTimeMax(i64),
    /// Cooking time at most the given minutes.
    CookingTimeMax(i64),
    /// Recipes created by the given user.
    Author(ObjectId),
}

impl RecipeFilter {
    fn apply(&self, query: &mut Document) {
        match self {
            RecipeFilter::Tags(tags) => {
                query.insert("tags", doc! { "$in": tags.clone() });
            }
            RecipeFilter::Difficulty(values) => {
                let values: Vec<&str> = values.iter().map(Difficulty::as_str).collect();
                query.insert("difficulty", doc! { "$in": values });
            }
            RecipeFilter::Cuisine(cuisine) => {
                query.insert("cuisine", cuisine.clone());
            }
            RecipeFilter::PreparationTimeMax(minutes) => {
                query.insert("preparation_time", doc! { "$lte": *minutes });
            }
            RecipeFilter::CookingTimeMax(minutes) => {
                query.insert("cooking_time", doc! { "$lte": *minutes });
            }
            RecipeFilter::Author(user_id) => {
                query.insert("user_id", *user_id);
            }
        }
    }
}

/// Builds the find/count query for a text search plus filters. An empty text
/// query adds no `$text` constraint.
pub fn build_query(text: Option<&str>, filters: &[RecipeFilter]) -> Document {
    let mut query = Document::new();
    if let Some(text) = text {
        if !text.is_empty() {
            query.insert("$text", doc! { "$search": text });
        }
    }
    for filter in filters {
        filter.apply(&mut query);
    }
    query
}

/// 1-based page request. Out-of-range inputs are clamped rather than refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

impl Page {
    pub const DEFAULT_SIZE: u64 = 10;

    pub fn new(number: u64, size: u64) -> Self {
        Page {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn skip(&self) -> u64 {
        (self.number - 1) * self.size
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(1, Page::DEFAULT_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// Generic search pagination: zero matches means zero pages.
    pub fn new(page: Page, total_items: u64) -> Self {
        Pagination {
            page: page.number,
            page_size: page.size,
            total_items,
            total_pages: (total_items + page.size - 1) / page.size,
        }
    }

    /// Pagination for the recipes-by-user listing, where an empty result set
    /// still reports a single page.
    pub fn with_min_one_page(page: Page, total_items: u64) -> Self {
        let mut pagination = Pagination::new(page, total_items);
        pagination.total_pages = pagination.total_pages.max(1);
        pagination
    }
}

/// One page of recipes together with its pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedRecipes {
    pub recipes: Vec<Recipe>,
    pub pagination: Pagination,
}

impl PagedRecipes {
    pub fn empty(page: Page) -> Self {
        PagedRecipes {
            recipes: Vec::new(),
            pagination: Pagination::new(page, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_empty() {
        assert_eq!(build_query(None, &[]), Document::new());
        assert_eq!(build_query(Some(""), &[]), Document::new());
    }

    #[test]
    fn test_build_query_text_search() {
        let query = build_query(Some("tomato soup"), &[]);
        assert_eq!(
            query,
            doc! { "$text": { "$search": "tomato soup" } }
        );
    }

    #[test]
    fn test_build_query_filters() {
        let query = build_query(
            None,
            &[
                RecipeFilter::Tags(vec![String::from("vegan"), String::from("quick")]),
                RecipeFilter::Difficulty(vec![Difficulty::Easy, Difficulty::Medium]),
                RecipeFilter::Cuisine(String::from("Italian")),
                RecipeFilter::PreparationTimeMax(15),
                RecipeFilter::CookingTimeMax(30),
            ],
        );
        assert_eq!(
            query.get_document("tags").unwrap(),
            &doc! { "$in": ["vegan", "quick"] }
        );
        assert_eq!(
            query.get_document("difficulty").unwrap(),
            &doc! { "$in": ["Easy", "Medium"] }
        );
        assert_eq!(query.get_str("cuisine").unwrap(), "Italian");
        assert_eq!(
            query.get_document("preparation_time").unwrap(),
            &doc! { "$lte": 15i64 }
        );
        assert_eq!(
            query.get_document("cooking_time").unwrap(),
            &doc! { "$lte": 30i64 }
        );
    }

    #[test]
    fn test_build_query_author_is_native_id() {
        let user_id = ObjectId::new();
        let query = build_query(None, &[RecipeFilter::Author(user_id)]);
        assert_eq!(query.get_object_id("user_id").unwrap(), user_id);
    }

    #[test]
    fn test_page_skip() {
        assert_eq!(Page::new(1, 10).skip(), 0);
        assert_eq!(Page::new(3, 12).skip(), 24);
        // page 0 is clamped to 1
        assert_eq!(Page::new(0, 10).skip(), 0);
    }

    #[test]
    fn test_pagination_ceil_division() {
        let page = Page::new(1, 10);
        assert_eq!(Pagination::new(page, 25).total_pages, 3);
        assert_eq!(Pagination::new(page, 30).total_pages, 3);
        assert_eq!(Pagination::new(page, 31).total_pages, 4);
        assert_eq!(Pagination::new(page, 1).total_pages, 1);
    }

    #[test]
    fn test_pagination_zero_items_asymmetry() {
        // Generic search reports zero pages for zero matches; the by-user
        // listing reports one.
        let page = Page::new(1, 10);
        assert_eq!(Pagination::new(page, 0).total_pages, 0);
        assert_eq!(Pagination::with_min_one_page(page, 0).total_pages, 1);
        // with at least one match both agree
        assert_eq!(Pagination::with_min_one_page(page, 25).total_pages, 3);
    }
}
