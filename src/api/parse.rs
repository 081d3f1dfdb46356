//! Payload decoding for the upstream JSON API
//!
//! The upstream API is loosely typed: identifiers arrive as numbers or
//! strings, and optional objects are sometimes `null`, sometimes absent.
//! These helpers walk `serde_json::Value`s instead of deriving strict types.

use crate::api::{ApiError, Category, ListingItem, ListingPage, ReviewPage};
use serde_json::Value;
use std::collections::HashSet;

/// Extracts an identifier that may be a JSON string or number
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_category_node(node: &Value) -> Option<Category> {
    let id = id_string(node.get("id"))?;
    let name = node
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let children = node
        .get("child")
        .and_then(Value::as_array)
        .map(|nodes| nodes.iter().filter_map(parse_category_node).collect())
        .unwrap_or_default();

    Some(Category { id, name, children })
}

/// Parses the category tree from the home payload's `cate_menu`
///
/// Nodes without an id are dropped together with their subtree.
pub fn parse_categories(url: &str, home: &Value) -> Result<Vec<Category>, ApiError> {
    let menu = home
        .get("cate_menu")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Malformed {
            url: url.to_string(),
            message: "missing cate_menu array".to_string(),
        })?;

    Ok(menu.iter().filter_map(parse_category_node).collect())
}

/// Flattens a category tree into its leaves, in tree order
///
/// Any category whose name is in `excluded` is skipped with its subtree.
pub fn collect_leaf_categories(categories: &[Category], excluded: &[String]) -> Vec<Category> {
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    let mut leaves = Vec::new();
    let mut stack: Vec<&Category> = categories.iter().rev().collect();

    while let Some(category) = stack.pop() {
        if excluded.contains(category.name.as_str()) {
            continue;
        }

        if category.is_leaf() {
            leaves.push(category.clone());
        } else {
            stack.extend(category.children.iter().rev());
        }
    }

    leaves
}

/// Parses one listing page
///
/// The listing endpoint has no page count; a page with items means the next
/// page may have more.
pub fn parse_listing_page(url: &str, body: &Value) -> Result<ListingPage, ApiError> {
    let listing = match body.get("listing") {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Null) | None => &[],
        Some(_) => {
            return Err(ApiError::Malformed {
                url: url.to_string(),
                message: "listing is not an array".to_string(),
            })
        }
    };

    let items: Vec<ListingItem> = listing
        .iter()
        .filter_map(|item| {
            let product_id = id_string(item.get("id"))?;
            let brand = item.get("brand").filter(|b| b.is_object());
            Some(ListingItem {
                product_id,
                brand_id: brand.and_then(|b| id_string(b.get("id"))),
                brand_name: brand
                    .and_then(|b| b.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect();

    Ok(ListingPage {
        has_more: !listing.is_empty(),
        items,
    })
}

/// Parses one review page
///
/// `data.total` is the product's review count. The page size comes from
/// `data.size` when the API reports it, otherwise from `default_page_size`.
pub fn parse_review_page(
    url: &str,
    body: Value,
    default_page_size: u32,
) -> Result<ReviewPage, ApiError> {
    let data = body
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| ApiError::Malformed {
            url: url.to_string(),
            message: "missing data object".to_string(),
        })?;

    let total = match data.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    let page_size = data
        .get("size")
        .and_then(Value::as_u64)
        .filter(|size| *size > 0)
        .map(|size| size as u32)
        .unwrap_or(default_page_size);

    Ok(ReviewPage {
        payload: body,
        total,
        page_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(id: &str, name: &str) -> Category {
        Category {
            id: id.to_string(),
            name: name.to_string(),
            children: vec![],
        }
    }

    #[test]
    fn test_parse_categories() {
        let home = json!({
            "cate_menu": [
                {"id": 1, "name": "Skincare", "child": [
                    {"id": "11", "name": "Cleansers", "child": []},
                    {"id": 12, "name": "Toners"}
                ]},
                {"name": "No id"},
                {"id": 2, "name": "Makeup", "child": null}
            ]
        });

        let categories = parse_categories("home", &home).unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].id, "1");
        assert_eq!(categories[0].children.len(), 2);
        assert_eq!(categories[0].children[0].id, "11");
        assert!(categories[1].is_leaf());
    }

    #[test]
    fn test_parse_categories_missing_menu() {
        let result = parse_categories("home", &json!({"banner": []}));
        assert!(matches!(result, Err(ApiError::Malformed { .. })));
    }

    #[test]
    fn test_collect_leaf_categories() {
        let tree = vec![
            Category {
                id: "1".to_string(),
                name: "Skincare".to_string(),
                children: vec![
                    leaf("11", "Cleansers"),
                    Category {
                        id: "12".to_string(),
                        name: "Serums".to_string(),
                        children: vec![leaf("121", "Vitamin C")],
                    },
                ],
            },
            leaf("2", "Makeup"),
            Category {
                id: "3".to_string(),
                name: "High-End".to_string(),
                children: vec![leaf("31", "Luxury")],
            },
        ];

        let leaves = collect_leaf_categories(&tree, &["High-End".to_string()]);
        let ids: Vec<&str> = leaves.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["11", "121", "2"]);

        let all = collect_leaf_categories(&tree, &[]);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_parse_listing_page() {
        let body = json!({
            "listing": [
                {"id": 100, "brand": {"id": 7, "name": "CeraVe"}},
                {"id": "101", "brand": null},
                {"name": "no id"}
            ]
        });

        let page = parse_listing_page("listing", &body).unwrap();
        assert!(page.has_more);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].product_id, "100");
        assert_eq!(page.items[0].brand_id.as_deref(), Some("7"));
        assert_eq!(page.items[0].brand_name.as_deref(), Some("CeraVe"));
        assert_eq!(page.items[1].brand_id, None);
    }

    #[test]
    fn test_parse_empty_listing_page() {
        let page = parse_listing_page("listing", &json!({"listing": []})).unwrap();
        assert!(!page.has_more);
        assert!(page.items.is_empty());

        let page = parse_listing_page("listing", &json!({})).unwrap();
        assert!(!page.has_more);

        let result = parse_listing_page("listing", &json!({"listing": "oops"}));
        assert!(matches!(result, Err(ApiError::Malformed { .. })));
    }

    #[test]
    fn test_parse_review_page() {
        let body = json!({"status": 1, "data": {"total": 45, "reviews": [{"id": 1}]}});
        let page = parse_review_page("reviews", body.clone(), 5).unwrap();
        assert_eq!(page.total, 45);
        assert_eq!(page.page_size, 5);
        assert_eq!(page.payload, body);

        let body = json!({"data": {"total": "12", "size": 10, "reviews": []}});
        let page = parse_review_page("reviews", body, 5).unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.page_size, 10);
    }

    #[test]
    fn test_parse_review_page_without_total() {
        let page = parse_review_page("reviews", json!({"data": {"reviews": []}}), 5).unwrap();
        assert_eq!(page.total, 0);

        let result = parse_review_page("reviews", json!({"data": []}), 5);
        assert!(matches!(result, Err(ApiError::Malformed { .. })));
    }
}
