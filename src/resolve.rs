//! Article extraction from free-form user input.

use crate::error::FetchError;
use crate::types::ProductId;
use once_cell::sync::Lazy;
use regex::Regex;

static CATALOG_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"catalog/(\d+)/").expect("valid catalog pattern"));

/// Resolves a product article from either a raw article or a catalog URL.
///
/// # Example
///
/// ```
/// use wbimg::resolve_product_id;
///
/// let id = resolve_product_id("https://www.wildberries.ru/catalog/7654321/detail.aspx").unwrap();
/// assert_eq!(id.as_str(), "7654321");
/// ```
pub fn resolve_product_id(input: &str) -> Result<ProductId, FetchError> {
    let input = input.trim();

    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return ProductId::parse(input);
    }

    if let Some(digits) = CATALOG_PATH.captures(input).and_then(|c| c.get(1)) {
        return ProductId::parse(digits.as_str());
    }

    Err(FetchError::InvalidInput(format!(
        "expected an article number or a catalog link containing 'catalog/<article>/', got '{}'",
        input
    )))
}
