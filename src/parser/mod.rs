pub mod embedded;
pub mod fields;
pub mod transform;

use crate::error::ExtractError;
use transform::ResultTable;

/// Two-stage pipeline: page markup → raw items → normalized table.
pub fn process_page(markup: &str) -> Result<ResultTable, ExtractError> {
    let items = embedded::extract_items(markup)?;
    Ok(transform::transform(&items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_page_to_table() {
        let html = std::fs::read_to_string("tests/fixtures/category_page.html").unwrap();
        let table = process_page(&html).unwrap();
        assert_eq!(table.len(), 3);

        let pie = &table.rows[0];
        assert_eq!(pie.price, Some(5.98));
        assert_eq!(pie.description.as_deref(), Some("Classic pumpkin pieServes 8Net wt 24 oz"));
        assert_eq!(pie.weight, Some(24.0));
        assert_eq!(pie.rating, Some(4.4));
        assert_eq!(pie.num_reviews, 312);

        let donuts = &table.rows[1];
        assert_eq!(donuts.price, Some(1004.5));
        assert_eq!(donuts.num_reviews, 0);
        assert_eq!(donuts.rating, None);

        let cake = &table.rows[2];
        assert_eq!(cake.title.as_deref(), Some("Caramel Apple Cake"));
        assert_eq!(cake.description, None);
        assert_eq!(cake.weight, None);
    }

    #[test]
    fn page_without_payload() {
        let html = std::fs::read_to_string("tests/fixtures/no_payload.html").unwrap();
        assert!(matches!(process_page(&html), Err(ExtractError::NoEmbeddedData)));
    }
}
