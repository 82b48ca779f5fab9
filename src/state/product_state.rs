/// Completion record of one product on one crawl date
///
/// `done` is set only after every row of the product (one per option) was
/// flushed to its CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductState {
    pub site: String,
    /// Sanitized category name; `CUSTOM_URLS` in URL list mode
    pub category_name: String,
    pub date: String,
    pub product_id: String,
    pub done: bool,
}

impl ProductState {
    pub fn new(site: &str, product_id: &str, category_name: &str, date: &str) -> Self {
        Self {
            site: site.to_string(),
            category_name: super::sanitize_name(category_name),
            date: date.to_string(),
            product_id: product_id.to_string(),
            done: false,
        }
    }

    pub fn finish(&mut self) {
        self.done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_product_state() {
        let mut state = ProductState::new("acorn", "P-1001", "Camp:Stoves", "20240105");
        assert_eq!(state.category_name, "Camp_Stoves");
        assert!(!state.done);

        state.finish();
        assert!(state.done);
    }
}
