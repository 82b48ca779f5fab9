//! State module for tracking crawl progress
//!
//! Progress is checkpointed at two granularities:
//!
//! - `CategoryState`: which listing page a category resumes from, and whether
//!   the category is finished
//! - `ProductState`: whether every row of one product was written
//!
//! Both are keyed by site and crawl date so a new date starts from scratch
//! while a re-run of the same date resumes.

mod category_state;
mod product_state;

// Re-export main types
pub use category_state::{CategoryPhase, CategoryState};
pub use product_state::ProductState;

/// Makes a category name safe for storage keys and file names
///
/// `/`, `>` and `:` are replaced with `_`; these show up in breadcrumb-style
/// category names such as `Outdoor > Tents`.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '>' | ':' | '\\' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Outdoor>Tents"), "Outdoor_Tents");
        assert_eq!(sanitize_name("Tools/Knives: Folding"), "Tools_Knives_ Folding");
        assert_eq!(sanitize_name(" Chairs "), "Chairs");
    }
}
