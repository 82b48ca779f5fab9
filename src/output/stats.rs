//! Statistics from the checkpoint store
//!
//! This module loads and displays how far the crawl of a date got,
//! category by category.

use crate::storage::{StateStatistics, StateStore};
use crate::HarvestError;

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The checkpoint store to query
/// * `site` - Site name
/// * `date` - Crawl date stamp
///
/// # Returns
///
/// * `Ok(StateStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn StateStore,
    site: &str,
    date: &str,
) -> Result<StateStatistics, HarvestError> {
    Ok(storage.statistics(site, date)?)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(site: &str, date: &str, stats: &StateStatistics) {
    println!("=== Crawl Statistics: {} ({}) ===\n", site, date);

    println!("Overview:");
    println!(
        "  Categories: {} / {} done",
        stats.categories_done, stats.categories_total
    );
    println!("  Pages checkpointed: {}", stats.pages_done);
    println!(
        "  Products: {} / {} done",
        stats.products_done, stats.products_total
    );
    println!();

    if !stats.categories.is_empty() {
        println!("Categories:");
        for (name, pageno, done) in &stats.categories {
            if *done {
                println!("  {}: done", name);
            } else {
                println!("  {}: at page {}", name, pageno);
            }
        }
        println!();
    }

    println!(
        "Completion: {:.1}% of categories, {:.1}% of products seen so far",
        percentage(stats.categories_done, stats.categories_total),
        percentage(stats.products_done, stats.products_total)
    );
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CategoryState, ProductState};
    use crate::storage::SqliteStateStore;

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }

    #[test]
    fn test_load_statistics_counts_progress() {
        let storage = SqliteStateStore::new_in_memory().unwrap();

        let mut tents = CategoryState::new("shop", "Tents", "20240105", 1);
        tents.advance();
        storage.save_category_state(&tents).unwrap();

        let mut bags = CategoryState::new("shop", "Bags", "20240105", 1);
        bags.finish();
        storage.save_category_state(&bags).unwrap();

        let mut product = ProductState::new("shop", "P-1", "Tents", "20240105");
        product.finish();
        storage.save_product_state(&product).unwrap();
        storage
            .load_or_create_product_state("shop", "P-2", "Tents", "20240105")
            .unwrap();

        let stats = load_statistics(&storage, "shop", "20240105").unwrap();
        assert_eq!(stats.categories_total, 2);
        assert_eq!(stats.categories_done, 1);
        assert_eq!(stats.products_total, 2);
        assert_eq!(stats.products_done, 1);

        // Other dates are not counted
        let empty = load_statistics(&storage, "shop", "20240106").unwrap();
        assert_eq!(empty, StateStatistics::default());
    }
}
