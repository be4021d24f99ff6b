//! Change classification between two catalog snapshots. Pure, no side effects.

use std::collections::HashMap;

use shelfwatch_common::{AvailabilityChange, CatalogItem, ChangeSet, PriceChange};

/// Compare the previously persisted catalog against a freshly fetched one.
///
/// Output lists preserve the input order of `fresh`. Items present only in
/// `prior` are not reported: the storefront marks items unavailable rather
/// than removing them, so absence from the feed is not treated as deletion.
pub fn compare(prior: &[CatalogItem], fresh: &[CatalogItem]) -> ChangeSet {
    let by_id: HashMap<&str, &CatalogItem> =
        prior.iter().map(|i| (i.id.as_str(), i)).collect();

    let mut changes = ChangeSet::default();

    for item in fresh {
        let Some(old) = by_id.get(item.id.as_str()) else {
            changes.new_items.push(item.clone());
            continue;
        };

        let price_changed = old.price != item.price;
        let availability_changed = old.available != item.available;

        if price_changed {
            changes.price_changes.push(PriceChange {
                item_id: item.id.clone(),
                title: item.title.clone(),
                old_price: old.price,
                new_price: item.price,
            });
        }
        if availability_changed {
            changes.availability_changes.push(AvailabilityChange {
                item_id: item.id.clone(),
                title: item.title.clone(),
                was: old.available,
                now: item.available,
            });
        }
        if price_changed || availability_changed {
            changes.updated_items.push(item.clone());
        }
    }

    changes
}
