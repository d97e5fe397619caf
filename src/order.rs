//! Order Allocation
//!
//! Display positions for new and moved items. Allocation is monotonic, not
//! dense: gaps left by failed or concurrent creates are closed by the
//! dense-reindex drain hook, never here.

use crate::correlation::ItemId;
use crate::models::{Item, OrderAssignment};

/// Position for an item appended after `items`: `max(order_index) + 1`, or 1 when empty
pub fn next_order(items: &[Item]) -> i64 {
    items.iter().map(|item| item.order_index).max().unwrap_or(0) + 1
}

/// Dense `0..n-1` mapping of `items` in their current display order.
///
/// Items still carrying a temporary id are skipped: the store has no row to
/// renumber for them yet.
pub fn dense_assignments(items: &[Item]) -> Vec<OrderAssignment> {
    items
        .iter()
        .filter(|item| !item.id.is_temporary())
        .enumerate()
        .map(|(position, item)| OrderAssignment {
            id: item.id.clone(),
            order_index: position as i64,
        })
        .collect()
}

/// Whether the persisted items already sit at `0..n-1`
pub fn is_dense(items: &[Item]) -> bool {
    items
        .iter()
        .filter(|item| !item.id.is_temporary())
        .enumerate()
        .all(|(position, item)| item.order_index == position as i64)
}

/// Move `id` to `to_index` (clamped) and renumber every item densely.
///
/// Returns `None` when `id` is not in `items`.
pub fn move_to(items: &[Item], id: &ItemId, to_index: usize) -> Option<Vec<Item>> {
    let from = items.iter().position(|item| &item.id == id)?;
    let mut reordered = items.to_vec();
    let moved = reordered.remove(from);
    let to = to_index.min(reordered.len());
    reordered.insert(to, moved);

    for (position, item) in reordered.iter_mut().enumerate() {
        item.order_index = position as i64;
    }
    Some(reordered)
}
