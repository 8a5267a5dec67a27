//! Pending orders, totally ordered by `(priority, order_id)`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use industry_core::{Order, OrderId};

use crate::config::PriorityOrder;

struct Queued {
    urgency: i64,
    order: Order,
}

impl Queued {
    fn new(order: Order, direction: PriorityOrder) -> Self {
        let priority = i64::from(order.priority);
        let urgency = match direction {
            PriorityOrder::LowestFirst => -priority,
            PriorityOrder::HighestFirst => priority,
        };
        Self { urgency, order }
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: more urgent first, then the smaller id.
    fn cmp(&self, other: &Self) -> Ordering {
        self.urgency
            .cmp(&other.urgency)
            .then_with(|| other.order.order_id.cmp(&self.order.order_id))
    }
}

/// Priority queue of orders awaiting their next stage.
pub struct OrderQueue {
    heap: BinaryHeap<Queued>,
    direction: PriorityOrder,
}

impl OrderQueue {
    #[must_use]
    pub fn new(direction: PriorityOrder) -> Self {
        Self {
            heap: BinaryHeap::new(),
            direction,
        }
    }

    pub fn push(&mut self, order: Order) {
        self.heap.push(Queued::new(order, self.direction));
    }

    /// Remove the most urgent order.
    pub fn pop(&mut self) -> Option<Order> {
        self.heap.pop().map(|q| q.order)
    }

    /// Remove the most urgent order satisfying `eligible`, leaving the
    /// skipped ones queued.
    pub fn pop_first_matching(&mut self, mut eligible: impl FnMut(&Order) -> bool) -> Option<Order> {
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(queued) = self.heap.pop() {
            if eligible(&queued.order) {
                found = Some(queued.order);
                break;
            }
            skipped.push(queued);
        }
        self.heap.extend(skipped);
        found
    }

    #[must_use]
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.heap.iter().any(|q| q.order.order_id == order_id)
    }

    #[must_use]
    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.heap
            .iter()
            .map(|q| &q.order)
            .find(|o| o.order_id == order_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Queued ids in the order they would be served.
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<OrderId> {
        let mut queued: Vec<&Queued> = self.heap.iter().collect();
        queued.sort_by(|a, b| b.cmp(a));
        queued.iter().map(|q| q.order.order_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use industry_core::Operation;
    use proptest::prelude::*;

    fn order(priority: i32, order_id: OrderId) -> Order {
        Order::new(priority, order_id, vec![Operation::Drill], vec![1])
    }

    fn queue_of(direction: PriorityOrder, orders: &[(i32, OrderId)]) -> OrderQueue {
        let mut queue = OrderQueue::new(direction);
        for (priority, id) in orders {
            queue.push(order(*priority, *id));
        }
        queue
    }

    #[test]
    fn should_serve_lowest_priority_value_first() {
        let queue = queue_of(PriorityOrder::LowestFirst, &[(3, 1), (0, 2), (1, 3)]);
        assert_eq!(queue.ordered_ids(), vec![2, 3, 1]);
    }

    #[test]
    fn should_serve_highest_priority_value_first() {
        let queue = queue_of(PriorityOrder::HighestFirst, &[(3, 1), (0, 2), (1, 3)]);
        assert_eq!(queue.ordered_ids(), vec![1, 3, 2]);
    }

    #[test]
    fn should_break_ties_by_smaller_id_in_both_directions() {
        for direction in [PriorityOrder::LowestFirst, PriorityOrder::HighestFirst] {
            let mut queue = queue_of(direction, &[(1, 9), (1, 4), (1, 6)]);
            assert_eq!(queue.pop().map(|o| o.order_id), Some(4));
            assert_eq!(queue.pop().map(|o| o.order_id), Some(6));
            assert_eq!(queue.pop().map(|o| o.order_id), Some(9));
            assert!(queue.pop().is_none());
        }
    }

    #[test]
    fn should_skip_ineligible_orders_without_losing_them() {
        let mut queue = queue_of(PriorityOrder::LowestFirst, &[(0, 1), (1, 2), (2, 3)]);
        let picked = queue.pop_first_matching(|o| o.order_id == 2);
        assert_eq!(picked.map(|o| o.order_id), Some(2));
        assert_eq!(queue.ordered_ids(), vec![1, 3]);

        assert!(queue.pop_first_matching(|_| false).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn should_find_queued_orders_by_id() {
        let queue = queue_of(PriorityOrder::LowestFirst, &[(0, 7)]);
        assert!(queue.contains(7));
        assert_eq!(queue.get(7).map(|o| o.priority), Some(0));
        assert!(queue.get(8).is_none());
    }

    proptest! {
        #[test]
        fn pops_in_total_order(entries in prop::collection::vec((-5i32..5, 0u64..1000), 1..40)) {
            let mut unique = entries.clone();
            unique.sort_by_key(|(_, id)| *id);
            unique.dedup_by_key(|(_, id)| *id);

            let mut queue = queue_of(PriorityOrder::LowestFirst, &unique);
            let mut last: Option<(i32, OrderId)> = None;
            while let Some(next) = queue.pop() {
                let key = (next.priority, next.order_id);
                if let Some(previous) = last {
                    prop_assert!(previous < key);
                }
                last = Some(key);
            }
        }
    }
}
