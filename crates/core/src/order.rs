//! Orders, per-stage requests, and scheduler-side order tracking.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::operation::Operation;
use crate::result::Result;

/// Unique order identifier.
pub type OrderId = u64;

/// Location value meaning "the goods are still in the warehouse".
pub const WAREHOUSE: &str = "";

/// Stable, globally unique agent address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create a new address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The warehouse pseudo-address (empty string).
    #[must_use]
    pub fn warehouse() -> Self {
        Self(WAREHOUSE.to_string())
    }

    /// Whether this address denotes the warehouse.
    #[must_use]
    pub fn is_warehouse(&self) -> bool {
        self.0 == WAREHOUSE
    }

    /// Get the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_warehouse() {
            f.write_str("<warehouse>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A multi-stage manufacturing order.
///
/// `current_operation` only ever increases; the order is done once it has
/// passed the last operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub priority: i32,
    pub order_id: OrderId,
    pub operations: Vec<Operation>,
    /// Robots required to carry the goods into each stage.
    #[serde(default)]
    pub tr_counts: Vec<u32>,
    #[serde(default)]
    pub current_operation: usize,
}

impl Order {
    /// Create a fresh order positioned at its first stage.
    #[must_use]
    pub fn new(
        priority: i32,
        order_id: OrderId,
        operations: Vec<Operation>,
        tr_counts: Vec<u32>,
    ) -> Self {
        Self {
            priority,
            order_id,
            operations,
            tr_counts,
            current_operation: 0,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.current_operation >= self.operations.len()
    }

    /// The operation of the current stage, if any remain.
    #[must_use]
    pub fn current(&self) -> Option<Operation> {
        self.operations.get(self.current_operation).copied()
    }

    /// Robots required for `stage`; a missing entry means a single carrier.
    #[must_use]
    pub fn tr_count_for_stage(&self, stage: usize) -> u32 {
        self.tr_counts.get(stage).copied().unwrap_or(1).max(1)
    }

    /// Number of stages still to run.
    #[must_use]
    pub fn remaining_stages(&self) -> usize {
        self.operations.len().saturating_sub(self.current_operation)
    }

    /// Mark the current stage complete.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` when the order is already done.
    pub fn complete_stage(&mut self) -> Result<()> {
        if self.is_done() {
            return Err(Error::invalid_record(format!(
                "order {} has no stage left to complete",
                self.order_id
            )));
        }
        self.current_operation = self.current_operation.saturating_add(1);
        Ok(())
    }

    /// Encode as JSON text.
    ///
    /// # Errors
    ///
    /// Returns `JsonEncodeFailed` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::json_encode_failed(e.to_string()))
    }

    /// Decode from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `JsonParseFailed` if the text is not a valid order.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| Error::json_parse_failed(e.to_string()))
    }
}

/// The per-dispatch payload a work-cell receives (the "GoM order").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    pub priority: i32,
    pub order_id: OrderId,
    /// Where the goods currently sit; the warehouse when empty.
    pub location: Address,
    pub operation: Operation,
    pub tr_count: u32,
}

impl StageRequest {
    /// Build the request for the order's current stage, fetching from `location`.
    ///
    /// Returns `None` when the order has no stage left.
    #[must_use]
    pub fn create(order: &Order, location: &Address) -> Option<Self> {
        order.current().map(|operation| Self {
            priority: order.priority,
            order_id: order.order_id,
            location: location.clone(),
            operation,
            tr_count: order.tr_count_for_stage(order.current_operation),
        })
    }

    /// Correlation token binding request/reply exchanges to the parent order.
    #[must_use]
    pub fn correlation(&self) -> String {
        self.order_id.to_string()
    }

    /// Encode as JSON text.
    ///
    /// # Errors
    ///
    /// Returns `JsonEncodeFailed` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::json_encode_failed(e.to_string()))
    }

    /// Decode from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `JsonParseFailed` if the text is not a valid stage request.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| Error::json_parse_failed(e.to_string()))
    }
}

/// Scheduler-side tracking of an order between stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOrder {
    pub order: Order,
    /// Where the physical goods currently sit.
    pub location: Address,
    /// Cell the current stage was dispatched to, while in flight.
    pub cell: Option<Address>,
}

impl ActiveOrder {
    /// Start tracking an order whose goods are still in the warehouse.
    #[must_use]
    pub fn new(order: Order) -> Self {
        Self {
            order,
            location: Address::warehouse(),
            cell: None,
        }
    }

    /// Build the stage request for the next dispatch.
    #[must_use]
    pub fn stage_request(&self) -> Option<StageRequest> {
        StageRequest::create(&self.order, &self.location)
    }

    /// Record a completed stage performed at `new_location`.
    ///
    /// Returns whether the order is now done.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` when the order was already done.
    pub fn advance(&mut self, new_location: Address) -> Result<bool> {
        self.order.complete_stage()?;
        self.location = new_location;
        self.cell = None;
        Ok(self.order.is_done())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drill_mill() -> Order {
        Order::new(1, 7, vec![Operation::Drill, Operation::Mill], vec![1, 3])
    }

    #[test]
    fn should_start_at_first_stage() {
        let order = drill_mill();
        assert_eq!(order.current(), Some(Operation::Drill));
        assert!(!order.is_done());
        assert_eq!(order.remaining_stages(), 2);
    }

    #[test]
    fn should_be_done_after_exactly_len_completions() {
        let mut order = drill_mill();
        assert!(order.complete_stage().is_ok());
        assert!(!order.is_done());
        assert!(order.complete_stage().is_ok());
        assert!(order.is_done());
        assert!(order.complete_stage().is_err());
        assert_eq!(order.current_operation, 2);
    }

    #[test]
    fn should_treat_empty_order_as_done() {
        let order = Order::new(0, 1, Vec::new(), Vec::new());
        assert!(order.is_done());
        assert!(StageRequest::create(&order, &Address::warehouse()).is_none());
    }

    #[test]
    fn should_default_missing_tr_count_to_one() {
        let order = Order::new(1, 1, vec![Operation::Drill, Operation::Mill], vec![2]);
        assert_eq!(order.tr_count_for_stage(0), 2);
        assert_eq!(order.tr_count_for_stage(1), 1);
    }

    #[test]
    fn should_clamp_zero_tr_count_to_one() {
        let order = Order::new(1, 1, vec![Operation::Drill], vec![0]);
        assert_eq!(order.tr_count_for_stage(0), 1);
    }

    #[test]
    fn should_build_stage_request_from_current_stage() {
        let mut order = drill_mill();
        order.current_operation = 1;
        let request = StageRequest::create(&order, &Address::new("gom-3"));
        assert_eq!(
            request,
            Some(StageRequest {
                priority: 1,
                order_id: 7,
                location: Address::new("gom-3"),
                operation: Operation::Mill,
                tr_count: 3,
            })
        );
    }

    #[test]
    fn should_round_trip_order_through_json() {
        let mut order = drill_mill();
        order.current_operation = 1;
        let decoded = order.to_json().and_then(|json| Order::from_json(&json));
        assert_eq!(decoded.ok(), Some(order));
    }

    #[test]
    fn should_round_trip_stage_request_through_json() {
        let request = StageRequest {
            priority: 4,
            order_id: 99,
            location: Address::warehouse(),
            operation: Operation::CutGlass,
            tr_count: 2,
        };
        let decoded = request
            .to_json()
            .and_then(|json| StageRequest::from_json(&json));
        assert_eq!(decoded.ok(), Some(request));
    }

    #[test]
    fn should_decode_fields_in_any_order() {
        let json = r#"{"tr_count":1,"operation":"DRILL","location":"gom-1","order_id":5,"priority":2}"#;
        let request = StageRequest::from_json(json);
        assert_eq!(request.map(|r| r.location).ok(), Some(Address::new("gom-1")));
    }

    #[test]
    fn should_reject_malformed_json() {
        assert!(matches!(
            Order::from_json("{not json"),
            Err(Error::JsonParseFailed { .. })
        ));
    }

    #[test]
    fn should_advance_active_order_location() {
        let mut active = ActiveOrder::new(drill_mill());
        active.cell = Some(Address::new("gom-2"));
        assert!(active.location.is_warehouse());

        let done = active.advance(Address::new("gom-2"));
        assert_eq!(done.ok(), Some(false));
        assert_eq!(active.location, Address::new("gom-2"));
        assert!(active.cell.is_none());
        assert_eq!(
            active.stage_request().map(|r| r.location),
            Some(Address::new("gom-2"))
        );
    }

    #[test]
    fn should_display_warehouse_address() {
        assert_eq!(Address::warehouse().to_string(), "<warehouse>");
        assert_eq!(Address::new("tr-1").to_string(), "tr-1");
    }

    proptest! {
        #[test]
        fn current_operation_never_decreases(stages in 0usize..12, extra in 0usize..4) {
            let ops = vec![Operation::Drill; stages];
            let mut order = Order::new(1, 1, ops, Vec::new());
            let mut last = order.current_operation;
            let mut completed = 0usize;
            for _ in 0..stages.saturating_add(extra) {
                if order.complete_stage().is_ok() {
                    completed = completed.saturating_add(1);
                }
                prop_assert!(order.current_operation >= last);
                last = order.current_operation;
            }
            prop_assert_eq!(completed, stages);
            prop_assert!(order.is_done());
        }
    }
}
