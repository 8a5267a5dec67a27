//! Whole-Factory Behavioral Tests - BDD Style
//!
//! Following BDD naming convention: given_<context>_when_<action>_then_<outcome>
//!
//! Every agent runs for real on a shrunken clock. The bus tap records the
//! full conversation so the tests can check who said what to whom.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use industry_core::{Address, Operation, Order, StageRequest};
use industry_events::{EventBus, EventPattern, FactoryEvent};
use industry_orchestrator::actors::{CellMessage, RobotMessage, RobotStatus, RoleKind, query};
use industry_orchestrator::bootstrap::{Factory, LaunchOptions};
use industry_orchestrator::config::{
    CellConfig, FactoryConfig, LayoutConfig, OrderConfig, RobotConfig, TimingConfig,
};
use industry_orchestrator::messaging::{Envelope, Mailbox, Performative};

const WAIT: Duration = Duration::from_secs(10);

fn addr(name: &str) -> Address {
    Address::new(name)
}

fn fast_config(machines: &[&[&str]], robots: usize) -> FactoryConfig {
    FactoryConfig {
        timing: TimingConfig {
            operation_durations_ms: BTreeMap::new(),
            default_operation_ms: 50,
            movement_tick_ms: 10,
            decision_period_ms: 10,
            scheduler_poll_ms: 50,
            roster_snapshot_ms: 200,
            transport_retry_ms: 20,
            ..TimingConfig::default()
        },
        robots: RobotConfig {
            count: robots,
            speed: 4000.0,
            recruit_interval_ms: 50,
            max_recruit_rounds: 20,
            backoff_base_ms: 20,
            backoff_max_ms: 200,
            ..RobotConfig::default()
        },
        cells: CellConfig {
            count: machines.len(),
            machines: machines
                .iter()
                .map(|ops| ops.iter().map(|op| (*op).to_string()).collect())
                .collect(),
            ..CellConfig::default()
        },
        layout: LayoutConfig {
            seed: Some(3),
            ..LayoutConfig::default()
        },
        ..FactoryConfig::default()
    }
}

/// Who sent what to whom.
type Hop = (String, String, Performative);

fn hop(from: &str, to: &str, performative: Performative) -> Hop {
    (from.to_string(), to.to_string(), performative)
}

fn is_subsequence(wanted: &[Hop], seen: &[Hop]) -> bool {
    let mut seen = seen.iter();
    wanted.iter().all(|w| seen.any(|s| s == w))
}

struct Floor {
    factory: Factory,
    tap: mpsc::UnboundedReceiver<Envelope>,
    orders: mpsc::UnboundedReceiver<Envelope>,
    trace: Vec<Envelope>,
}

impl Floor {
    /// Launch without an order source; a probe takes the `factory` address.
    async fn launch(config: &FactoryConfig, telemetry: Arc<EventBus>) -> Self {
        let (tap_tx, tap) = mpsc::unbounded_channel();
        let factory = Factory::launch(
            config,
            telemetry,
            LaunchOptions::default().without_source().with_tap(tap_tx),
        )
        .await
        .expect("factory should launch");

        let (orders_tx, orders) = mpsc::unbounded_channel();
        factory
            .bus
            .register(addr("factory"), Arc::new(orders_tx) as Arc<dyn Mailbox>)
            .await;

        Self {
            factory,
            tap,
            orders,
            trace: Vec::new(),
        }
    }

    async fn submit(&self, order: &Order) {
        let envelope = Envelope::new(addr("factory"), addr("manager"), Performative::Request)
            .with_correlation(order.order_id.to_string())
            .with_payload(order)
            .unwrap();
        self.factory.bus.send(envelope).await.unwrap();
    }

    /// Wait for the scheduler's completion notice for `order_id`.
    async fn await_completion(&mut self, order_id: u64) {
        let correlation = order_id.to_string();
        let done = tokio::time::timeout(WAIT, async {
            while let Some(envelope) = self.orders.recv().await {
                if envelope.performative == Performative::Inform
                    && envelope.correlation.as_deref() == Some(correlation.as_str())
                {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(done, "order {order_id} never completed");
        self.drain_tap();
    }

    fn drain_tap(&mut self) {
        while let Ok(envelope) = self.tap.try_recv() {
            self.trace.push(envelope);
        }
    }

    fn hops(&self) -> Vec<Hop> {
        self.trace
            .iter()
            .map(|e| {
                (
                    e.sender.as_str().to_string(),
                    e.to.as_str().to_string(),
                    e.performative,
                )
            })
            .collect()
    }

    async fn robot_statuses(&self) -> Vec<RobotStatus> {
        let mut statuses = Vec::new();
        for robot in &self.factory.robots {
            let status = query(
                robot,
                |reply| RobotMessage::GetStatus { reply },
                Duration::from_secs(2),
            )
            .await
            .unwrap();
            statuses.push(status);
        }
        statuses
    }

    /// Poll until every robot is idle with no outstanding offers.
    async fn await_fleet_at_rest(&self) -> Vec<RobotStatus> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let statuses = self.robot_statuses().await;
            let at_rest = statuses.iter().all(|s| {
                s.role == RoleKind::Idle && s.pending_helps.is_empty() && s.confirmed_helps.is_empty()
            });
            if at_rest || tokio::time::Instant::now() >= deadline {
                return statuses;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

// ============================================================================
// 1. SINGLE-STAGE ORDER WITH ONE ROBOT
// ============================================================================

#[tokio::test]
async fn given_one_cell_and_one_robot_when_order_submitted_then_full_exchange_completes_it() {
    // GIVEN: A drill cell and a single robot
    let config = fast_config(&[&["DRILL"]], 1);
    let mut floor = Floor::launch(&config, Arc::new(EventBus::new())).await;

    // WHEN: A one-stage order arrives
    floor
        .submit(&Order::new(0, 1, vec![Operation::Drill], vec![1]))
        .await;
    floor.await_completion(1).await;

    // THEN: The conversation follows the dispatch, fetch and report chain
    let expected = vec![
        hop("manager", "factory", Performative::Agree),
        hop("manager", "gom-1", Performative::Request),
        hop("gom-1", "manager", Performative::Agree),
        hop("gom-1", "tr-1", Performative::Request),
        hop("tr-1", "gom-1", Performative::Agree),
        hop("tr-1", "gom-1", Performative::Inform),
        hop("gom-1", "manager", Performative::Inform),
        hop("manager", "factory", Performative::Inform),
    ];
    let seen = floor.hops();
    assert!(is_subsequence(&expected, &seen), "unexpected trace: {seen:?}");

    // AND: The scheduler has nothing left and the cell is idle again
    let stats = floor.factory.scheduler_stats().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.in_flight, 0);

    floor.factory.shutdown().await;
}

// ============================================================================
// 2. MULTI-STAGE ORDER ACROSS CELLS
// ============================================================================

#[tokio::test]
async fn given_two_specialised_cells_when_two_stage_order_runs_then_second_fetch_starts_at_first_cell()
 {
    // GIVEN: A drill cell and a mill cell
    let config = fast_config(&[&["DRILL"], &["MILL"]], 2);
    let mut floor = Floor::launch(&config, Arc::new(EventBus::new())).await;

    // WHEN: An order needs drilling then milling
    floor
        .submit(&Order::new(
            0,
            7,
            vec![Operation::Drill, Operation::Mill],
            vec![1, 1],
        ))
        .await;
    floor.await_completion(7).await;

    // THEN: The mill cell's robot fetched from the drill cell
    let fetch = floor
        .trace
        .iter()
        .find(|e| {
            e.sender == addr("gom-2")
                && e.to.as_str().starts_with("tr-")
                && e.performative == Performative::Request
        })
        .expect("mill cell should ask for transport");
    let request: StageRequest = fetch.decode().unwrap();
    assert_eq!(request.location, addr("gom-1"));
    assert_eq!(request.operation, Operation::Mill);

    let stats = floor.factory.scheduler_stats().await.unwrap();
    assert_eq!(stats.completed, 1);

    floor.factory.shutdown().await;
}

// ============================================================================
// 3. COOPERATIVE TRANSPORT
// ============================================================================

#[tokio::test]
async fn given_four_robots_when_stage_needs_three_then_leader_confirms_two_and_refuses_one() {
    // GIVEN: One cell, four robots, and a telemetry subscription for recruitment
    let telemetry = Arc::new(EventBus::new());
    let (_id, mut recruited) = telemetry
        .subscribe_with_pattern(EventPattern::ByType("helpers_recruited".to_string()))
        .await;
    let config = fast_config(&[&["DRILL"]], 4);
    let mut floor = Floor::launch(&config, telemetry).await;

    // WHEN: A stage needs three robots
    floor
        .submit(&Order::new(0, 3, vec![Operation::Drill], vec![3]))
        .await;
    floor.await_completion(3).await;

    // THEN: The leader is the robot the cell asked and that agreed
    let leader = floor
        .trace
        .iter()
        .find(|e| {
            e.sender.as_str().starts_with("tr-")
                && e.to == addr("gom-1")
                && e.performative == Performative::Agree
        })
        .map(|e| e.sender.clone())
        .expect("some robot should take the fetch");

    // AND: It confirmed exactly two candidates and turned one away
    let to_peers = |performative: Performative| {
        floor
            .trace
            .iter()
            .filter(|e| {
                e.sender == leader
                    && e.to.as_str().starts_with("tr-")
                    && e.performative == performative
            })
            .count()
    };
    assert_eq!(to_peers(Performative::Agree), 2);
    assert_eq!(to_peers(Performative::Refuse), 1);

    // AND: Telemetry announced a team of two helpers
    let event = tokio::time::timeout(WAIT, recruited.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        FactoryEvent::HelpersRecruited {
            leader: announced,
            order_id,
            helpers,
            ..
        } => {
            assert_eq!(announced, leader);
            assert_eq!(order_id, 3);
            assert_eq!(helpers.len(), 2);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // AND: The whole fleet returns to rest
    let statuses = floor.await_fleet_at_rest().await;
    for status in statuses {
        assert_eq!(status.role, RoleKind::Idle, "{} still busy", status.address);
        assert!(status.pending_helps.is_empty());
        assert!(status.confirmed_helps.is_empty());
        assert_eq!(status.own_order, None);
        assert_eq!(status.borrowed_order, None);
    }

    floor.factory.shutdown().await;
}

// ============================================================================
// 4. BROKEN MACHINE
// ============================================================================

#[tokio::test]
async fn given_cell_with_broken_machine_when_order_waits_then_refusals_are_paced_by_poll_ticks() {
    // GIVEN: One drill cell whose only drill is broken
    let config = fast_config(&[&["DRILL"]], 1);
    let mut floor = Floor::launch(&config, Arc::new(EventBus::new())).await;
    floor.factory.cells[0]
        .cast(CellMessage::SetMachineWorking {
            operation: Operation::Drill,
            index: 0,
            working: false,
        })
        .unwrap();

    // WHEN: A drill order waits for six poll intervals
    floor
        .submit(&Order::new(0, 1, vec![Operation::Drill], vec![1]))
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    floor.drain_tap();

    // THEN: The cell is asked about once per poll tick, not in a tight loop
    let refusals = floor
        .hops()
        .iter()
        .filter(|h| **h == hop("gom-1", "manager", Performative::Refuse))
        .count();
    assert!(refusals >= 1, "the cell was never asked");
    assert!(refusals <= 10, "{refusals} refusals in 300ms");

    // AND WHEN: The drill is repaired
    floor.factory.cells[0]
        .cast(CellMessage::SetMachineWorking {
            operation: Operation::Drill,
            index: 0,
            working: true,
        })
        .unwrap();

    // THEN: The waiting order completes
    floor.await_completion(1).await;
    let stats = floor.factory.scheduler_stats().await.unwrap();
    assert_eq!(stats.completed, 1);

    floor.factory.shutdown().await;
}

// ============================================================================
// 5. ORDER SOURCE
// ============================================================================

#[tokio::test]
async fn given_auto_emitting_source_when_limit_reached_then_every_order_completes() {
    // GIVEN: Two capable cells, three robots, and a source capped at three orders
    let config = FactoryConfig {
        orders: OrderConfig {
            period_ms: 50,
            operations_per_order: 1,
            max_tr_count: 2,
            limit: Some(3),
            ..OrderConfig::default()
        },
        ..fast_config(&[&["DRILL", "MILL"], &["DRILL", "MILL"]], 3)
    };

    // WHEN: The factory runs with its own source
    let factory = Factory::launch(&config, Arc::new(EventBus::new()), LaunchOptions::default())
        .await
        .expect("factory should launch");

    // THEN: All three orders are accepted and completed
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    let stats = loop {
        let stats = factory.source_stats().await.unwrap();
        if stats.completed.len() == 3 || tokio::time::Instant::now() >= deadline {
            break stats;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.accepted.len(), 3);
    assert!(stats.rejected.is_empty());
    let mut completed = stats.completed.clone();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2, 3]);

    factory.shutdown().await;
}
