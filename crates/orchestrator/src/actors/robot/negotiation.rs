//! Leader/Helper state machines for cooperative transport.
//!
//! Both machines are plain values: every input returns the actions the
//! robot must carry out, so the protocol can be tested without a runtime.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use industry_core::Address;

use super::context::Assignment;
use crate::messaging::Performative;

/// A meeting point of a cooperative carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waypoint {
    Source,
    Destination,
}

/// Body of `inform` messages exchanged inside a carry team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum CarrySignal {
    /// Helper to leader: I am at the waypoint.
    Arrived { waypoint: Waypoint },
    /// Leader to helpers: everyone is loaded, head for `destination`.
    Start { destination: Address },
    /// Leader to helpers: delivered, you are released.
    Finish,
}

/// Counts distinct arrivals against an expected team size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendezvous {
    expected: usize,
    arrived: BTreeSet<Address>,
}

impl Rendezvous {
    #[must_use]
    pub const fn new(expected: usize) -> Self {
        Self {
            expected,
            arrived: BTreeSet::new(),
        }
    }

    /// Record an arrival. Returns whether it was new.
    pub fn arrive(&mut self, who: Address) -> bool {
        self.arrived.insert(who)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.arrived.len() >= self.expected
    }

    #[must_use]
    pub fn arrived(&self) -> usize {
        self.arrived.len()
    }

    #[must_use]
    pub const fn expected(&self) -> usize {
        self.expected
    }
}

/// Leader's answer to a candidate's `agree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Confirmed,
    /// Already on the team; the answer is repeated.
    AlreadyConfirmed,
    /// The team is full.
    Full,
}

/// Confirmed helpers, never more than `needed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recruitment {
    needed: usize,
    confirmed: Vec<Address>,
}

impl Recruitment {
    #[must_use]
    pub const fn new(needed: usize) -> Self {
        Self {
            needed,
            confirmed: Vec::new(),
        }
    }

    pub fn admit(&mut self, candidate: Address) -> Admission {
        if self.confirmed.contains(&candidate) {
            return Admission::AlreadyConfirmed;
        }
        if self.confirmed.len() >= self.needed {
            return Admission::Full;
        }
        self.confirmed.push(candidate);
        Admission::Confirmed
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.confirmed.len() >= self.needed
    }

    #[must_use]
    pub fn confirmed(&self) -> &[Address] {
        &self.confirmed
    }
}

/// Leader protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaderState {
    FindHelpers,
    MoveToSource,
    WaitAtSource,
    MoveToDest,
    WaitAtDest,
    Delivered,
    Abandoned,
}

/// Something the leader's robot must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderAction {
    /// Send the recruitment request to every robot not yet on the team.
    Broadcast,
    Reply {
        to: Address,
        performative: Performative,
    },
    /// The team is complete.
    Recruited,
    MoveTo(Address),
    Signal {
        to: Vec<Address>,
        signal: CarrySignal,
    },
    /// Hand the goods to the requesting cell.
    Deliver,
    /// Recruitment ran out of rounds; release the listed helpers.
    Abandon { release: Vec<Address> },
}

/// The leader side of a cooperative carry.
#[derive(Debug, Clone)]
pub struct LeaderFsm {
    state: LeaderState,
    token: String,
    assignment: Assignment,
    recruitment: Recruitment,
    rounds: u32,
    max_rounds: u32,
    at_source: Rendezvous,
    at_destination: Rendezvous,
}

impl LeaderFsm {
    /// Begin recruiting `tr_count - 1` helpers; the first broadcast is due
    /// immediately.
    #[must_use]
    pub fn start(assignment: Assignment, token: String, max_rounds: u32) -> (Self, Vec<LeaderAction>) {
        let needed = usize::try_from(assignment.tr_count().saturating_sub(1)).unwrap_or(usize::MAX);
        let fsm = Self {
            state: LeaderState::FindHelpers,
            token,
            assignment,
            recruitment: Recruitment::new(needed),
            rounds: 1,
            max_rounds,
            at_source: Rendezvous::new(needed),
            at_destination: Rendezvous::new(needed),
        };
        (fsm, vec![LeaderAction::Broadcast])
    }

    #[must_use]
    pub const fn state(&self) -> LeaderState {
        self.state
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub const fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    #[must_use]
    pub fn helpers(&self) -> &[Address] {
        self.recruitment.confirmed()
    }

    #[must_use]
    pub const fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Second phase of the handshake: confirm or turn down a candidate.
    pub fn on_candidate_agree(&mut self, candidate: Address) -> Vec<LeaderAction> {
        if self.state != LeaderState::FindHelpers {
            return vec![LeaderAction::Reply {
                to: candidate,
                performative: Performative::Refuse,
            }];
        }
        match self.recruitment.admit(candidate.clone()) {
            Admission::Full => vec![LeaderAction::Reply {
                to: candidate,
                performative: Performative::Refuse,
            }],
            Admission::AlreadyConfirmed => vec![LeaderAction::Reply {
                to: candidate,
                performative: Performative::Agree,
            }],
            Admission::Confirmed => {
                let mut actions = vec![LeaderAction::Reply {
                    to: candidate,
                    performative: Performative::Agree,
                }];
                if self.recruitment.is_complete() {
                    self.state = LeaderState::MoveToSource;
                    actions.push(LeaderAction::Recruited);
                    actions.push(LeaderAction::MoveTo(self.assignment.request.location.clone()));
                }
                actions
            }
        }
    }

    /// A recruitment round elapsed without a full team.
    pub fn on_round(&mut self) -> Vec<LeaderAction> {
        if self.state != LeaderState::FindHelpers {
            return Vec::new();
        }
        if self.rounds >= self.max_rounds {
            self.state = LeaderState::Abandoned;
            return vec![LeaderAction::Abandon {
                release: self.recruitment.confirmed().to_vec(),
            }];
        }
        self.rounds = self.rounds.saturating_add(1);
        vec![LeaderAction::Broadcast]
    }

    /// The leader itself reached its movement target.
    pub fn on_arrived(&mut self) -> Vec<LeaderAction> {
        match self.state {
            LeaderState::MoveToSource => {
                self.state = LeaderState::WaitAtSource;
                self.try_leave_source()
            }
            LeaderState::MoveToDest => {
                self.state = LeaderState::WaitAtDest;
                self.try_deliver()
            }
            _ => Vec::new(),
        }
    }

    /// A team member reported reaching `waypoint`. Reports from robots not
    /// on the team are ignored.
    pub fn on_helper_arrived(&mut self, helper: &Address, waypoint: Waypoint) -> Vec<LeaderAction> {
        if !self.recruitment.confirmed().contains(helper) {
            return Vec::new();
        }
        match waypoint {
            Waypoint::Source => {
                self.at_source.arrive(helper.clone());
                self.try_leave_source()
            }
            Waypoint::Destination => {
                self.at_destination.arrive(helper.clone());
                self.try_deliver()
            }
        }
    }

    fn try_leave_source(&mut self) -> Vec<LeaderAction> {
        if self.state != LeaderState::WaitAtSource || !self.at_source.is_complete() {
            return Vec::new();
        }
        self.state = LeaderState::MoveToDest;
        vec![
            LeaderAction::Signal {
                to: self.helpers().to_vec(),
                signal: CarrySignal::Start {
                    destination: self.assignment.requester.clone(),
                },
            },
            LeaderAction::MoveTo(self.assignment.requester.clone()),
        ]
    }

    fn try_deliver(&mut self) -> Vec<LeaderAction> {
        if self.state != LeaderState::WaitAtDest || !self.at_destination.is_complete() {
            return Vec::new();
        }
        self.state = LeaderState::Delivered;
        vec![
            LeaderAction::Deliver,
            LeaderAction::Signal {
                to: self.helpers().to_vec(),
                signal: CarrySignal::Finish,
            },
        ]
    }
}

/// Helper protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HelperState {
    MoveToSource,
    WaitForStart,
    MoveToDest,
    WaitForFinish,
    Finished,
}

/// Something the helper's robot must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperAction {
    MoveTo(Address),
    /// Send `signal` to the leader.
    Notify(CarrySignal),
    /// The help is over; restore the saved context.
    Finish,
}

/// The helper side of a cooperative carry.
#[derive(Debug, Clone)]
pub struct HelperFsm {
    state: HelperState,
    leader: Address,
    token: String,
}

impl HelperFsm {
    /// Head for `source` to meet the leader.
    #[must_use]
    pub fn start(leader: Address, token: String, source: Address) -> (Self, Vec<HelperAction>) {
        let fsm = Self {
            state: HelperState::MoveToSource,
            leader,
            token,
        };
        (fsm, vec![HelperAction::MoveTo(source)])
    }

    #[must_use]
    pub const fn state(&self) -> HelperState {
        self.state
    }

    #[must_use]
    pub const fn leader(&self) -> &Address {
        &self.leader
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn on_arrived(&mut self) -> Vec<HelperAction> {
        match self.state {
            HelperState::MoveToSource => {
                self.state = HelperState::WaitForStart;
                vec![HelperAction::Notify(CarrySignal::Arrived {
                    waypoint: Waypoint::Source,
                })]
            }
            HelperState::MoveToDest => {
                self.state = HelperState::WaitForFinish;
                vec![HelperAction::Notify(CarrySignal::Arrived {
                    waypoint: Waypoint::Destination,
                })]
            }
            _ => Vec::new(),
        }
    }

    /// Decision tick: keep telling the leader we are waiting at the source.
    pub fn on_tick(&mut self) -> Vec<HelperAction> {
        match self.state {
            HelperState::WaitForStart => vec![HelperAction::Notify(CarrySignal::Arrived {
                waypoint: Waypoint::Source,
            })],
            _ => Vec::new(),
        }
    }

    pub fn on_start(&mut self, destination: Address) -> Vec<HelperAction> {
        match self.state {
            HelperState::WaitForStart => {
                self.state = HelperState::MoveToDest;
                vec![HelperAction::MoveTo(destination)]
            }
            _ => Vec::new(),
        }
    }

    /// `finish` from the leader, or release after abandoned recruitment.
    pub fn on_finish(&mut self) -> Vec<HelperAction> {
        if self.state == HelperState::Finished {
            return Vec::new();
        }
        self.state = HelperState::Finished;
        vec![HelperAction::Finish]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use industry_core::{Operation, StageRequest};
    use proptest::prelude::*;

    fn assignment(tr_count: u32) -> Assignment {
        Assignment {
            request: StageRequest {
                priority: 1,
                order_id: 11,
                location: Address::warehouse(),
                operation: Operation::Mill,
                tr_count,
            },
            requester: Address::new("gom-3"),
            correlation: "11".to_string(),
        }
    }

    fn tr(i: u32) -> Address {
        Address::new(format!("tr-{i}"))
    }

    fn reply(to: Address, performative: Performative) -> LeaderAction {
        LeaderAction::Reply { to, performative }
    }

    #[test]
    fn should_broadcast_on_start() {
        let (fsm, actions) = LeaderFsm::start(assignment(3), "t".to_string(), 5);
        assert_eq!(fsm.state(), LeaderState::FindHelpers);
        assert_eq!(actions, vec![LeaderAction::Broadcast]);
    }

    #[test]
    fn should_confirm_exactly_tr_count_minus_one_helpers() {
        let (mut fsm, _) = LeaderFsm::start(assignment(3), "t".to_string(), 5);

        assert_eq!(fsm.on_candidate_agree(tr(2)), vec![reply(tr(2), Performative::Agree)]);
        let second = fsm.on_candidate_agree(tr(3));
        assert_eq!(
            second,
            vec![
                reply(tr(3), Performative::Agree),
                LeaderAction::Recruited,
                LeaderAction::MoveTo(Address::warehouse()),
            ]
        );
        assert_eq!(fsm.on_candidate_agree(tr(4)), vec![reply(tr(4), Performative::Refuse)]);
        assert_eq!(fsm.helpers(), &[tr(2), tr(3)]);
        assert_eq!(fsm.state(), LeaderState::MoveToSource);
    }

    #[test]
    fn should_repeat_agree_to_already_confirmed_candidate() {
        let (mut fsm, _) = LeaderFsm::start(assignment(3), "t".to_string(), 5);
        fsm.on_candidate_agree(tr(2));
        assert_eq!(fsm.on_candidate_agree(tr(2)), vec![reply(tr(2), Performative::Agree)]);
        assert_eq!(fsm.helpers().len(), 1);
    }

    #[test]
    fn should_wait_at_source_for_every_helper() {
        let (mut fsm, _) = LeaderFsm::start(assignment(3), "t".to_string(), 5);
        fsm.on_candidate_agree(tr(2));
        fsm.on_candidate_agree(tr(3));

        assert!(fsm.on_helper_arrived(&tr(2), Waypoint::Source).is_empty());
        assert!(fsm.on_arrived().is_empty());
        assert_eq!(fsm.state(), LeaderState::WaitAtSource);

        assert!(fsm.on_helper_arrived(&tr(9), Waypoint::Source).is_empty());
        assert!(fsm.on_helper_arrived(&tr(2), Waypoint::Source).is_empty());

        let actions = fsm.on_helper_arrived(&tr(3), Waypoint::Source);
        assert_eq!(
            actions,
            vec![
                LeaderAction::Signal {
                    to: vec![tr(2), tr(3)],
                    signal: CarrySignal::Start {
                        destination: Address::new("gom-3")
                    },
                },
                LeaderAction::MoveTo(Address::new("gom-3")),
            ]
        );
        assert_eq!(fsm.state(), LeaderState::MoveToDest);
    }

    #[test]
    fn should_deliver_once_team_is_at_destination() {
        let (mut fsm, _) = LeaderFsm::start(assignment(2), "t".to_string(), 5);
        fsm.on_candidate_agree(tr(2));
        fsm.on_helper_arrived(&tr(2), Waypoint::Source);
        assert_eq!(fsm.on_arrived().len(), 2);

        fsm.on_helper_arrived(&tr(2), Waypoint::Destination);
        let actions = fsm.on_arrived();
        assert_eq!(
            actions,
            vec![
                LeaderAction::Deliver,
                LeaderAction::Signal {
                    to: vec![tr(2)],
                    signal: CarrySignal::Finish,
                },
            ]
        );
        assert_eq!(fsm.state(), LeaderState::Delivered);
    }

    #[test]
    fn should_abandon_after_max_rounds_and_release_helpers() {
        let (mut fsm, _) = LeaderFsm::start(assignment(3), "t".to_string(), 3);
        fsm.on_candidate_agree(tr(2));

        assert_eq!(fsm.on_round(), vec![LeaderAction::Broadcast]);
        assert_eq!(fsm.on_round(), vec![LeaderAction::Broadcast]);
        assert_eq!(
            fsm.on_round(),
            vec![LeaderAction::Abandon {
                release: vec![tr(2)]
            }]
        );
        assert_eq!(fsm.state(), LeaderState::Abandoned);
        assert_eq!(fsm.on_candidate_agree(tr(3)), vec![reply(tr(3), Performative::Refuse)]);
        assert!(fsm.on_round().is_empty());
    }

    #[test]
    fn should_ignore_rounds_once_recruited() {
        let (mut fsm, _) = LeaderFsm::start(assignment(2), "t".to_string(), 1);
        fsm.on_candidate_agree(tr(2));
        assert!(fsm.on_round().is_empty());
        assert_eq!(fsm.state(), LeaderState::MoveToSource);
    }

    #[test]
    fn should_walk_helper_through_the_carry() {
        let (mut helper, actions) = HelperFsm::start(tr(1), "t".to_string(), Address::warehouse());
        assert_eq!(actions, vec![HelperAction::MoveTo(Address::warehouse())]);
        assert!(helper.on_tick().is_empty());
        assert!(helper.on_start(Address::new("gom-3")).is_empty());

        let arrived = helper.on_arrived();
        assert_eq!(
            arrived,
            vec![HelperAction::Notify(CarrySignal::Arrived {
                waypoint: Waypoint::Source
            })]
        );
        assert_eq!(helper.on_tick(), arrived);

        assert_eq!(
            helper.on_start(Address::new("gom-3")),
            vec![HelperAction::MoveTo(Address::new("gom-3"))]
        );
        assert!(helper.on_tick().is_empty());
        assert_eq!(
            helper.on_arrived(),
            vec![HelperAction::Notify(CarrySignal::Arrived {
                waypoint: Waypoint::Destination
            })]
        );
        assert_eq!(helper.on_finish(), vec![HelperAction::Finish]);
        assert!(helper.on_finish().is_empty());
        assert_eq!(helper.state(), HelperState::Finished);
    }

    #[test]
    fn should_release_helper_mid_move() {
        let (mut helper, _) = HelperFsm::start(tr(1), "t".to_string(), Address::warehouse());
        assert_eq!(helper.on_finish(), vec![HelperAction::Finish]);
        assert!(helper.on_arrived().is_empty());
    }

    #[test]
    fn should_encode_carry_signals_with_tag() {
        let json = serde_json::to_string(&CarrySignal::Arrived {
            waypoint: Waypoint::Source,
        })
        .unwrap();
        assert_eq!(json, r#"{"signal":"arrived","waypoint":"source"}"#);
        let decoded: CarrySignal = serde_json::from_str(r#"{"signal":"finish"}"#).unwrap();
        assert_eq!(decoded, CarrySignal::Finish);
    }

    #[test]
    fn should_complete_rendezvous_with_distinct_arrivals_only() {
        let mut rendezvous = Rendezvous::new(2);
        assert!(rendezvous.arrive(tr(1)));
        assert!(!rendezvous.arrive(tr(1)));
        assert!(!rendezvous.is_complete());
        rendezvous.arrive(tr(2));
        assert!(rendezvous.is_complete());
        assert_eq!(rendezvous.arrived(), rendezvous.expected());
    }

    proptest! {
        #[test]
        fn never_confirms_more_than_tr_count_minus_one(
            tr_count in 1u32..6,
            candidates in prop::collection::vec(0u32..8, 0..30),
        ) {
            let (mut fsm, _) = LeaderFsm::start(assignment(tr_count), "t".to_string(), 10);
            let mut agreed = BTreeSet::new();
            for c in candidates {
                for action in fsm.on_candidate_agree(tr(c)) {
                    if let LeaderAction::Reply { to, performative: Performative::Agree } = action {
                        agreed.insert(to);
                    }
                }
                prop_assert!(fsm.helpers().len() <= (tr_count - 1) as usize);
                prop_assert!(agreed.len() <= (tr_count - 1) as usize);
            }
        }
    }
}
