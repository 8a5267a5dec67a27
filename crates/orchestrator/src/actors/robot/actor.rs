//! TransportRobotActor - a mobile carrier that fetches goods for work-cells.
//!
//! Light orders are carried solo. Heavy ones (more than one robot needed)
//! make the robot a leader that recruits helpers from its peers. The
//! protocol logic lives in `negotiation`; this actor moves, talks and keeps
//! the bookkeeping.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use industry_core::{Address, Position, StageRequest};
use industry_events::{EventBus, FactoryEvent};

use super::context::{Assignment, Context};
use super::negotiation::{
    CarrySignal, HelperAction, HelperFsm, LeaderAction, LeaderFsm, LeaderState,
};
use crate::actors::messages::{RobotMessage, RobotStatus, RoleKind};
use crate::actors::timer::{Ticker, TickerHandle, calculate_backoff};
use crate::config::{RobotConfig, TimingConfig, Willingness};
use crate::messaging::{Envelope, MessageBus, Performative, Router, Template};
use crate::movement::Movement;

/// Leg of a solo carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SoloLeg {
    ToSource,
    ToDestination,
}

/// What the robot is actively doing.
#[derive(Debug)]
enum Role {
    Solo(SoloLeg),
    Leader(LeaderFsm),
    Helper(HelperFsm),
}

/// A leader's offer this robot agreed to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HelpOffer {
    request: StageRequest,
    token: String,
}

/// An active move and the ticker driving it.
struct Motion {
    seq: u64,
    movement: Movement,
    ticker: TickerHandle,
}

/// Whether a robot agrees to a leader's recruitment request.
#[must_use]
pub fn is_willing(willingness: Willingness, has_role: bool, has_offers: bool) -> bool {
    match willingness {
        Willingness::Always => true,
        Willingness::WhenFree => !has_role && !has_offers,
    }
}

/// The transport robot actor definition.
#[derive(Clone, Default)]
pub struct TransportRobotActorDef;

/// Arguments passed to the actor on startup.
pub struct RobotArguments {
    pub address: Address,
    /// Every other robot on the floor.
    pub peers: Vec<Address>,
    /// Work-cells that may ask for fetches.
    pub cells: Vec<Address>,
    /// Fixed sites: work-cells and the warehouse.
    pub sites: HashMap<Address, Position>,
    pub start: Position,
    pub robot: RobotConfig,
    pub timing: TimingConfig,
    pub seed: Option<u64>,
    pub bus: Arc<MessageBus>,
    pub telemetry: Arc<EventBus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RobotRoute {
    FetchRequest,
    RecruitRequest,
    PeerAgree,
    PeerRefuse,
    PeerInform,
    PeerFailure,
}

/// Actor state.
pub struct RobotState {
    address: Address,
    peers: Vec<Address>,
    sites: HashMap<Address, Position>,
    position: Position,
    speed: f64,
    movement_tick: Duration,
    context: Context,
    role: Option<Role>,
    /// Leaders answered with `agree`, waiting for their confirmation.
    pending: BTreeMap<Address, HelpOffer>,
    /// Leaders that confirmed this robot.
    confirmed: BTreeMap<Address, HelpOffer>,
    motion: Option<Motion>,
    motion_seq: u64,
    robot: RobotConfig,
    backoff_attempt: u32,
    backoff_until: Option<Instant>,
    nonce: u64,
    recruit_ticker: Option<TickerHandle>,
    decision_ticker: TickerHandle,
    rng: StdRng,
    router: Router<RobotRoute>,
    bus: Arc<MessageBus>,
    telemetry: Arc<EventBus>,
}

impl RobotState {
    const fn role_kind(&self) -> RoleKind {
        match self.role {
            None => RoleKind::Idle,
            Some(Role::Solo(_)) => RoleKind::Solo,
            Some(Role::Leader(_)) => RoleKind::Leader,
            Some(Role::Helper(_)) => RoleKind::Helper,
        }
    }

    fn leader(&mut self) -> Option<&mut LeaderFsm> {
        match self.role.as_mut() {
            Some(Role::Leader(fsm)) => Some(fsm),
            _ => None,
        }
    }

    fn helper(&mut self) -> Option<&mut HelperFsm> {
        match self.role.as_mut() {
            Some(Role::Helper(fsm)) => Some(fsm),
            _ => None,
        }
    }

    fn in_backoff(&self) -> bool {
        self.backoff_until.is_some_and(|until| Instant::now() < until)
    }

    fn status(&self) -> RobotStatus {
        let (leader_state, helpers) = match &self.role {
            Some(Role::Leader(fsm)) => (Some(fsm.state()), fsm.helpers().to_vec()),
            _ => (None, Vec::new()),
        };
        RobotStatus {
            address: self.address.clone(),
            position: self.position,
            role: self.role_kind(),
            leader_state,
            helper_state: match &self.role {
                Some(Role::Helper(fsm)) => Some(fsm.state()),
                _ => None,
            },
            own_order: self.context.own().map(Assignment::order_id),
            borrowed_order: self.context.borrowed().map(|r| r.order_id),
            pending_helps: self.pending.keys().cloned().collect(),
            confirmed_helps: self.confirmed.keys().cloned().collect(),
            helpers,
        }
    }

    fn stop_motion(&mut self) {
        if let Some(motion) = self.motion.take() {
            motion.ticker.stop();
        }
    }

    fn stop_recruiting(&mut self) {
        if let Some(ticker) = self.recruit_ticker.take() {
            ticker.stop();
        }
    }
}

impl Actor for TransportRobotActorDef {
    type Msg = RobotMessage;
    type State = RobotState;
    type Arguments = RobotArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            address = %args.address,
            peers = args.peers.len(),
            position = %args.start,
            "TransportRobotActor starting"
        );

        let from_peer = Template::any_sender(&args.peers);
        let router = Router::new()
            .route(
                Template::any_sender(&args.cells)
                    .and(Template::performative(Performative::Request)),
                RobotRoute::FetchRequest,
            )
            .route(
                from_peer
                    .clone()
                    .and(Template::performative(Performative::Request)),
                RobotRoute::RecruitRequest,
            )
            .route(
                from_peer
                    .clone()
                    .and(Template::performative(Performative::Agree)),
                RobotRoute::PeerAgree,
            )
            .route(
                from_peer
                    .clone()
                    .and(Template::performative(Performative::Refuse)),
                RobotRoute::PeerRefuse,
            )
            .route(
                from_peer
                    .clone()
                    .and(Template::performative(Performative::Inform)),
                RobotRoute::PeerInform,
            )
            .route(
                from_peer.and(Template::performative(Performative::Failure)),
                RobotRoute::PeerFailure,
            );

        let decision_ticker =
            Ticker::new(args.timing.decision_period()).start(myself, || RobotMessage::DecisionTick);

        Ok(RobotState {
            address: args.address,
            peers: args.peers,
            sites: args.sites,
            position: args.start,
            speed: args.robot.speed,
            movement_tick: args.timing.movement_tick(),
            context: Context::Empty,
            role: None,
            pending: BTreeMap::new(),
            confirmed: BTreeMap::new(),
            motion: None,
            motion_seq: 0,
            robot: args.robot,
            backoff_attempt: 0,
            backoff_until: None,
            nonce: 0,
            recruit_ticker: None,
            decision_ticker,
            rng: args
                .seed
                .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
            router,
            bus: args.bus,
            telemetry: args.telemetry,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            // ═══════════════════════════════════════════════════════════════
            // PROTOCOL
            // ═══════════════════════════════════════════════════════════════
            RobotMessage::Deliver(envelope) => {
                Self::handle_envelope(&myself, state, envelope).await;
            }

            // ═══════════════════════════════════════════════════════════════
            // TIMERS
            // ═══════════════════════════════════════════════════════════════
            RobotMessage::DecisionTick => Self::decide(&myself, state).await,

            RobotMessage::MoveTick { seq } => Self::handle_move_tick(&myself, state, seq).await,

            RobotMessage::RecruitRound { token } => {
                let actions = match state.leader() {
                    Some(fsm) if fsm.token() == token => fsm.on_round(),
                    _ => return Ok(()),
                };
                Self::apply_leader_actions(&myself, state, &token, actions).await;
            }

            // ═══════════════════════════════════════════════════════════════
            // QUERIES
            // ═══════════════════════════════════════════════════════════════
            RobotMessage::GetStatus { reply } => {
                let _ = reply.send(state.status());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        info!(address = %state.address, "TransportRobotActor stopping");
        state.decision_ticker.stop();
        state.stop_motion();
        state.stop_recruiting();
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Implementation
// ═══════════════════════════════════════════════════════════════════════════

impl TransportRobotActorDef {
    async fn handle_envelope(
        myself: &ActorRef<RobotMessage>,
        state: &mut RobotState,
        envelope: Envelope,
    ) {
        let Some(route) = state.router.classify(&envelope) else {
            warn!(robot = %state.address, envelope = %envelope, "Robot dropping unexpected message");
            return;
        };

        match route {
            RobotRoute::FetchRequest => Self::handle_fetch(myself, state, &envelope).await,
            RobotRoute::RecruitRequest => Self::handle_recruit_request(state, &envelope).await,
            RobotRoute::PeerAgree => Self::handle_peer_agree(myself, state, &envelope).await,
            RobotRoute::PeerRefuse => Self::handle_peer_refuse(state, &envelope),
            RobotRoute::PeerInform => Self::handle_peer_inform(myself, state, &envelope).await,
            RobotRoute::PeerFailure => Self::handle_peer_failure(myself, state, &envelope).await,
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Work-cell side
    // ───────────────────────────────────────────────────────────────────────

    async fn handle_fetch(
        myself: &ActorRef<RobotMessage>,
        state: &mut RobotState,
        envelope: &Envelope,
    ) {
        let request: StageRequest = match envelope.decode() {
            Ok(request) => request,
            Err(e) => {
                warn!(robot = %state.address, error = %e, "Refusing malformed fetch request");
                state
                    .bus
                    .send_or_log(envelope.reply(Performative::Refuse))
                    .await;
                return;
            }
        };
        let correlation = envelope
            .correlation
            .clone()
            .unwrap_or_else(|| request.correlation());

        if !state.context.is_empty() || state.role.is_some() {
            debug!(robot = %state.address, order_id = request.order_id, "Busy, refusing fetch");
            let reply = envelope.reply(Performative::Refuse).with_correlation(correlation);
            state.bus.send_or_log(reply).await;
            return;
        }

        info!(
            robot = %state.address,
            cell = %envelope.sender,
            order_id = request.order_id,
            tr_count = request.tr_count,
            "Fetch accepted"
        );
        let solo = request.tr_count <= 1;
        state.context = Context::Own(Assignment {
            request,
            requester: envelope.sender.clone(),
            correlation: correlation.clone(),
        });
        let reply = envelope.reply(Performative::Agree).with_correlation(correlation);
        state.bus.send_or_log(reply).await;

        if solo {
            Self::start_solo(myself, state);
        }
    }

    fn start_solo(myself: &ActorRef<RobotMessage>, state: &mut RobotState) {
        let Some(source) = state.context.own().map(|a| a.request.location.clone()) else {
            return;
        };
        debug!(robot = %state.address, source = %source, "Carrying solo");
        state.role = Some(Role::Solo(SoloLeg::ToSource));
        Self::start_move(myself, state, &source);
    }

    /// Hand the own assignment's goods to the requesting cell.
    async fn deliver(state: &mut RobotState) {
        let Context::Own(assignment) = std::mem::take(&mut state.context) else {
            warn!(robot = %state.address, "Nothing to deliver");
            return;
        };
        let order_id = assignment.order_id();
        info!(robot = %state.address, cell = %assignment.requester, order_id, "Delivering");

        let envelope = Envelope::new(
            state.address.clone(),
            assignment.requester.clone(),
            Performative::Inform,
        )
        .with_correlation(assignment.correlation.clone())
        .with_payload(&assignment.request);
        match envelope {
            Ok(envelope) => state.bus.send_or_log(envelope).await,
            Err(e) => warn!(error = %e, "Failed to encode delivery"),
        }

        state
            .telemetry
            .publish(FactoryEvent::delivered(
                state.address.clone(),
                assignment.requester,
                order_id,
            ))
            .await;
    }

    // ───────────────────────────────────────────────────────────────────────
    // Decision loop
    // ───────────────────────────────────────────────────────────────────────

    async fn decide(myself: &ActorRef<RobotMessage>, state: &mut RobotState) {
        if let Some(fsm) = state.helper() {
            let actions = fsm.on_tick();
            Self::apply_helper_actions(myself, state, actions).await;
            return;
        }
        if state.role.is_some() {
            return;
        }

        if let Some((leader, offer)) = state.confirmed.pop_first() {
            Self::start_helping(myself, state, leader, offer).await;
            return;
        }

        let Some(tr_count) = state.context.own().map(Assignment::tr_count) else {
            return;
        };
        if !matches!(state.context, Context::Own(_)) {
            return;
        }
        if tr_count <= 1 {
            Self::start_solo(myself, state);
        } else if state.pending.is_empty() && !state.in_backoff() {
            Self::start_leading(myself, state).await;
        }
    }

    async fn start_helping(
        myself: &ActorRef<RobotMessage>,
        state: &mut RobotState,
        leader: Address,
        offer: HelpOffer,
    ) {
        info!(
            robot = %state.address,
            leader = %leader,
            order_id = offer.request.order_id,
            "Helping"
        );
        let context = std::mem::take(&mut state.context);
        state.context = context.borrow_for(leader.clone(), offer.request.clone());
        let (fsm, actions) = HelperFsm::start(leader, offer.token, offer.request.location);
        state.role = Some(Role::Helper(fsm));
        Self::apply_helper_actions(myself, state, actions).await;
    }

    async fn start_leading(myself: &ActorRef<RobotMessage>, state: &mut RobotState) {
        let Some(assignment) = state.context.own().cloned() else {
            return;
        };
        state.nonce = state.nonce.wrapping_add(1);
        let token = format!(
            "carry-{}-{}-{}",
            assignment.order_id(),
            state.address,
            state.nonce
        );
        info!(
            robot = %state.address,
            order_id = assignment.order_id(),
            helpers_needed = assignment.tr_count().saturating_sub(1),
            "Leading"
        );

        let (fsm, actions) =
            LeaderFsm::start(assignment, token.clone(), state.robot.max_recruit_rounds);
        state.role = Some(Role::Leader(fsm));

        let round_token = token.clone();
        state.stop_recruiting();
        state.recruit_ticker = Some(
            Ticker::new(state.robot.recruit_interval()).start(myself.clone(), move || {
                RobotMessage::RecruitRound {
                    token: round_token.clone(),
                }
            }),
        );
        Self::apply_leader_actions(myself, state, &token, actions).await;
    }

    // ───────────────────────────────────────────────────────────────────────
    // Peer side
    // ───────────────────────────────────────────────────────────────────────

    async fn handle_recruit_request(state: &mut RobotState, envelope: &Envelope) {
        let leader = envelope.sender.clone();
        let Some(token) = envelope.correlation.clone() else {
            warn!(robot = %state.address, leader = %leader, "Recruitment request without token");
            return;
        };
        let request: StageRequest = match envelope.decode() {
            Ok(request) => request,
            Err(e) => {
                warn!(robot = %state.address, error = %e, "Refusing malformed recruitment request");
                state
                    .bus
                    .send_or_log(envelope.reply(Performative::Refuse))
                    .await;
                return;
            }
        };
        if state.pending.contains_key(&leader) || state.confirmed.contains_key(&leader) {
            debug!(robot = %state.address, leader = %leader, "Already answered this leader");
            return;
        }

        let willing = is_willing(
            state.robot.willingness,
            state.role.is_some(),
            !state.pending.is_empty() || !state.confirmed.is_empty(),
        );
        if willing {
            debug!(robot = %state.address, leader = %leader, order_id = request.order_id, "Offering help");
            state
                .pending
                .insert(leader, HelpOffer { request, token });
            state
                .bus
                .send_or_log(envelope.reply(Performative::Agree))
                .await;
        } else {
            state
                .bus
                .send_or_log(envelope.reply(Performative::Refuse))
                .await;
        }
    }

    async fn handle_peer_agree(
        myself: &ActorRef<RobotMessage>,
        state: &mut RobotState,
        envelope: &Envelope,
    ) {
        let peer = &envelope.sender;
        let correlation = envelope.correlation.as_deref();

        // Second phase: a leader confirmed our offer.
        let confirms_offer = state
            .pending
            .get(peer)
            .is_some_and(|offer| Some(offer.token.as_str()) == correlation);
        if confirms_offer {
            if let Some(offer) = state.pending.remove(peer) {
                info!(robot = %state.address, leader = %peer, order_id = offer.request.order_id, "Confirmed as helper");
                state.confirmed.insert(peer.clone(), offer);
            }
            return;
        }

        // First phase: a candidate answered our broadcast.
        let Some(token) = correlation.map(str::to_string) else {
            warn!(robot = %state.address, peer = %peer, "Agree without token");
            return;
        };
        let actions = match state.leader() {
            Some(fsm) if fsm.token() == token => fsm.on_candidate_agree(peer.clone()),
            _ => {
                debug!(robot = %state.address, peer = %peer, "Stale agree, refusing");
                state
                    .bus
                    .send_or_log(envelope.reply(Performative::Refuse))
                    .await;
                return;
            }
        };
        Self::apply_leader_actions(myself, state, &token, actions).await;
    }

    fn handle_peer_refuse(state: &mut RobotState, envelope: &Envelope) {
        let peer = &envelope.sender;
        let matches_offer = state
            .pending
            .get(peer)
            .is_some_and(|offer| Some(offer.token.as_str()) == envelope.correlation.as_deref());
        if matches_offer {
            state.pending.remove(peer);
            debug!(robot = %state.address, leader = %peer, "Offer turned down");
        } else {
            debug!(robot = %state.address, peer = %peer, "Peer refused");
        }
    }

    async fn handle_peer_inform(
        myself: &ActorRef<RobotMessage>,
        state: &mut RobotState,
        envelope: &Envelope,
    ) {
        let signal: CarrySignal = match envelope.decode() {
            Ok(signal) => signal,
            Err(e) => {
                warn!(robot = %state.address, error = %e, "Dropping malformed carry signal");
                return;
            }
        };
        let Some(token) = envelope.correlation.clone() else {
            warn!(robot = %state.address, "Carry signal without token");
            return;
        };
        let peer = &envelope.sender;

        match signal {
            CarrySignal::Arrived { waypoint } => {
                let actions = match state.leader() {
                    Some(fsm) if fsm.token() == token => fsm.on_helper_arrived(peer, waypoint),
                    _ => {
                        debug!(robot = %state.address, peer = %peer, "Stale arrival");
                        return;
                    }
                };
                Self::apply_leader_actions(myself, state, &token, actions).await;
            }
            CarrySignal::Start { destination } => {
                let actions = match state.helper() {
                    Some(fsm) if fsm.token() == token && fsm.leader() == peer => {
                        fsm.on_start(destination)
                    }
                    _ => {
                        debug!(robot = %state.address, peer = %peer, "Stale start");
                        return;
                    }
                };
                Self::apply_helper_actions(myself, state, actions).await;
            }
            CarrySignal::Finish => {
                let actions = match state.helper() {
                    Some(fsm) if fsm.token() == token && fsm.leader() == peer => fsm.on_finish(),
                    _ => {
                        debug!(robot = %state.address, peer = %peer, "Stale finish");
                        return;
                    }
                };
                Self::apply_helper_actions(myself, state, actions).await;
            }
        }
    }

    /// A leader released us: drop the offer, abort if already helping.
    async fn handle_peer_failure(
        myself: &ActorRef<RobotMessage>,
        state: &mut RobotState,
        envelope: &Envelope,
    ) {
        let peer = &envelope.sender;
        let token = envelope.correlation.as_deref();
        let same = |offer: &HelpOffer| Some(offer.token.as_str()) == token;

        if state.pending.get(peer).is_some_and(same) {
            state.pending.remove(peer);
        }
        if state.confirmed.get(peer).is_some_and(same) {
            state.confirmed.remove(peer);
        }

        let actions = match state.helper() {
            Some(fsm) if Some(fsm.token()) == token && fsm.leader() == peer => fsm.on_finish(),
            _ => {
                debug!(robot = %state.address, leader = %peer, "Released before helping");
                return;
            }
        };
        warn!(robot = %state.address, leader = %peer, "Leader released us mid-carry");
        Self::apply_helper_actions(myself, state, actions).await;
    }

    // ───────────────────────────────────────────────────────────────────────
    // Protocol actions
    // ───────────────────────────────────────────────────────────────────────

    async fn apply_leader_actions(
        myself: &ActorRef<RobotMessage>,
        state: &mut RobotState,
        token: &str,
        actions: Vec<LeaderAction>,
    ) {
        for action in actions {
            match action {
                LeaderAction::Broadcast => Self::broadcast_recruitment(state, token).await,
                LeaderAction::Reply { to, performative } => {
                    let envelope = Envelope::new(state.address.clone(), to, performative)
                        .with_correlation(token);
                    state.bus.send_or_log(envelope).await;
                }
                LeaderAction::Recruited => {
                    state.stop_recruiting();
                    state.backoff_attempt = 0;
                    state.backoff_until = None;
                    let (order_id, helpers) = match state.leader() {
                        Some(fsm) => (fsm.assignment().order_id(), fsm.helpers().to_vec()),
                        None => continue,
                    };
                    info!(robot = %state.address, order_id, helpers = ?helpers, "Helpers recruited");
                    state
                        .telemetry
                        .publish(FactoryEvent::helpers_recruited(
                            state.address.clone(),
                            order_id,
                            helpers,
                        ))
                        .await;
                }
                LeaderAction::MoveTo(target) => Self::start_move(myself, state, &target),
                LeaderAction::Signal { to, signal } => {
                    for helper in to {
                        Self::send_signal(state, helper, token, &signal).await;
                    }
                }
                LeaderAction::Deliver => Self::deliver(state).await,
                LeaderAction::Abandon { release } => {
                    Self::abandon(state, token, release).await;
                }
            }
        }

        let finished = matches!(
            &state.role,
            Some(Role::Leader(fsm))
                if matches!(fsm.state(), LeaderState::Delivered | LeaderState::Abandoned)
        );
        if finished {
            state.stop_recruiting();
            state.role = None;
        }
    }

    async fn broadcast_recruitment(state: &mut RobotState, token: &str) {
        let (request, team, rounds) = match state.leader() {
            Some(fsm) => (
                fsm.assignment().request.clone(),
                fsm.helpers().to_vec(),
                fsm.rounds(),
            ),
            None => return,
        };
        debug!(robot = %state.address, order_id = request.order_id, rounds, "Broadcasting for helpers");

        let peers: Vec<Address> = state
            .peers
            .iter()
            .filter(|p| !team.contains(p))
            .cloned()
            .collect();
        for peer in peers {
            let envelope = Envelope::new(state.address.clone(), peer, Performative::Request)
                .with_correlation(token)
                .with_payload(&request);
            match envelope {
                Ok(envelope) => state.bus.send_or_log(envelope).await,
                Err(e) => {
                    warn!(error = %e, "Failed to encode recruitment request");
                    return;
                }
            }
        }
    }

    async fn abandon(state: &mut RobotState, token: &str, release: Vec<Address>) {
        state.stop_recruiting();
        for helper in release {
            let envelope = Envelope::new(state.address.clone(), helper, Performative::Failure)
                .with_correlation(token);
            state.bus.send_or_log(envelope).await;
        }

        state.backoff_attempt = state.backoff_attempt.saturating_add(1);
        let jitter = Duration::from_millis(state.rng.gen_range(0..=state.robot.backoff_base_ms));
        let backoff = calculate_backoff(
            state.backoff_attempt,
            state.robot.backoff_base_ms,
            state.robot.backoff_max_ms,
        ) + jitter;
        state.backoff_until = Some(Instant::now() + backoff);

        let order_id = state.context.own().map(Assignment::order_id).unwrap_or_default();
        warn!(robot = %state.address, order_id, ?backoff, "Recruitment abandoned");
        state
            .telemetry
            .publish(FactoryEvent::recruitment_abandoned(
                state.address.clone(),
                order_id,
            ))
            .await;
    }

    async fn apply_helper_actions(
        myself: &ActorRef<RobotMessage>,
        state: &mut RobotState,
        actions: Vec<HelperAction>,
    ) {
        for action in actions {
            match action {
                HelperAction::MoveTo(target) => Self::start_move(myself, state, &target),
                HelperAction::Notify(signal) => {
                    let Some(fsm) = state.helper() else {
                        continue;
                    };
                    let leader = fsm.leader().clone();
                    let token = fsm.token().to_string();
                    Self::send_signal(state, leader, &token, &signal).await;
                }
                HelperAction::Finish => {
                    state.stop_motion();
                    let context = std::mem::take(&mut state.context);
                    state.context = context.restore();
                    state.role = None;
                    debug!(robot = %state.address, "Help finished");
                }
            }
        }
    }

    async fn send_signal(state: &RobotState, to: Address, token: &str, signal: &CarrySignal) {
        let envelope = Envelope::new(state.address.clone(), to, Performative::Inform)
            .with_correlation(token)
            .with_payload(signal);
        match envelope {
            Ok(envelope) => state.bus.send_or_log(envelope).await,
            Err(e) => warn!(error = %e, "Failed to encode carry signal"),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Movement
    // ───────────────────────────────────────────────────────────────────────

    fn start_move(myself: &ActorRef<RobotMessage>, state: &mut RobotState, target: &Address) {
        let destination = if let Some(position) = state.sites.get(target) {
            *position
        } else {
            warn!(robot = %state.address, target = %target, "Unknown site, staying put");
            state.position
        };

        state.stop_motion();
        state.motion_seq = state.motion_seq.wrapping_add(1);
        let seq = state.motion_seq;
        let ticker = Ticker::new(state.movement_tick)
            .start(myself.clone(), move || RobotMessage::MoveTick { seq });
        state.motion = Some(Motion {
            seq,
            movement: Movement::new(destination, state.speed, state.movement_tick),
            ticker,
        });
    }

    async fn handle_move_tick(myself: &ActorRef<RobotMessage>, state: &mut RobotState, seq: u64) {
        let step = match &state.motion {
            Some(motion) if motion.seq == seq => motion.movement.step(state.position),
            _ => return,
        };
        state.position = step.position();
        state
            .telemetry
            .publish(FactoryEvent::robot_moved(
                state.address.clone(),
                state.position,
            ))
            .await;

        if step.is_arrived() {
            state.stop_motion();
            Self::on_arrived(myself, state).await;
        }
    }

    async fn on_arrived(myself: &ActorRef<RobotMessage>, state: &mut RobotState) {
        match state.role.as_mut() {
            Some(Role::Solo(SoloLeg::ToSource)) => {
                let Some(destination) = state.context.own().map(|a| a.requester.clone()) else {
                    state.role = None;
                    return;
                };
                state.role = Some(Role::Solo(SoloLeg::ToDestination));
                Self::start_move(myself, state, &destination);
            }
            Some(Role::Solo(SoloLeg::ToDestination)) => {
                Self::deliver(state).await;
                state.role = None;
            }
            Some(Role::Leader(fsm)) => {
                let token = fsm.token().to_string();
                let actions = fsm.on_arrived();
                Self::apply_leader_actions(myself, state, &token, actions).await;
            }
            Some(Role::Helper(fsm)) => {
                let actions = fsm.on_arrived();
                Self::apply_helper_actions(myself, state, actions).await;
            }
            None => debug!(robot = %state.address, "Arrived with nothing to do"),
        }
    }
}
