//! Transport robots: solo carries and Leader/Helper cooperative transport.

mod actor;
mod context;
mod negotiation;

pub use actor::{RobotArguments, RobotState, TransportRobotActorDef, is_willing};
pub use context::{Assignment, Context};
pub use negotiation::{
    Admission, CarrySignal, HelperAction, HelperFsm, HelperState, LeaderAction, LeaderFsm,
    LeaderState, Recruitment, Rendezvous, Waypoint,
};
