//! What a robot is currently carrying, and for whom.

use industry_core::{Address, OrderId, StageRequest};

/// A fetch job a work-cell gave this robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub request: StageRequest,
    /// The cell that asked; it is also the destination.
    pub requester: Address,
    /// Correlation of the cell's request, echoed on delivery.
    pub correlation: String,
}

impl Assignment {
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.request.order_id
    }

    #[must_use]
    pub const fn tr_count(&self) -> u32 {
        self.request.tr_count
    }
}

/// A robot's active context.
///
/// Helping another robot swaps the borrowed request in and keeps the own
/// assignment aside until the help ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Context {
    #[default]
    Empty,
    Own(Assignment),
    Borrowed {
        leader: Address,
        request: StageRequest,
        saved: Option<Assignment>,
    },
}

impl Context {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The robot's own assignment, whether active or set aside.
    #[must_use]
    pub const fn own(&self) -> Option<&Assignment> {
        match self {
            Self::Own(assignment) => Some(assignment),
            Self::Borrowed { saved, .. } => saved.as_ref(),
            Self::Empty => None,
        }
    }

    /// The request being carried for a leader.
    #[must_use]
    pub const fn borrowed(&self) -> Option<&StageRequest> {
        match self {
            Self::Borrowed { request, .. } => Some(request),
            Self::Empty | Self::Own(_) => None,
        }
    }

    /// Set the own assignment aside and carry `request` for `leader`.
    #[must_use]
    pub fn borrow_for(self, leader: Address, request: StageRequest) -> Self {
        let saved = match self {
            Self::Own(assignment) => Some(assignment),
            Self::Borrowed { saved, .. } => saved,
            Self::Empty => None,
        };
        Self::Borrowed {
            leader,
            request,
            saved,
        }
    }

    /// End a borrow, bringing back whatever was set aside.
    #[must_use]
    pub fn restore(self) -> Self {
        match self {
            Self::Borrowed { saved, .. } => saved.map_or(Self::Empty, Self::Own),
            other => other,
        }
    }
}
