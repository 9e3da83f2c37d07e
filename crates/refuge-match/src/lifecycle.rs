use uuid::Uuid;

use refuge_types::models::MatchStatus;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move a {from} match to {to}")]
    InvalidTransition { from: MatchStatus, to: MatchStatus },

    #[error("only the receiving party can answer a match request")]
    NotRecipient,

    #[error("only the initiator can cancel a match")]
    NotInitiator,

    #[error("not a participant of this match")]
    NotParticipant,
}

impl TransitionError {
    /// Permission failures as opposed to state conflicts.
    pub fn is_forbidden(&self) -> bool {
        !matches!(self, TransitionError::InvalidTransition { .. })
    }
}

/// Edges of the match state machine.
pub fn can_transition(from: MatchStatus, to: MatchStatus) -> bool {
    use MatchStatus::*;
    matches!(
        (from, to),
        (Pending, Accepted)
            | (Pending, Rejected)
            | (Accepted, Completed)
            | (Pending, Cancelled)
            | (Accepted, Cancelled)
    )
}

/// Everyone with a stake in a match.
#[derive(Debug, Clone, Copy)]
pub struct MatchParties {
    pub initiated_by: Uuid,
    pub responded_by: Option<Uuid>,
    /// Owner of the referenced need, if the match names one.
    pub need_owner: Option<Uuid>,
    /// Owner of the referenced offer, if the match names one.
    pub offer_owner: Option<Uuid>,
}

impl MatchParties {
    pub fn is_participant(&self, user: Uuid) -> bool {
        self.initiated_by == user
            || self.responded_by == Some(user)
            || self.need_owner == Some(user)
            || self.offer_owner == Some(user)
    }

    /// An owner of a referenced need/offer who did not start the match.
    pub fn is_recipient(&self, user: Uuid) -> bool {
        user != self.initiated_by
            && (self.need_owner == Some(user) || self.offer_owner == Some(user))
    }

    /// The users who should hear about a change made by `actor`.
    pub fn counterparts(&self, actor: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        for user in [
            Some(self.initiated_by),
            self.responded_by,
            self.need_owner,
            self.offer_owner,
        ]
        .into_iter()
        .flatten()
        {
            if user != actor && !out.contains(&user) {
                out.push(user);
            }
        }
        out
    }
}

/// Checks that `actor` may move a match from `current` to `target`.
///
/// Accept and reject belong to the recipient, completion to any participant
/// of an accepted match, cancellation to the initiator.
pub fn authorize_response(
    current: MatchStatus,
    target: MatchStatus,
    parties: &MatchParties,
    actor: Uuid,
) -> Result<(), TransitionError> {
    if !parties.is_participant(actor) {
        return Err(TransitionError::NotParticipant);
    }

    if !can_transition(current, target) {
        return Err(TransitionError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    match target {
        MatchStatus::Accepted | MatchStatus::Rejected if !parties.is_recipient(actor) => {
            Err(TransitionError::NotRecipient)
        }
        MatchStatus::Cancelled if actor != parties.initiated_by => {
            Err(TransitionError::NotInitiator)
        }
        _ => Ok(()),
    }
}
