use std::time::Instant;

use crosspost_common::types::{PostContent, UserId};

/// Stage of a mutual-post exchange. Transitions are strictly forward; the
/// variant order defines the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Target channel picked, waiting for the requester's content.
    Selected,
    /// Approval request delivered to the channel owner.
    TemplateSubmitted,
    /// Owner approved; waiting for the owner's reciprocal content.
    AwaitingReverse,
    /// Exchange finished. Completed negotiations are removed from the map,
    /// so this stage is never observable from outside the engine.
    Completed,
}

/// One in-flight exchange, keyed by the identity that drives its next step:
/// the requester until approval, then the owner for the reverse leg.
#[derive(Debug, Clone)]
pub struct Negotiation {
    pub requester_id: UserId,
    /// Channel the next publish goes to. For the forward leg this is the
    /// channel the requester picked; for the reverse leg it is the
    /// requester's own channel.
    pub target_channel: String,
    pub content: Option<PostContent>,
    pub stage: Stage,
    /// Last activity, used by idle eviction.
    pub touched_at: Instant,
}

impl Negotiation {
    pub fn new(requester_id: UserId, target_channel: impl Into<String>, stage: Stage) -> Self {
        Self {
            requester_id,
            target_channel: target_channel.into(),
            content: None,
            stage,
            touched_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_order_forward() {
        assert!(Stage::Selected < Stage::TemplateSubmitted);
        assert!(Stage::TemplateSubmitted < Stage::AwaitingReverse);
        assert!(Stage::AwaitingReverse < Stage::Completed);
    }

    #[test]
    fn new_negotiation_has_no_content() {
        let n = Negotiation::new(1, "alpha", Stage::Selected);
        assert_eq!(n.stage, Stage::Selected);
        assert!(n.content.is_none());
        assert_eq!(n.target_channel, "alpha");
    }
}
