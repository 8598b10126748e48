//! The negotiation service: per-identity state map plus every legal
//! transition of the exchange lifecycle.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use {anyhow::Result, tracing::{debug, info, warn}};

use {
    crosspost_common::types::{PostContent, UserId},
    crosspost_directory::{ChannelDirectory, RequestLog, RequestStatus},
};

use crate::{
    gateway::PostGateway,
    negotiation::{Negotiation, Stage},
};

/// Result of picking a target channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Negotiation created (replacing any prior one); prompt for content.
    Selected { channel: String },
    /// The requester owns the target channel; nothing was created.
    SelfTarget { channel: String },
    /// The channel is not registered; nothing was created.
    UnknownChannel { channel: String },
}

/// Result of submitting content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Approval request delivered to the channel owner.
    Forwarded { channel: String },
    /// Reverse leg published; the exchange is finished for this identity.
    ReverseCompleted { channel: String },
    /// No negotiation in progress for this identity.
    NoActiveRequest,
    /// The target channel's owner could no longer be resolved.
    OwnerNotFound { channel: String },
    /// The gateway call failed; the stage was not advanced, resubmitting
    /// retries the same step.
    DeliveryFailed { channel: String },
}

/// Result of an owner approving a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    /// Forward leg published and recorded. `reverse_channel` is the channel
    /// the owner is now expected to post back to, or `None` if the requester
    /// has no registered channel to reciprocate into.
    Approved {
        channel: String,
        reverse_channel: Option<String>,
    },
    /// No matching negotiation awaiting approval.
    NoPendingRequest,
    /// Publishing to the channel failed; the negotiation stays submitted.
    PublishFailed { channel: String },
}

/// Result of an owner declining a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclineOutcome {
    Declined { channel: String },
}

/// Owns the identity → [`Negotiation`] map and drives the exchange
/// lifecycle end to end.
///
/// At most one negotiation exists per identity; starting a new selection
/// overwrites any prior one, and an approval installs the reverse-leg
/// negotiation under the owner's identity (overwriting silently — the
/// single-slot-per-identity constraint).
pub struct ExchangeService {
    /// Synchronous map guarded by a std mutex; never held across `.await`.
    /// Transitions are decided under the lock, gateway calls run unlocked,
    /// and the advance is committed under the lock only if the entry still
    /// matches.
    negotiations: Mutex<HashMap<UserId, Negotiation>>,
    directory: Arc<dyn ChannelDirectory>,
    requests: Arc<dyn RequestLog>,
    gateway: Arc<dyn PostGateway>,
}

impl ExchangeService {
    pub fn new(
        directory: Arc<dyn ChannelDirectory>,
        requests: Arc<dyn RequestLog>,
        gateway: Arc<dyn PostGateway>,
    ) -> Self {
        Self {
            negotiations: Mutex::new(HashMap::new()),
            directory,
            requests,
            gateway,
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<UserId, Negotiation>> {
        self.negotiations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current (channel, stage) for an identity, if a negotiation exists.
    pub fn snapshot(&self, user: UserId) -> Option<(String, Stage)> {
        self.map()
            .get(&user)
            .map(|n| (n.target_channel.clone(), n.stage))
    }

    /// Pick a target channel, creating (or overwriting) the requester's
    /// negotiation in [`Stage::Selected`].
    pub async fn select_channel(&self, requester: UserId, channel: &str) -> Result<SelectOutcome> {
        let Some(owner) = self.directory.resolve_owner(channel).await? else {
            return Ok(SelectOutcome::UnknownChannel {
                channel: channel.to_string(),
            });
        };
        if owner == requester {
            debug!(requester, channel, "rejecting self-targeted exchange");
            return Ok(SelectOutcome::SelfTarget {
                channel: channel.to_string(),
            });
        }

        self.map()
            .insert(requester, Negotiation::new(requester, channel, Stage::Selected));
        info!(requester, channel, "exchange opened");
        Ok(SelectOutcome::Selected {
            channel: channel.to_string(),
        })
    }

    /// Submit content for the identity's current negotiation.
    ///
    /// From [`Stage::Selected`] (or [`Stage::TemplateSubmitted`], the retry
    /// path) this forwards an approval request to the target owner; from
    /// [`Stage::AwaitingReverse`] it publishes the reverse leg and finishes
    /// the exchange.
    pub async fn submit_content(&self, user: UserId, content: PostContent) -> Result<SubmitOutcome> {
        // Store the content and snapshot the step under the lock.
        let (stage, channel) = {
            let mut map = self.map();
            match map.get_mut(&user) {
                Some(n) if n.stage != Stage::Completed => {
                    n.content = Some(content.clone());
                    n.touched_at = Instant::now();
                    (n.stage, n.target_channel.clone())
                },
                _ => return Ok(SubmitOutcome::NoActiveRequest),
            }
        };

        match stage {
            Stage::Selected | Stage::TemplateSubmitted => {
                let Some(owner) = self.directory.resolve_owner(&channel).await? else {
                    // Channel vanished between selection and submission; the
                    // negotiation is left in place, nothing destructive happened.
                    return Ok(SubmitOutcome::OwnerNotFound { channel });
                };

                if owner == user {
                    // Stale request where the submitter meanwhile owns the
                    // target: route as the reverse leg.
                    return self.publish_reverse(user, channel, content).await;
                }

                match self
                    .gateway
                    .send_approval_request(owner, &channel, user, &content)
                    .await
                {
                    Ok(()) => {
                        // Record once, on the first successful forward.
                        if stage == Stage::Selected
                            && let Err(e) = self
                                .requests
                                .record(user, &channel, &content, RequestStatus::Pending)
                                .await
                        {
                            warn!(user, channel, "failed to record post request: {e:#}");
                        }
                        self.advance(user, &channel, Stage::TemplateSubmitted);
                        info!(user, channel, owner, "approval request forwarded");
                        Ok(SubmitOutcome::Forwarded { channel })
                    },
                    Err(e) => {
                        warn!(user, channel, owner, "approval request delivery failed: {e:#}");
                        Ok(SubmitOutcome::DeliveryFailed { channel })
                    },
                }
            },
            Stage::AwaitingReverse => self.publish_reverse(user, channel, content).await,
            Stage::Completed => Ok(SubmitOutcome::NoActiveRequest),
        }
    }

    /// Owner accepts a pending request: publish the forward leg, persist the
    /// completed status, notify the requester, and install the reverse-leg
    /// negotiation under the owner's identity.
    pub async fn approve(
        &self,
        owner: UserId,
        requester: UserId,
        channel: &str,
    ) -> Result<ApproveOutcome> {
        let content = {
            let map = self.map();
            match map.get(&requester) {
                Some(n)
                    if n.stage == Stage::TemplateSubmitted && n.target_channel == channel =>
                {
                    match &n.content {
                        Some(c) => c.clone(),
                        None => return Ok(ApproveOutcome::NoPendingRequest),
                    }
                },
                _ => return Ok(ApproveOutcome::NoPendingRequest),
            }
        };

        if let Err(e) = self.gateway.publish(channel, &content).await {
            warn!(requester, channel, "forward publish failed: {e:#}");
            let _ = self
                .gateway
                .send_user(
                    requester,
                    &format!("Your post could not be published in @{channel}. Please try again later."),
                )
                .await;
            return Ok(ApproveOutcome::PublishFailed {
                channel: channel.to_string(),
            });
        }

        // Publish succeeded — only now flip the persisted status.
        if let Err(e) = self
            .requests
            .update_status(requester, channel, RequestStatus::Completed)
            .await
        {
            warn!(requester, channel, "failed to persist completed status: {e:#}");
        }

        // Notify-only failure does not roll anything back.
        if let Err(e) = self
            .gateway
            .send_user(
                requester,
                &format!("Your post has been published in @{channel}."),
            )
            .await
        {
            warn!(requester, "failed to notify requester of approval: {e:#}");
        }

        // The reverse leg targets the requester's first registered channel.
        let reverse_channel = self.directory.list_owned(requester).await?.into_iter().next();

        {
            let mut map = self.map();
            // A fresh select_channel during the awaited publish wins; clear
            // the slot only if it still holds the approved request.
            if map
                .get(&requester)
                .is_some_and(|n| n.target_channel == channel && n.stage == Stage::TemplateSubmitted)
            {
                map.remove(&requester);
            }
            if let Some(rc) = &reverse_channel {
                map.insert(owner, Negotiation::new(owner, rc.clone(), Stage::AwaitingReverse));
            }
        }
        info!(owner, requester, channel, reverse = ?reverse_channel, "exchange approved");

        Ok(ApproveOutcome::Approved {
            channel: channel.to_string(),
            reverse_channel,
        })
    }

    /// Owner declines a pending request: notify the requester, persist the
    /// declined status, and clear the requester's negotiation.
    pub async fn decline(
        &self,
        owner: UserId,
        requester: UserId,
        channel: &str,
    ) -> Result<DeclineOutcome> {
        {
            let mut map = self.map();
            if map.get(&requester).is_some_and(|n| n.target_channel == channel) {
                map.remove(&requester);
            }
        }

        if let Err(e) = self
            .requests
            .update_status(requester, channel, RequestStatus::Declined)
            .await
        {
            warn!(requester, channel, "failed to persist declined status: {e:#}");
        }

        if let Err(e) = self
            .gateway
            .send_user(
                requester,
                &format!("Your mutual-post request for @{channel} was declined."),
            )
            .await
        {
            warn!(requester, "failed to notify requester of decline: {e:#}");
        }

        info!(owner, requester, channel, "exchange declined");
        Ok(DeclineOutcome::Declined {
            channel: channel.to_string(),
        })
    }

    /// Remove negotiations untouched for longer than `ttl`. Returns how many
    /// were evicted.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut map = self.map();
        let before = map.len();
        map.retain(|_, n| now.duration_since(n.touched_at) < ttl);
        let evicted = before - map.len();
        if evicted > 0 {
            info!(evicted, "evicted idle negotiations");
        }
        evicted
    }

    /// Publish the reverse leg and finish the exchange for this identity.
    async fn publish_reverse(
        &self,
        user: UserId,
        channel: String,
        content: PostContent,
    ) -> Result<SubmitOutcome> {
        match self.gateway.publish(&channel, &content).await {
            Ok(()) => {
                let mut map = self.map();
                if map.get(&user).is_some_and(|n| n.target_channel == channel) {
                    map.remove(&user);
                }
                info!(user, channel, "reverse leg published, exchange complete");
                Ok(SubmitOutcome::ReverseCompleted { channel })
            },
            Err(e) => {
                warn!(user, channel, "reverse publish failed: {e:#}");
                Ok(SubmitOutcome::DeliveryFailed { channel })
            },
        }
    }

    /// Commit a forward stage advance, unless the entry was replaced while
    /// the gateway call ran.
    fn advance(&self, user: UserId, channel: &str, next: Stage) {
        let mut map = self.map();
        if let Some(n) = map.get_mut(&user)
            && n.target_channel == channel
            && n.stage < next
        {
            n.stage = next;
            n.touched_at = Instant::now();
        }
    }

    #[cfg(test)]
    fn backdate(&self, user: UserId, age: Duration) {
        if let Some(n) = self.map().get_mut(&user) {
            n.touched_at = Instant::now() - age;
        }
    }
}
