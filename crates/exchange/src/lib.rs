//! The mutual-post negotiation engine.
//!
//! Tracks one in-flight exchange per identity in memory and drives the
//! forward leg (requester's post into the target channel) and the reverse
//! leg (owner's post back into the requester's channel) through a messaging
//! gateway, persisting an audit record per submitted exchange.

pub mod gateway;
pub mod negotiation;
pub mod service;

pub use {
    gateway::PostGateway,
    negotiation::{Negotiation, Stage},
    service::{ApproveOutcome, DeclineOutcome, ExchangeService, SelectOutcome, SubmitOutcome},
};
