//! revrecon-core — transaction reconciliation and attribution engine.
//!
//! Ingests payment events from several independent providers (card
//! processor, bank feed, membership platform), normalizes them into one
//! canonical shape, stores them idempotently, matches each to a customer
//! identity through a fixed tier order, routes the rest into a manual
//! queue, and keeps lifetime-value totals derived from the confirmed
//! transaction set.
//!
//! RULES:
//!   - Only the store module talks to the database.
//!   - Normalizers are pure; rejection happens before storage.
//!   - LTV fields are derived state, written only by the aggregator.
//!   - Ambiguity is never resolved by guessing: it goes to the queue.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod intake;
pub mod ltv;
pub mod matching;
pub mod normalize;
pub mod providers;
pub mod queue;
pub mod store;
pub mod transaction;
pub mod types;
