//! Per-market event dispatch for the UP/DOWN bot.
//!
//! A `DispatchSession` multiplexes stream events for one cycle market:
//! price events are coalesced to at most one pending event per token side
//! and fanned out serially (UP then DOWN); order events are filtered,
//! back-filled, and delivered through a bounded queue. Events from a stale
//! cycle are dropped at the boundary.

pub mod session;

pub use session::{
    DispatchSession, OrderEventHandler, PriceEventHandler, SessionConfig, SessionDrainer,
};
