//! Core domain types for the UP/DOWN cycle trading bot.
//!
//! This crate provides fundamental types used throughout the trading system:
//! - `Cents`, `Pips`: integer fixed-point price units
//! - `TokenSide`, `OrderSide`: trading enums
//! - `Order`, `OrderStatus`: order lifecycle types
//! - `Position`: open inventory with cost-basis accounting
//! - `MarketPair`, `CycleSpec`: time-boxed market identification and slugs
//! - `MultiLegRequest`: multi-leg execution requests with hedge config

pub mod error;
pub mod events;
pub mod gateway;
pub mod market;
pub mod order;
pub mod position;
pub mod price;
pub mod request;
pub mod side;

pub use error::{CoreError, Result};
pub use events::PriceChangedEvent;
pub use gateway::{
    BalanceRefresher, BookReader, BookSource, GatewayError, OrderCanceler, OrderGateway,
    OrderPlacer, OrderReader, PositionLookup, SetMerger, TopOfBook,
};
pub use market::{CycleSpec, MarketPair, SlugStyle, Timeframe};
pub use order::{NewOrder, Order, OrderId, OrderStatus, OrderType, Size};
pub use position::{Position, PositionStatus};
pub use price::{Cents, Pips, PIPS_PER_CENT};
pub use request::{AutoHedgeConfig, LegIntent, MultiLegRequest};
pub use side::{OrderSide, TokenSide};
