//! Market data aggregate: value objects, the canonical store and the pure
//! services that derive display data from it.

pub mod entities;
pub mod indicator_engine;
pub mod services;
pub mod store;
pub mod trading_hours;
pub mod value_objects;

pub use entities::*;
pub use indicator_engine::{IndicatorBundle, IndicatorConfig, IndicatorSeries, StdDevMode};
pub use services::{DataPointValidator, Downsampler, HeikinAshi};
pub use store::{TimeSeriesStore, merge};
pub use trading_hours::TradingHours;
pub use value_objects::*;
