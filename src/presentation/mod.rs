pub mod signals;
pub mod wasm_api;

pub use signals::{ChartSignals, chart_signals};
pub use wasm_api::{ChartViewportEngine, event_to_json};
