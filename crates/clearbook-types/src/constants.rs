//! System-wide constants for the ClearBook trading core.

/// Maximum decimal precision for prices (8 decimal places).
pub const PRICE_PRECISION: u32 = 8;

/// Maximum decimal precision for quantities (8 decimal places).
pub const QTY_PRECISION: u32 = 8;

/// Default maker fee in basis points (0.1%).
pub const DEFAULT_MAKER_FEE_BPS: i64 = 10;

/// Default taker fee in basis points (0.2%).
pub const DEFAULT_TAKER_FEE_BPS: i64 = 20;

/// Default worst-case slippage allowance for market buys, in basis
/// points over the reference ask (5%).
pub const DEFAULT_MARKET_SLIPPAGE_BPS: i64 = 500;

/// Default command queue depth for each pair sequencer.
pub const DEFAULT_SEQUENCER_QUEUE_DEPTH: usize = 1024;

/// Default queue depth for the wallet approval event channel.
pub const DEFAULT_APPROVAL_QUEUE_DEPTH: usize = 256;

/// 30-day caps default to this multiple of the 24-hour cap.
pub const MONTH_CAP_MULTIPLIER: i64 = 20;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "ClearBook";
