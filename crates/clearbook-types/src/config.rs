//! Configuration types for the ClearBook trading core.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{constants, AccountId, Pair, TierTable};

/// Per-pair trading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    /// Base asset (e.g., "BTC").
    pub base: String,
    /// Quote asset (e.g., "USDT").
    pub quote: String,
    /// Minimum order size in base asset.
    pub min_order_size: Decimal,
}

impl PairConfig {
    /// Create a default BTC/USDT pair config.
    #[must_use]
    pub fn btc_usdt() -> Self {
        Self {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
            min_order_size: Decimal::new(1, 5), // 0.00001 BTC
        }
    }

    /// Create a default ETH/USDT pair config.
    #[must_use]
    pub fn eth_usdt() -> Self {
        Self {
            base: "ETH".to_string(),
            quote: "USDT".to_string(),
            min_order_size: Decimal::new(1, 4), // 0.0001 ETH
        }
    }

    /// The pair this config describes.
    #[must_use]
    pub fn pair(&self) -> Pair {
        Pair::new(self.base.clone(), self.quote.clone())
    }

    /// Returns the pair symbol (e.g., "BTC/USDT").
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

/// Trading fee rates and the account that collects them.
///
/// Fees are charged on the asset each side receives and are rounded
/// toward zero, so the venue never over-collects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fee rate applied to the maker's credited amount.
    pub maker_rate: Decimal,
    /// Fee rate applied to the taker's credited amount.
    pub taker_rate: Decimal,
    /// Account credited with collected fees.
    pub fee_account: AccountId,
}

impl FeeSchedule {
    /// The standard schedule: 0.1% maker, 0.2% taker.
    #[must_use]
    pub fn standard(fee_account: AccountId) -> Self {
        Self {
            maker_rate: Decimal::new(constants::DEFAULT_MAKER_FEE_BPS, 4),
            taker_rate: Decimal::new(constants::DEFAULT_TAKER_FEE_BPS, 4),
            fee_account,
        }
    }

    /// A zero-fee schedule. Test / sandbox use.
    #[must_use]
    pub fn free(fee_account: AccountId) -> Self {
        Self {
            maker_rate: Decimal::ZERO,
            taker_rate: Decimal::ZERO,
            fee_account,
        }
    }

    /// Fee charged on a maker credit of `amount`.
    #[must_use]
    pub fn maker_fee(&self, amount: Decimal) -> Decimal {
        round_fee(amount * self.maker_rate)
    }

    /// Fee charged on a taker credit of `amount`.
    #[must_use]
    pub fn taker_fee(&self, amount: Decimal) -> Decimal {
        round_fee(amount * self.taker_rate)
    }
}

fn round_fee(raw: Decimal) -> Decimal {
    raw.round_dp_with_strategy(constants::QTY_PRECISION, RoundingStrategy::ToZero)
}

/// Top-level configuration for an exchange instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Tradeable pairs.
    pub pairs: Vec<PairConfig>,
    /// Fee rates and collection account.
    pub fees: FeeSchedule,
    /// Tier → limit caps table.
    pub tiers: TierTable,
    /// Worst-case slippage allowance over the reference ask when
    /// reserving for a market buy.
    pub market_slippage: Decimal,
    /// Command queue depth for each pair sequencer.
    pub sequencer_queue_depth: usize,
    /// Queue depth for the wallet approval event channel.
    pub approval_queue_depth: usize,
}

impl ExchangeConfig {
    /// Default config: BTC/USDT and ETH/USDT, standard fees, default
    /// tier table.
    #[must_use]
    pub fn new(fee_account: AccountId) -> Self {
        Self {
            pairs: vec![PairConfig::btc_usdt(), PairConfig::eth_usdt()],
            fees: FeeSchedule::standard(fee_account),
            tiers: TierTable::default(),
            market_slippage: Decimal::new(constants::DEFAULT_MARKET_SLIPPAGE_BPS, 4),
            sequencer_queue_depth: constants::DEFAULT_SEQUENCER_QUEUE_DEPTH,
            approval_queue_depth: constants::DEFAULT_APPROVAL_QUEUE_DEPTH,
        }
    }

    /// Look up the config for a pair symbol, if listed.
    #[must_use]
    pub fn pair(&self, symbol: &str) -> Option<&PairConfig> {
        self.pairs.iter().find(|p| p.symbol() == symbol)
    }
}
