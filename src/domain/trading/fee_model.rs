use std::fmt::Debug;

/// Venue fee charged on one leg of a trade.
///
/// Pluggable because the real venue's fee curve is still being verified
/// against live fills; the simulator only ever calls through this trait.
pub trait FeeModel: Debug + Send + Sync {
    /// Fee in dollars for one leg executed at `price` (a 0-1 contract price)
    /// with `notional` dollars of size.
    fn fee(&self, price: f64, notional: f64) -> f64;

    /// Get description of the fee model
    fn description(&self) -> String;
}

/// Kalshi-style convex taker fee: `rate * price * (1 - price) * notional`,
/// rounded up to the next `min_increment` whenever a non-zero fee is due.
/// The curve peaks at p=0.5 and vanishes toward the extremes, mirroring the
/// venue's published schedule.
#[derive(Debug, Clone)]
pub struct KalshiFeeModel {
    pub rate: f64,
    pub min_increment: f64,
}

impl KalshiFeeModel {
    pub fn new(rate: f64, min_increment: f64) -> Self {
        Self {
            rate,
            min_increment,
        }
    }
}

impl FeeModel for KalshiFeeModel {
    fn fee(&self, price: f64, notional: f64) -> f64 {
        let raw = self.rate * price * (1.0 - price) * notional;
        if raw <= 0.0 || self.min_increment <= 0.0 {
            return raw.max(0.0);
        }
        // Round up to the venue's smallest fee increment.
        (raw / self.min_increment).ceil() * self.min_increment
    }

    fn description(&self) -> String {
        format!(
            "Kalshi convex fee (rate: {:.2}%, increment: ${:.2})",
            self.rate * 100.0,
            self.min_increment
        )
    }
}

/// Flat proportional fee, kept for sensitivity checks against the convex curve.
#[derive(Debug, Clone)]
pub struct FlatFeeModel {
    pub rate: f64,
}

impl FlatFeeModel {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

impl FeeModel for FlatFeeModel {
    fn fee(&self, price: f64, notional: f64) -> f64 {
        (self.rate * price * notional).max(0.0)
    }

    fn description(&self) -> String {
        format!("Flat fee (rate: {:.2}%)", self.rate * 100.0)
    }
}
