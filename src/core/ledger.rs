use super::types::{LedgerSnapshot, PortfolioState, PriceObservation};

/// Running state of one simulation plus the snapshot recorded for every period.
#[derive(Debug, Clone, Default)]
pub struct PortfolioLedger {
    state: PortfolioState,
    snapshots: Vec<LedgerSnapshot>,
}

impl PortfolioLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(periods: usize) -> Self {
        Self {
            state: PortfolioState::default(),
            snapshots: Vec::with_capacity(periods),
        }
    }

    /// Deposits `contribution`, buys as many whole shares as the cash covers at
    /// this period's price and records the resulting snapshot.
    pub fn advance_period(
        &mut self,
        observation: &PriceObservation,
        contribution: f64,
    ) -> LedgerSnapshot {
        self.deposit(contribution);
        let shares_acquired = self.buy_whole_shares(observation.price);

        let snapshot = LedgerSnapshot {
            period_index: observation.period_index,
            date: observation.date,
            price: observation.price,
            contribution,
            asset_value: self.state.asset_value(observation.price),
            shares_owned: self.state.shares_owned,
            shares_acquired,
            available_cash: self.state.available_cash,
            total_contributed: self.state.total_contributed,
        };
        self.snapshots.push(snapshot);
        snapshot
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn snapshots(&self) -> &[LedgerSnapshot] {
        &self.snapshots
    }

    pub fn last(&self) -> Option<&LedgerSnapshot> {
        self.snapshots.last()
    }

    pub fn into_snapshots(self) -> Vec<LedgerSnapshot> {
        self.snapshots
    }

    fn deposit(&mut self, amount: f64) {
        self.state.total_contributed += amount;
        self.state.available_cash += amount;
    }

    fn buy_whole_shares(&mut self, price: f64) -> u64 {
        let cash = self.state.available_cash;
        if cash < price {
            return 0;
        }

        let mut shares = (cash / price).floor();
        let mut remainder = cash - shares * price;
        // The division can round across an integer boundary; keep 0 <= remainder < price.
        if remainder < 0.0 {
            shares -= 1.0;
            remainder += price;
        } else if remainder >= price {
            shares += 1.0;
            remainder -= price;
        }

        let shares = shares as u64;
        self.state.shares_owned += shares;
        self.state.available_cash = remainder.max(0.0);
        shares
    }
}
