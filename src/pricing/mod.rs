//! Tariff engine for energy cost calculation
//!
//! Converts excess energy into money at a flat energy rate, projects weekly
//! figures to a year, and prices peak demand when the tariff has a demand
//! charge.

use crate::core::TariffConfig;

/// Weeks used to annualize a weekly figure
pub const WEEKS_PER_YEAR: f64 = 52.0;

/// Tariff engine that calculates electricity costs
#[derive(Debug, Clone)]
pub struct TariffEngine {
    config: TariffConfig,
}

impl TariffEngine {
    /// Create a new tariff engine with the given configuration
    pub fn new(config: &TariffConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Rate per kWh
    pub fn rate(&self) -> f64 {
        self.config.default_rate
    }

    /// Calculate cost for a given energy consumption in kWh
    pub fn calculate_cost(&self, kwh: f64) -> f64 {
        kwh * self.config.default_rate
    }

    /// Project a weekly amount to a year
    pub fn annualize(&self, weekly: f64) -> f64 {
        weekly * WEEKS_PER_YEAR
    }

    /// Annual cost of a recurring weekly energy amount
    pub fn annual_cost(&self, weekly_kwh: f64) -> f64 {
        self.annualize(self.calculate_cost(weekly_kwh))
    }

    /// Monthly demand charge for a peak, if the tariff bills demand
    pub fn demand_charge(&self, peak_kw: f64) -> Option<f64> {
        self.config.demand_charge.map(|charge| peak_kw * charge)
    }

    /// Human-readable note on the demand-charge exposure of a peak
    pub fn demand_charge_note(&self, peak_kw: f64) -> String {
        match self.demand_charge(peak_kw) {
            Some(charge) => format!("Plus potential demand charges: ${:.2}/month", charge),
            None => "May also impact demand charges if applicable".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tariff(rate: f64, demand: Option<f64>) -> TariffEngine {
        TariffEngine::new(&TariffConfig { default_rate: rate, demand_charge: demand })
    }

    #[test]
    fn test_flat_rate() {
        let engine = tariff(0.20, None);

        assert_eq!(engine.rate(), 0.20);
        assert_eq!(engine.calculate_cost(1.0), 0.20);
        assert_eq!(engine.calculate_cost(10.0), 2.0);
    }

    #[test]
    fn test_annualize() {
        let engine = tariff(0.10, None);

        assert_eq!(engine.annualize(3.0), 156.0);
        // 100 kWh/week at $0.10 = $10/week = $520/year
        assert!((engine.annual_cost(100.0) - 520.0).abs() < 1e-9);
    }

    #[test]
    fn test_demand_charge() {
        let engine = tariff(0.12, Some(15.0));
        assert_eq!(engine.demand_charge(40.0), Some(600.0));
        assert_eq!(engine.demand_charge_note(40.0), "Plus potential demand charges: $600.00/month");

        let engine = tariff(0.12, None);
        assert_eq!(engine.demand_charge(40.0), None);
        assert_eq!(engine.demand_charge_note(40.0), "May also impact demand charges if applicable");
    }
}
