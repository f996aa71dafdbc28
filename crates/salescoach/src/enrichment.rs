//! Strategic enrichment: pure, synchronous context blocks composed into the
//! Slow Path prompt. Each block sources only from injected [`MarketData`]
//! (no I/O in the hot path) and is independently toggleable; a failing or
//! empty block is simply omitted.

use crate::domain::Language;

/// Cached market intelligence injected at startup or refreshed out of band.
#[derive(Debug, Clone)]
pub struct MarketData {
    /// PLN per liter of petrol.
    pub fuel_price_per_liter: f64,
    /// PLN per kWh of home charging.
    pub electricity_price_per_kwh: f64,
    /// Assumed combustion consumption, liters per 100 km.
    pub combustion_l_per_100km: f64,
    /// Assumed EV consumption, kWh per 100 km.
    pub ev_kwh_per_100km: f64,
    /// Reference yearly distance for the TCO comparison.
    pub reference_km_per_year: f64,
    pub subsidy_name: String,
    /// Maximum subsidy amount in PLN.
    pub subsidy_amount: f64,
    /// Days until the subsidy program closes, when known.
    pub subsidy_deadline_days: Option<i64>,
    pub region: String,
    pub ev_registrations_last_quarter: u32,
    pub public_chargers_in_region: u32,
}

impl Default for MarketData {
    fn default() -> Self {
        Self {
            fuel_price_per_liter: 6.50,
            electricity_price_per_kwh: 0.80,
            combustion_l_per_100km: 8.0,
            ev_kwh_per_100km: 15.0,
            reference_km_per_year: 20_000.0,
            subsidy_name: "NaszEauto".to_string(),
            subsidy_amount: 18_750.0,
            subsidy_deadline_days: None,
            region: "śląskie".to_string(),
            ev_registrations_last_quarter: 0,
            public_chargers_in_region: 0,
        }
    }
}

/// Which blocks are composed. All on by default.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentToggles {
    pub fuel_prices: bool,
    pub subsidies: bool,
    pub regional: bool,
    pub urgency: bool,
}

impl Default for EnrichmentToggles {
    fn default() -> Self {
        Self {
            fuel_prices: true,
            subsidies: true,
            regional: true,
            urgency: true,
        }
    }
}

/// Yearly running-cost comparison between combustion and EV.
pub fn fuel_cost_block(data: &MarketData) -> Option<String> {
    if data.fuel_price_per_liter <= 0.0 || data.reference_km_per_year <= 0.0 {
        return None;
    }
    let per_hundred = data.reference_km_per_year / 100.0;
    let combustion = per_hundred * data.combustion_l_per_100km * data.fuel_price_per_liter;
    let electric = per_hundred * data.ev_kwh_per_100km * data.electricity_price_per_kwh;
    let savings = combustion - electric;
    Some(format!(
        "Fuel economics ({} km/yr): combustion {:.0} PLN/yr at {:.2} PLN/l vs EV {:.0} PLN/yr at {:.2} PLN/kWh; yearly savings {:.0} PLN.",
        data.reference_km_per_year as i64,
        combustion,
        data.fuel_price_per_liter,
        electric,
        data.electricity_price_per_kwh,
        savings
    ))
}

/// Subsidy program status with its expiration clock.
pub fn subsidy_block(data: &MarketData) -> Option<String> {
    if data.subsidy_amount <= 0.0 {
        return None;
    }
    let deadline = match data.subsidy_deadline_days {
        Some(days) if days >= 0 => format!("closes in {} days", days),
        _ => "no announced deadline".to_string(),
    };
    Some(format!(
        "Subsidy program {}: up to {:.0} PLN, {}.",
        data.subsidy_name, data.subsidy_amount, deadline
    ))
}

/// Regional registrations and charging coverage.
pub fn regional_block(data: &MarketData) -> Option<String> {
    if data.ev_registrations_last_quarter == 0 && data.public_chargers_in_region == 0 {
        return None;
    }
    Some(format!(
        "Region {}: {} EV registrations last quarter, {} public charge points.",
        data.region, data.ev_registrations_last_quarter, data.public_chargers_in_region
    ))
}

/// How urgent a purchase decision is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrgencyLevel {
    Cold,
    Warm,
    Hot,
    Burning,
}

impl UrgencyLevel {
    fn from_score(score: u32) -> Self {
        match score {
            0..=24 => UrgencyLevel::Cold,
            25..=49 => UrgencyLevel::Warm,
            50..=74 => UrgencyLevel::Hot,
            _ => UrgencyLevel::Burning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Cold => "cold",
            UrgencyLevel::Warm => "warm",
            UrgencyLevel::Hot => "hot",
            UrgencyLevel::Burning => "burning",
        }
    }
}

/// Weighted urgency score: the cost of waiting another month.
#[derive(Debug, Clone)]
pub struct UrgencyScore {
    /// 0–100.
    pub score: u32,
    pub level: UrgencyLevel,
    /// Estimated PLN lost per month of delay.
    pub monthly_delay_cost: f64,
}

/// Scores urgency from monthly fuel savings (weight 35), the subsidy clock
/// (weight 30) and a neutral base for the unknown factors.
pub fn urgency_score(data: &MarketData) -> UrgencyScore {
    let monthly_km = data.reference_km_per_year / 12.0;
    let per_hundred = monthly_km / 100.0;
    let monthly_fuel = per_hundred * data.combustion_l_per_100km * data.fuel_price_per_liter;
    let monthly_electric = per_hundred * data.ev_kwh_per_100km * data.electricity_price_per_kwh;
    let monthly_savings = (monthly_fuel - monthly_electric).max(0.0);

    // 1000 PLN/month of savings saturates the fuel factor.
    let fuel_points = ((monthly_savings / 1000.0) * 35.0).min(35.0);

    let (subsidy_points, subsidy_monthly_cost) = match data.subsidy_deadline_days {
        Some(days) if days <= 30 => (30.0, data.subsidy_amount),
        Some(days) if days <= 60 => (20.0, data.subsidy_amount / 2.0),
        Some(days) if days <= 90 => (10.0, data.subsidy_amount / 3.0),
        Some(_) => (5.0, 0.0),
        None => (0.0, 0.0),
    };

    // Remaining factors (vehicle age, depreciation) are unknown here; a
    // small neutral base keeps the scale comparable with full inputs.
    let base_points = 10.0;

    let score = (fuel_points + subsidy_points + base_points).round() as u32;
    UrgencyScore {
        score: score.min(100),
        level: UrgencyLevel::from_score(score.min(100)),
        monthly_delay_cost: monthly_savings + subsidy_monthly_cost,
    }
}

/// Renders the urgency score in the declared language.
pub fn urgency_block(data: &MarketData, language: Language) -> Option<String> {
    let urgency = urgency_score(data);
    let text = match language {
        Language::Pl => format!(
            "Pilność zakupu: {}/100 ({}). Każdy miesiąc zwłoki kosztuje klienta około {:.0} PLN.",
            urgency.score,
            urgency.level.as_str(),
            urgency.monthly_delay_cost
        ),
        Language::En => format!(
            "Purchase urgency: {}/100 ({}). Every month of delay costs the client about {:.0} PLN.",
            urgency.score,
            urgency.level.as_str(),
            urgency.monthly_delay_cost
        ),
    };
    Some(text)
}

/// Composes the enabled, non-empty blocks in fixed order. `None` when every
/// block is disabled or empty.
pub fn strategic_context(
    data: &MarketData,
    toggles: &EnrichmentToggles,
    language: Language,
) -> Option<String> {
    let mut blocks = Vec::new();
    if toggles.fuel_prices {
        blocks.extend(fuel_cost_block(data));
    }
    if toggles.subsidies {
        blocks.extend(subsidy_block(data));
    }
    if toggles.regional {
        blocks.extend(regional_block(data));
    }
    if toggles.urgency {
        blocks.extend(urgency_block(data, language));
    }
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuel_block_reports_savings() {
        let block = fuel_cost_block(&MarketData::default()).unwrap();
        // 200 * 8 * 6.50 = 10400 vs 200 * 15 * 0.80 = 2400
        assert!(block.contains("10400"));
        assert!(block.contains("2400"));
        assert!(block.contains("8000"));
    }

    #[test]
    fn subsidy_clock_escalates_urgency() {
        let mut data = MarketData::default();
        data.subsidy_deadline_days = Some(200);
        let relaxed = urgency_score(&data);
        data.subsidy_deadline_days = Some(20);
        let pressed = urgency_score(&data);
        assert!(pressed.score > relaxed.score);
        assert!(pressed.monthly_delay_cost > relaxed.monthly_delay_cost);
    }

    #[test]
    fn urgency_levels_map_thresholds() {
        assert_eq!(UrgencyLevel::from_score(0), UrgencyLevel::Cold);
        assert_eq!(UrgencyLevel::from_score(30), UrgencyLevel::Warm);
        assert_eq!(UrgencyLevel::from_score(60), UrgencyLevel::Hot);
        assert_eq!(UrgencyLevel::from_score(90), UrgencyLevel::Burning);
    }

    #[test]
    fn toggles_omit_blocks() {
        let data = MarketData::default();
        let none = strategic_context(
            &data,
            &EnrichmentToggles {
                fuel_prices: false,
                subsidies: false,
                regional: false,
                urgency: false,
            },
            Language::En,
        );
        assert!(none.is_none());

        let all = strategic_context(&data, &EnrichmentToggles::default(), Language::En).unwrap();
        assert!(all.contains("Fuel economics"));
        assert!(all.contains("NaszEauto"));
        // Regional counters are zero by default, so that block is omitted.
        assert!(!all.contains("Region"));
    }

    #[test]
    fn urgency_block_is_localized() {
        let data = MarketData::default();
        let pl = urgency_block(&data, Language::Pl).unwrap();
        assert!(pl.contains("Pilność"));
        let en = urgency_block(&data, Language::En).unwrap();
        assert!(en.contains("urgency"));
    }
}
