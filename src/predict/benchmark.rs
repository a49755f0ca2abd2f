//! Industry benchmark growth profiles.
//!
//! Used when a report yields exactly one usable revenue year: there is no
//! growth history to fit, so the engine substitutes the industry's typical
//! growth and volatility and marks the result as a fallback.

/// Typical annual revenue growth and growth volatility, both in percent.
#[derive(Debug, Clone, Copy)]
pub struct IndustryProfile {
    pub name: &'static str,
    pub growth: f64,
    pub volatility: f64,
}

const PROFILES: &[IndustryProfile] = &[
    IndustryProfile {
        name: "Technology",
        growth: 8.0,
        volatility: 6.0,
    },
    IndustryProfile {
        name: "Healthcare",
        growth: 6.5,
        volatility: 4.5,
    },
    IndustryProfile {
        name: "Financials",
        growth: 5.0,
        volatility: 5.0,
    },
    IndustryProfile {
        name: "Industrials",
        growth: 4.5,
        volatility: 4.0,
    },
    IndustryProfile {
        name: "Retail",
        growth: 4.0,
        volatility: 5.0,
    },
    IndustryProfile {
        name: "Energy",
        growth: 3.5,
        volatility: 8.0,
    },
];

const DEFAULT_PROFILE: IndustryProfile = IndustryProfile {
    name: "General",
    growth: 5.0,
    volatility: 5.0,
};

/// Case-insensitive lookup; substring match so "Information Technology"
/// resolves to the Technology profile. Unknown or missing industries get the
/// general-market profile.
pub fn profile_for(industry: Option<&str>) -> IndustryProfile {
    let Some(industry) = industry else {
        return DEFAULT_PROFILE;
    };
    let needle = industry.to_lowercase();
    PROFILES
        .iter()
        .find(|p| needle.contains(&p.name.to_lowercase()))
        .copied()
        .unwrap_or(DEFAULT_PROFILE)
}
