//! Where the dialing country comes from

use std::collections::HashMap;
use std::env;

/// Source of the country used to interpret dialed numbers
pub trait CountryProvider: Send + Sync {
    /// ISO 3166 country of the SIM behind `sub_id`, if known
    fn sim_country_iso(&self, sub_id: i32) -> Option<String>;

    /// Country of the process default locale, if it has one
    fn default_country(&self) -> Option<String> {
        locale_country_from_env()
    }
}

/// Country of the SIM for `sub_id` (upper-cased), else the default locale's
/// country, else the empty string
pub fn sim_or_locale_country(provider: &dyn CountryProvider, sub_id: i32) -> String {
    match provider.sim_country_iso(sub_id) {
        Some(country) if !country.is_empty() => country.to_uppercase(),
        _ => provider.default_country().unwrap_or_default(),
    }
}

/// Provider without SIM information, using the process locale only
#[derive(Debug, Clone, Copy, Default)]
pub struct LocaleCountryProvider;

impl CountryProvider for LocaleCountryProvider {
    fn sim_country_iso(&self, _sub_id: i32) -> Option<String> {
        None
    }
}

/// Fixed SIM table with an explicit default country
#[derive(Debug, Clone, Default)]
pub struct StaticCountryProvider {
    sims: HashMap<i32, String>,
    default: Option<String>,
}

impl StaticCountryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sim(mut self, sub_id: i32, country: impl Into<String>) -> Self {
        self.sims.insert(sub_id, country.into());
        self
    }

    pub fn with_default(mut self, country: impl Into<String>) -> Self {
        self.default = Some(country.into());
        self
    }
}

impl CountryProvider for StaticCountryProvider {
    fn sim_country_iso(&self, sub_id: i32) -> Option<String> {
        self.sims.get(&sub_id).cloned()
    }

    fn default_country(&self) -> Option<String> {
        self.default.clone()
    }
}

/// Country part of the locale named by `LC_ALL`, `LC_MESSAGES` or `LANG`
pub fn locale_country_from_env() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find(|value| !value.is_empty())
        .and_then(|locale| country_from_locale(&locale))
}

/// `en_US.UTF-8` -> `US`, `pt-BR` -> `BR`, `C` -> `None`
pub fn country_from_locale(locale: &str) -> Option<String> {
    let tag = locale.split(['.', '@']).next().unwrap_or_default();
    let country = tag.split(['_', '-']).nth(1)?;

    if country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(country.to_ascii_uppercase())
    } else {
        None
    }
}
