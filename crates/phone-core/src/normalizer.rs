//! Canonical national-format recipient numbers
//!
//! Normalization never fails: anything the grammar cannot parse, or parses
//! to an invalid number, comes back exactly as it went in.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::country::{sim_or_locale_country, CountryProvider};
use crate::error::{PhoneError, Result};

/// Phone number grammar used to interpret dialed text
pub trait PhoneNumberGrammar: Send + Sync {
    /// Parse `text` as dialed in `region` and render it in national format
    ///
    /// Fails with [`PhoneError::Parse`] when the text is not a number and
    /// [`PhoneError::InvalidNumber`] when it is not valid for the region.
    fn format_national(&self, text: &str, region: &str) -> Result<String>;
}

/// Grammar backed by the `phonenumber` crate (libphonenumber metadata)
#[derive(Debug, Clone, Copy, Default)]
pub struct LibPhoneNumber;

impl PhoneNumberGrammar for LibPhoneNumber {
    fn format_national(&self, text: &str, region: &str) -> Result<String> {
        // Unknown regions still parse numbers written with a leading '+'
        let country = region.parse::<phonenumber::country::Id>().ok();

        let number = phonenumber::parse(country, text).map_err(|e| PhoneError::parse(e.to_string()))?;
        if !phonenumber::is_valid(&number) {
            return Err(PhoneError::InvalidNumber {
                region: region.to_string(),
            });
        }

        Ok(number.format().mode(phonenumber::Mode::National).to_string())
    }
}

/// Turns raw recipient text into the digits of its national form
#[derive(Clone)]
pub struct NumberNormalizer {
    countries: Arc<dyn CountryProvider>,
    grammar: Arc<dyn PhoneNumberGrammar>,
}

impl NumberNormalizer {
    pub fn new(countries: Arc<dyn CountryProvider>, grammar: Arc<dyn PhoneNumberGrammar>) -> Self {
        Self { countries, grammar }
    }

    /// Normalizer using the libphonenumber grammar
    pub fn with_countries(countries: Arc<dyn CountryProvider>) -> Self {
        Self::new(countries, Arc::new(LibPhoneNumber))
    }

    /// Country used to interpret numbers sent from `sub_id`
    pub fn country_for(&self, sub_id: i32) -> String {
        sim_or_locale_country(self.countries.as_ref(), sub_id)
    }

    /// National-format digits of `raw`, or `raw` itself if it cannot be
    /// parsed as a valid number
    pub fn normalize(&self, sub_id: i32, raw: &str) -> String {
        let country = self.country_for(sub_id);

        match self.grammar.format_national(raw, &country) {
            Ok(national) => {
                let digits: String = national.chars().filter(|c| c.is_ascii_digit()).collect();
                debug!("Normalized number for country '{}' to {} digits", country, digits.len());
                digits
            }
            Err(e) => {
                warn!("Keeping number as dialed for country '{}': {}", country, e);
                raw.to_string()
            }
        }
    }
}

impl std::fmt::Debug for NumberNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumberNormalizer").finish_non_exhaustive()
    }
}

/// One-shot normalization with the libphonenumber grammar
pub fn national_number(countries: Arc<dyn CountryProvider>, sub_id: i32, raw: &str) -> String {
    NumberNormalizer::with_countries(countries).normalize(sub_id, raw)
}
