//! Phone number utilities for the MMS service.
//!
//! - [`NumberNormalizer`] turns dialed recipient text into the digits of its
//!   national form, using the SIM's country (or the locale's) as context.
//! - [`CarrierSupportProbe`] asks the carrier settings provider whether MMS
//!   over VoWiFi is enabled for a subscription.
//!
//! Both absorb every failure and answer with a safe default.

pub mod carrier;
pub mod country;
pub mod error;
pub mod normalizer;

pub use carrier::{is_supported, CarrierSupportProbe, ContentProvider, Cursor};
pub use country::{sim_or_locale_country, CountryProvider, LocaleCountryProvider, StaticCountryProvider};
pub use error::{PhoneError, Result};
pub use normalizer::{national_number, LibPhoneNumber, NumberNormalizer, PhoneNumberGrammar};
