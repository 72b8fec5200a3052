//! Normalization against real libphonenumber metadata

use std::sync::Arc;

use mms_phone_core::{national_number, NumberNormalizer, StaticCountryProvider};
use proptest::prelude::*;

fn normalizer() -> NumberNormalizer {
    NumberNormalizer::with_countries(Arc::new(
        StaticCountryProvider::new()
            .with_sim(1, "us")
            .with_sim(2, "gb")
            .with_default("US"),
    ))
}

#[test]
fn national_digits_for_valid_numbers() {
    let normalizer = normalizer();
    assert_eq!(normalizer.normalize(1, "(650) 253-0000"), "6502530000");
    assert_eq!(normalizer.normalize(1, "+1 650-253-0000"), "6502530000");
    assert_eq!(normalizer.normalize(2, "+44 20 7031 3000"), "02070313000");
    assert_eq!(normalizer.normalize(2, "020 7031 3000"), "02070313000");
}

#[test]
fn sim_country_is_case_insensitive() {
    assert_eq!(normalizer().country_for(1), "US");
    assert_eq!(normalizer().country_for(2), "GB");
    assert_eq!(normalizer().country_for(9), "US");
}

#[test]
fn empty_input_is_returned_unchanged() {
    assert_eq!(normalizer().normalize(1, ""), "");
}

#[test]
fn junk_and_invalid_numbers_are_returned_unchanged() {
    let normalizer = normalizer();
    assert_eq!(normalizer.normalize(1, "not a number"), "not a number");
    assert_eq!(normalizer.normalize(1, "12"), "12");
}

#[test]
fn unknown_country_still_parses_international_numbers() {
    let countries = Arc::new(StaticCountryProvider::new());
    assert_eq!(national_number(countries.clone(), 1, "+1 650 253 0000"), "6502530000");
    assert_eq!(national_number(countries, 1, "650 253 0000"), "650 253 0000");
}

proptest! {
    #[test]
    fn output_is_input_or_digits(raw in "[0-9+() .-]{0,20}") {
        let out = normalizer().normalize(1, &raw);
        prop_assert!(out == raw || out.chars().all(|c| c.is_ascii_digit()));
    }
}
