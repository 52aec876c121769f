//! Fixed sample data the shopping actions draw from.
//!
//! The storefront ships with a fixed product catalog and currency list. The
//! values here mirror that seed data; none of it changes for the lifetime of
//! the process.

use serde::Serialize;

/// Product identifiers present in the storefront catalog.
pub const PRODUCTS: [&str; 9] = [
    "0PUK6V6EV0",
    "1YMWWN1N4O",
    "2ZYFJ3GM2N",
    "66VCHSJNUP",
    "6E92ZMYYFZ",
    "9SIQT8TOJO",
    "L9ECAV7KIM",
    "LS4PSXUNUM",
    "OLJCESPC7Z",
];

/// Currency codes the frontend accepts in `/setCurrency`.
pub const CURRENCIES: [&str; 4] = ["EUR", "USD", "JPY", "CAD"];

/// Quantities a shopper may add to their cart in one go.
pub const QUANTITIES: [u8; 6] = [1, 2, 3, 4, 5, 10];

/// Body of `POST /setCurrency`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SetCurrency<'a> {
    /// ISO 4217 code, one of [`CURRENCIES`]
    pub currency_code: &'a str,
}

/// Body of `POST /cart`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct AddToCart<'a> {
    /// One of [`PRODUCTS`]
    pub product_id: &'a str,
    /// One of [`QUANTITIES`]
    pub quantity: u8,
}

/// Body of `POST /cart/checkout`.
///
/// The [`Default`] value is the sample customer every simulated checkout
/// uses. Nothing here is validated by loadgen.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct CheckoutForm {
    pub email: &'static str,
    pub street_address: &'static str,
    pub zip_code: &'static str,
    pub city: &'static str,
    pub state: &'static str,
    pub country: &'static str,
    pub credit_card_number: &'static str,
    pub credit_card_expiration_month: &'static str,
    pub credit_card_expiration_year: &'static str,
    pub credit_card_cvv: &'static str,
}

impl Default for CheckoutForm {
    fn default() -> Self {
        Self {
            email: "someone@example.com",
            street_address: "1600 Amphitheatre Parkway",
            zip_code: "94043",
            city: "Mountain View",
            state: "CA",
            country: "United States",
            credit_card_number: "4432-8015-6152-0454",
            credit_card_expiration_month: "1",
            credit_card_expiration_year: "2039",
            credit_card_cvv: "672",
        }
    }
}
