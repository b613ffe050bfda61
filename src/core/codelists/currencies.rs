//! ISO 4217 currency codes with their minor units (BT-5, BR-CL-03/04).
//!
//! The minor unit drives the rounding of recomputed line net amounts.

/// Sorted `(code, minor unit digits)` pairs. Sorted for binary search.
pub(super) static CURRENCIES: &[(&str, u32)] = &[
    ("AED", 2),
    ("AMD", 2),
    ("AUD", 2),
    ("BGN", 2),
    ("BRL", 2),
    ("CAD", 2),
    ("CHF", 2),
    ("CNY", 2),
    ("CZK", 2),
    ("DKK", 2),
    ("EGP", 2),
    ("EUR", 2),
    ("GBP", 2),
    ("GEL", 2),
    ("HKD", 2),
    ("HUF", 2),
    ("IDR", 2),
    ("ILS", 2),
    ("INR", 2),
    ("ISK", 0),
    ("JPY", 0),
    ("KES", 2),
    ("KRW", 0),
    ("KZT", 2),
    ("MXN", 2),
    ("MYR", 2),
    ("NGN", 2),
    ("NOK", 2),
    ("NZD", 2),
    ("PHP", 2),
    ("PLN", 2),
    ("RON", 2),
    ("RSD", 2),
    ("SAR", 2),
    ("SEK", 2),
    ("SGD", 2),
    ("THB", 2),
    ("TRY", 2),
    ("TWD", 2),
    ("UAH", 2),
    ("USD", 2),
    ("VND", 0),
    ("ZAR", 2),
];

/// Printed currency symbols → ISO 4217 code. Spelled-out names such as
/// `"EURO"` are not aliases and fail BR-CL-04.
pub(super) static CURRENCY_ALIASES: &[(&str, &str)] = &[
    ("€", "EUR"),
    ("£", "GBP"),
    ("CHF.", "CHF"),
    ("FR.", "CHF"),
];

/// Minor unit digits for `code`, if it is a known currency.
pub fn minor_unit(code: &str) -> Option<u32> {
    CURRENCIES
        .binary_search_by(|(c, _)| (*c).cmp(code))
        .ok()
        .map(|i| CURRENCIES[i].1)
}
