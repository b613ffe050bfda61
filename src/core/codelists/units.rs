//! UN/ECE Recommendation 20/21 unit codes (BT-130, BR-CL-23).
//!
//! OCR output rarely carries Rec 20 codes; it carries what is printed on the
//! invoice ("Stk", "Std.", "pcs"). [`UNIT_ALIASES`] maps the common printed
//! forms onto their codes.

/// Sorted subset of Rec 20/21 codes seen on European invoices.
pub(super) static UNIT_CODES: &[&str] = &[
    "2N", "4K", "ANN", "BAR", "BLL", "BX", "C62", "CCM", "CLT", "CMK", "CMT", "CS", "CT", "DAY",
    "DMQ", "DMT", "DZN", "EA", "FOT", "GLL", "GM", "GRM", "GRO", "GWH", "HAR", "HLT", "HUR",
    "INH", "JOU", "KGM", "KGS", "KHZ", "KMH", "KMT", "KTM", "KVA", "KVT", "KWH", "KWT", "LBR",
    "LE", "LM", "LPA", "LS", "LTR", "MAW", "MBR", "MGM", "MHZ", "MIN", "MLT", "MMK", "MMT",
    "MON", "MQH", "MTK", "MTQ", "MTR", "MTS", "MWH", "NAR", "NPR", "P1", "PA", "PK", "PR", "QTI",
    "RO", "SA", "SEC", "SET", "SMI", "ST", "STN", "TNE", "WEE", "XBD", "XBG", "XBX", "XCT",
    "XPA", "XPK", "XPX", "XRO", "XSA", "XST", "YRD",
];

/// Printed unit spellings (upper-cased, trailing dot removed) → Rec 20 code.
pub(super) static UNIT_ALIASES: &[(&str, &str)] = &[
    ("ST.", "C62"),
    ("STK", "C62"),
    ("STÜCK", "C62"),
    ("STUECK", "C62"),
    ("PCS", "C62"),
    ("PC", "C62"),
    ("PIECE", "C62"),
    ("PIECES", "C62"),
    ("STD", "HUR"),
    ("STUNDE", "HUR"),
    ("STUNDEN", "HUR"),
    ("H", "HUR"),
    ("HRS", "HUR"),
    ("HOUR", "HUR"),
    ("HOURS", "HUR"),
    ("TAG", "DAY"),
    ("TAGE", "DAY"),
    ("DAYS", "DAY"),
    ("KG", "KGM"),
    ("G", "GRM"),
    ("L", "LTR"),
    ("LITER", "LTR"),
    ("M", "MTR"),
    ("M2", "MTK"),
    ("QM", "MTK"),
    ("M3", "MTQ"),
    ("MONAT", "MON"),
    ("PAUSCHAL", "LS"),
    ("PAUSCH", "LS"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_sorted() {
        for window in UNIT_CODES.windows(2) {
            assert!(
                window[0] < window[1],
                "unit codes not sorted: {} >= {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn aliases_point_at_known_codes() {
        for (alias, code) in UNIT_ALIASES {
            assert!(
                UNIT_CODES.binary_search(code).is_ok(),
                "alias {alias} points at unknown code {code}"
            );
        }
    }
}
