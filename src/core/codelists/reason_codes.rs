//! UNTDID 5189 allowance and UNTDID 7161 charge reason codes
//! (BT-98 / BT-105, BR-CL-19 / BR-CL-20).

/// Sorted for binary search (string order, so "100" precedes "41").
pub(super) static ALLOWANCE_REASON_CODES: &[&str] = &[
    "100", "102", "103", "104", "105", "41", "42", "60", "62", "63", "64", "65", "66", "67",
    "68", "70", "71", "88", "95",
];

/// Sorted for binary search.
pub(super) static CHARGE_REASON_CODES: &[&str] = &[
    "AA", "AAA", "AAC", "AAD", "AAE", "AAF", "ABK", "ABL", "ADR", "ADT", "AEW", "FC", "FI", "FL",
    "LA", "PC", "TS",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_sorted() {
        for list in [ALLOWANCE_REASON_CODES, CHARGE_REASON_CODES] {
            for window in list.windows(2) {
                assert!(window[0] < window[1], "{} >= {}", window[0], window[1]);
            }
        }
    }
}
