//! ISO 3166-2 subdivisions of Germany by post code.
//!
//! Post code areas do not follow state borders everywhere; codes that fall
//! into ranges of two states have no subdivision.

/// `(first, last, subdivision)`, inclusive, sorted by `first`.
static RANGES: &[(u32, u32, &str)] = &[
    (01001, 01936, "DE-SN"),
    (01941, 01998, "DE-BB"),
    (02601, 02999, "DE-SN"),
    (03001, 03253, "DE-BB"),
    (04001, 04579, "DE-SN"),
    (04581, 04639, "DE-TH"),
    (04641, 04889, "DE-SN"),
    (04891, 04938, "DE-BB"),
    (06001, 06548, "DE-ST"),
    (06551, 06578, "DE-TH"),
    (06601, 06928, "DE-ST"),
    (07301, 07919, "DE-TH"),
    (07919, 07919, "DE-SN"),
    (07919, 07919, "DE-TH"),
    (07920, 07950, "DE-TH"),
    (07951, 07951, "DE-SN"),
    (07952, 07952, "DE-TH"),
    (07952, 07952, "DE-SN"),
    (07953, 07980, "DE-TH"),
    (07982, 07982, "DE-SN"),
    (07985, 07985, "DE-TH"),
    (07985, 07985, "DE-SN"),
    (07985, 07989, "DE-TH"),
    (08001, 09669, "DE-SN"),
    (10001, 14330, "DE-BE"),
    (14401, 14715, "DE-BB"),
    (14715, 14715, "DE-ST"),
    (14723, 16949, "DE-BB"),
    (17001, 17256, "DE-MV"),
    (17258, 17258, "DE-BB"),
    (17258, 17259, "DE-MV"),
    (17261, 17291, "DE-BB"),
    (17301, 17309, "DE-MV"),
    (17309, 17309, "DE-BB"),
    (17309, 17321, "DE-MV"),
    (17321, 17321, "DE-BB"),
    (17321, 17322, "DE-MV"),
    (17326, 17326, "DE-BB"),
    (17328, 17331, "DE-MV"),
    (17335, 17335, "DE-BB"),
    (17335, 17335, "DE-MV"),
    (17337, 17337, "DE-BB"),
    (17337, 19260, "DE-MV"),
    (19271, 19273, "DE-NI"),
    (19273, 19273, "DE-MV"),
    (19273, 19306, "DE-MV"),
    (19307, 19357, "DE-BB"),
    (19357, 19417, "DE-MV"),
    (20001, 21037, "DE-HH"),
    (21039, 21039, "DE-SH"),
    (21039, 21170, "DE-HH"),
    (21202, 21449, "DE-NI"),
    (21451, 21521, "DE-SH"),
    (21522, 21522, "DE-NI"),
    (21524, 21529, "DE-SH"),
    (21601, 21789, "DE-NI"),
    (22001, 22113, "DE-HH"),
    (22113, 22113, "DE-SH"),
    (22115, 22143, "DE-HH"),
    (22145, 22145, "DE-SH"),
    (22145, 22145, "DE-HH"),
    (22147, 22786, "DE-HH"),
    (22801, 23919, "DE-SH"),
    (23921, 23999, "DE-MV"),
    (24001, 25999, "DE-SH"),
    (26001, 27478, "DE-NI"),
    (27483, 27498, "DE-SH"),
    (27499, 27499, "DE-HH"),
    (27501, 27580, "DE-HB"),
    (27607, 27809, "DE-NI"),
    (28001, 28779, "DE-HB"),
    (28784, 29399, "DE-NI"),
    (29401, 29416, "DE-ST"),
    (29431, 31868, "DE-NI"),
    (32001, 33829, "DE-NW"),
    (34001, 34329, "DE-HE"),
    (34331, 34353, "DE-NI"),
    (34355, 34355, "DE-HE"),
    (34355, 34355, "DE-NI"),
    (34356, 34399, "DE-HE"),
    (34401, 34439, "DE-NW"),
    (34441, 36399, "DE-HE"),
    (36401, 36469, "DE-TH"),
    (37001, 37194, "DE-NI"),
    (37194, 37195, "DE-HE"),
    (37197, 37199, "DE-NI"),
    (37201, 37299, "DE-HE"),
    (37301, 37359, "DE-TH"),
    (37401, 37649, "DE-NI"),
    (37651, 37688, "DE-NW"),
    (37689, 37691, "DE-NI"),
    (37692, 37696, "DE-NW"),
    (37697, 38479, "DE-NI"),
    (38481, 38489, "DE-ST"),
    (38501, 38729, "DE-NI"),
    (38801, 39649, "DE-ST"),
    (40001, 48432, "DE-NW"),
    (48442, 48465, "DE-NI"),
    (48466, 48477, "DE-NW"),
    (48478, 48480, "DE-NI"),
    (48481, 48485, "DE-NW"),
    (48486, 48488, "DE-NI"),
    (48489, 48496, "DE-NW"),
    (48497, 48531, "DE-NI"),
    (48541, 48739, "DE-NW"),
    (49001, 49459, "DE-NI"),
    (49461, 49549, "DE-NW"),
    (49551, 49849, "DE-NI"),
    (50101, 51597, "DE-NW"),
    (51598, 51598, "DE-RP"),
    (51601, 53359, "DE-NW"),
    (53401, 53579, "DE-RP"),
    (53581, 53604, "DE-NW"),
    (53614, 53619, "DE-RP"),
    (53621, 53949, "DE-NW"),
    (54181, 55239, "DE-RP"),
    (55240, 55252, "DE-HE"),
    (55253, 56869, "DE-RP"),
    (57001, 57489, "DE-NW"),
    (57501, 57648, "DE-RP"),
    (58001, 59966, "DE-NW"),
    (59969, 59969, "DE-HE"),
    (59969, 59969, "DE-NW"),
    (60001, 63699, "DE-HE"),
    (63701, 63774, "DE-BY"),
    (63776, 63776, "DE-HE"),
    (63776, 63928, "DE-BY"),
    (63928, 63928, "DE-BW"),
    (63930, 63939, "DE-BY"),
    (64201, 64753, "DE-HE"),
    (64754, 64754, "DE-BW"),
    (64754, 65326, "DE-HE"),
    (65326, 65326, "DE-RP"),
    (65327, 65391, "DE-HE"),
    (65391, 65391, "DE-RP"),
    (65392, 65556, "DE-HE"),
    (65558, 65582, "DE-RP"),
    (65583, 65620, "DE-HE"),
    (65621, 65626, "DE-RP"),
    (65627, 65627, "DE-HE"),
    (65629, 65629, "DE-RP"),
    (65701, 65936, "DE-HE"),
    (66001, 66459, "DE-SL"),
    (66461, 66509, "DE-RP"),
    (66511, 66839, "DE-SL"),
    (66841, 67829, "DE-RP"),
    (68001, 68312, "DE-BW"),
    (68501, 68519, "DE-HE"),
    (68520, 68549, "DE-BW"),
    (68601, 68649, "DE-HE"),
    (68701, 69234, "DE-BW"),
    (69235, 69239, "DE-HE"),
    (69240, 69429, "DE-BW"),
    (69430, 69431, "DE-HE"),
    (69434, 69434, "DE-BW"),
    (69434, 69434, "DE-HE"),
    (69435, 69469, "DE-BW"),
    (69479, 69488, "DE-HE"),
    (69489, 69502, "DE-BW"),
    (69503, 69509, "DE-HE"),
    (69510, 69514, "DE-BW"),
    (69515, 69518, "DE-HE"),
    (70001, 74592, "DE-BW"),
    (74594, 74594, "DE-BY"),
    (74594, 76709, "DE-BW"),
    (76711, 76891, "DE-RP"),
    (77601, 79879, "DE-BW"),
    (80001, 87490, "DE-BY"),
    (87493, 87561, "DE-BY"),
    (87571, 87789, "DE-BY"),
    (88001, 88099, "DE-BW"),
    (88101, 88146, "DE-BY"),
    (88147, 88147, "DE-BW"),
    (88147, 88179, "DE-BY"),
    (88181, 89079, "DE-BW"),
    (89081, 89081, "DE-BY"),
    (89081, 89085, "DE-BW"),
    (89087, 89087, "DE-BY"),
    (89090, 89198, "DE-BW"),
    (89201, 89449, "DE-BY"),
    (89501, 89619, "DE-BW"),
    (90001, 96489, "DE-BY"),
    (96501, 96529, "DE-TH"),
    (97001, 97859, "DE-BY"),
    (97861, 97877, "DE-BW"),
    (97888, 97892, "DE-BY"),
    (97893, 97896, "DE-BW"),
    (97896, 97896, "DE-BY"),
    (97897, 97900, "DE-BW"),
    (97901, 97909, "DE-BY"),
    (97911, 97999, "DE-BW"),
    (98501, 99998, "DE-TH"),
];

/// Subdivision code (`DE-BY`, ...) of a German post code, if it is
/// unambiguous. Accepts `80331` and `D-80331`.
pub fn german_subdivision(post_code: &str) -> Option<&'static str> {
    let code = post_code.trim();
    let code = code
        .strip_prefix("D-")
        .or_else(|| code.strip_prefix("d-"))
        .unwrap_or(code);
    if code.len() != 5 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: u32 = code.parse().ok()?;

    let mut found = None;
    for &(first, last, subdivision) in RANGES {
        if first > number {
            break;
        }
        if number > last {
            continue;
        }
        match found {
            None => found = Some(subdivision),
            Some(other) if other == subdivision => {}
            Some(_) => return None,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_sorted() {
        assert!(RANGES.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(RANGES.iter().all(|(first, last, _)| first <= last));
    }

    #[test]
    fn state_capitals() {
        assert_eq!(german_subdivision("10115"), Some("DE-BE"));
        assert_eq!(german_subdivision("80331"), Some("DE-BY"));
        assert_eq!(german_subdivision("D-20095"), Some("DE-HH"));
        assert_eq!(german_subdivision("01067"), Some("DE-SN"));
        assert_eq!(german_subdivision("70173"), Some("DE-BW"));
        assert_eq!(german_subdivision("28195"), Some("DE-HB"));
    }

    #[test]
    fn shared_and_foreign_codes_have_no_subdivision() {
        // 22145 is split between Hamburg and Schleswig-Holstein.
        assert_eq!(german_subdivision("22145"), None);
        // Kleinwalsertal is served by German post codes but lies in Austria.
        assert_eq!(german_subdivision("87567"), None);
        assert_eq!(german_subdivision("1010"), None);
        assert_eq!(german_subdivision("SW1A 1AA"), None);
    }
}
