//! Region-code extraction from a CAP geocode block.
//!
//! NWS encodes the affected regions two ways inside one value field: either a
//! single code, or several codes space-delimited in the same field.

use roxmltree::Node;

/// UGC codes carry the zone marker as their third character; codes with 'C'
/// there are county duplicates of the FIPS6 field and are dropped.
const ZONE_MARKER: char = 'Z';

// The geocode block lists valueName/value pairs in a fixed order: slot 1 is
// the FIPS6 value field, slot 3 the UGC value field.
const COUNTY_VALUE_SLOT: usize = 1;
const ZONE_VALUE_SLOT: usize = 3;

/// Pick the county and zone value fields out of a geocode element.
///
/// Short or empty blocks yield empty fields.
pub fn geocode_fields(geocode: Node<'_, '_>) -> (String, String) {
    let values: Vec<&str> = geocode
        .children()
        .filter(|n| n.is_element())
        .map(|n| n.text().unwrap_or(""))
        .collect();

    let county = values.get(COUNTY_VALUE_SLOT).copied().unwrap_or("");
    let zone = values.get(ZONE_VALUE_SLOT).copied().unwrap_or("");
    (county.to_string(), zone.to_string())
}

/// FIPS6 county codes from a value field.
///
/// FIPS6 uniquely identifies US counties; the feed prepends an encoding digit
/// that is stripped here to get back to the canonical 5-digit form.
pub fn extract_county(field: &str) -> Vec<String> {
    field
        .split_whitespace()
        .filter_map(|code| code.get(1..))
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

/// UGC zone codes from a value field.
///
/// Only codes in the 'Z' format are kept; 'C'-format codes in the same field
/// duplicate the FIPS6 counties.
pub fn extract_zone(field: &str) -> Vec<String> {
    field
        .split_whitespace()
        .filter(|code| code.chars().nth(2) == Some(ZONE_MARKER))
        .map(str::to_string)
        .collect()
}
