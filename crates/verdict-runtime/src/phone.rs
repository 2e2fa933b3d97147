//! E.164 phone number parsing and classification
//!
//! A practical parser for the regions the service sees traffic from:
//! country-code detection, national-length validation and number-type
//! classification from allocation prefixes. Unlisted country codes still
//! parse; they classify as `Unknown`.

use crate::error::{Result, RuntimeError};

/// Number allocation class, in rising order of fraud association
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberType {
    Mobile,
    FixedLine,
    SharedCost,
    Voip,
    TollFree,
    PremiumRate,
    Unknown,
}

impl NumberType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberType::Mobile => "mobile",
            NumberType::FixedLine => "fixed_line",
            NumberType::SharedCost => "shared_cost",
            NumberType::Voip => "voip",
            NumberType::TollFree => "toll_free",
            NumberType::PremiumRate => "premium_rate",
            NumberType::Unknown => "unknown",
        }
    }
}

/// A parsed, validated phone number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPhone {
    /// Canonical +<cc><national> form
    pub e164: String,
    pub country_code: u16,
    pub national_number: String,
}

/// Calling-code table: (region, country code, min/max national length).
/// Longest codes first so greedy matching is unambiguous.
const REGIONS: &[(&str, u16, usize, usize)] = &[
    ("HK", 852, 8, 9),
    ("UA", 380, 9, 9),
    ("PT", 351, 9, 9),
    ("IE", 353, 7, 9),
    ("FI", 358, 5, 10),
    ("NG", 234, 7, 10),
    ("KE", 254, 9, 9),
    ("IL", 972, 8, 9),
    ("AE", 971, 8, 9),
    ("SA", 966, 8, 9),
    ("GB", 44, 9, 10),
    ("DE", 49, 6, 11),
    ("FR", 33, 9, 9),
    ("ES", 34, 9, 9),
    ("IT", 39, 6, 11),
    ("NL", 31, 9, 9),
    ("BE", 32, 8, 9),
    ("SE", 46, 7, 9),
    ("NO", 47, 8, 8),
    ("DK", 45, 8, 8),
    ("PL", 48, 9, 9),
    ("CH", 41, 9, 9),
    ("AT", 43, 7, 11),
    ("AU", 61, 9, 9),
    ("NZ", 64, 8, 9),
    ("JP", 81, 9, 10),
    ("KR", 82, 8, 10),
    ("CN", 86, 10, 11),
    ("IN", 91, 10, 10),
    ("SG", 65, 8, 8),
    ("BR", 55, 10, 11),
    ("MX", 52, 10, 10),
    ("AR", 54, 10, 10),
    ("TR", 90, 10, 10),
    ("ZA", 27, 9, 9),
    ("EG", 20, 9, 10),
    ("RU", 7, 10, 10),
    ("US", 1, 10, 10),
];

/// NANP territories sharing calling code 1
const NANP_REGIONS: &[&str] = &["US", "CA", "PR", "BS", "BB", "JM", "TT", "DO"];

fn region_entry(region: &str) -> Option<&'static (&'static str, u16, usize, usize)> {
    let region = region.to_uppercase();
    if NANP_REGIONS.contains(&region.as_str()) {
        return REGIONS.iter().find(|(r, _, _, _)| *r == "US");
    }
    REGIONS.iter().find(|(r, _, _, _)| *r == region)
}

fn strip_formatting(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Parse a phone number, using `default_region` (ISO alpha-2) for numbers
/// written in national format
pub fn parse(raw: &str, default_region: Option<&str>) -> Result<ParsedPhone> {
    let mut digits = strip_formatting(raw);
    if digits.is_empty() {
        return Err(RuntimeError::Check("empty phone number".to_string()));
    }

    // 00 is the ITU international prefix; fold it into +
    if let Some(rest) = digits.strip_prefix("00") {
        digits = format!("+{}", rest);
    }

    if let Some(rest) = digits.strip_prefix('+') {
        if rest.contains('+') {
            return Err(RuntimeError::Check("misplaced + in phone number".to_string()));
        }
        return parse_international(rest);
    }
    if digits.contains('+') {
        return Err(RuntimeError::Check("misplaced + in phone number".to_string()));
    }

    let region = default_region
        .and_then(region_entry)
        .ok_or_else(|| RuntimeError::Check("phone number needs a country".to_string()))?;
    let (_, code, min_len, max_len) = *region;

    let mut national = digits;
    if code == 1 {
        // NANP numbers may carry the trunk 1
        if national.len() == 11 && national.starts_with('1') {
            national.remove(0);
        }
    } else if national.starts_with('0') {
        // National trunk prefix outside the NANP
        national.remove(0);
    }

    validate_national(&national, code, min_len, max_len)?;
    Ok(ParsedPhone {
        e164: format!("+{}{}", code, national),
        country_code: code,
        national_number: national,
    })
}

fn parse_international(digits: &str) -> Result<ParsedPhone> {
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(RuntimeError::Check("non-digit in phone number".to_string()));
    }

    // Greedy longest-code match against the table
    for code_len in [3usize, 2, 1] {
        if digits.len() <= code_len {
            continue;
        }
        let Ok(code) = digits[..code_len].parse::<u16>() else {
            continue;
        };
        if let Some((_, _, min_len, max_len)) =
            REGIONS.iter().find(|(_, c, _, _)| *c == code)
        {
            let national = &digits[code_len..];
            validate_national(national, code, *min_len, *max_len)?;
            return Ok(ParsedPhone {
                e164: format!("+{}", digits),
                country_code: code,
                national_number: national.to_string(),
            });
        }
    }

    // Unlisted country code: accept E.164 global bounds
    if digits.len() < 7 || digits.len() > 15 {
        return Err(RuntimeError::Check("phone number length out of range".to_string()));
    }
    let code_len = usize::min(3, digits.len() - 4);
    Ok(ParsedPhone {
        e164: format!("+{}", digits),
        country_code: digits[..code_len].parse().unwrap_or(0),
        national_number: digits[code_len..].to_string(),
    })
}

fn validate_national(national: &str, code: u16, min_len: usize, max_len: usize) -> Result<()> {
    if !national.chars().all(|c| c.is_ascii_digit()) {
        return Err(RuntimeError::Check("non-digit in phone number".to_string()));
    }
    if national.len() < min_len || national.len() > max_len {
        return Err(RuntimeError::Check(format!(
            "national number length {} out of range for +{}",
            national.len(),
            code
        )));
    }
    if code == 1 && !national.starts_with(|c: char| ('2'..='9').contains(&c)) {
        return Err(RuntimeError::Check("invalid NANP area code".to_string()));
    }
    Ok(())
}

impl ParsedPhone {
    /// Whether a declared ISO country is plausible for this number
    pub fn matches_region(&self, declared: &str) -> bool {
        let declared = declared.to_uppercase();
        if self.country_code == 1 {
            return NANP_REGIONS.contains(&declared.as_str());
        }
        match region_entry(&declared) {
            Some((_, code, _, _)) => *code == self.country_code,
            // Unlisted declared region: cannot contradict
            None => true,
        }
    }

    /// Classify the number from allocation prefixes
    pub fn number_type(&self) -> NumberType {
        let n = self.national_number.as_str();
        match self.country_code {
            1 => {
                let area = &n[..3.min(n.len())];
                match area {
                    "800" | "888" | "877" | "866" | "855" | "844" | "833" => NumberType::TollFree,
                    "900" | "976" => NumberType::PremiumRate,
                    "500" | "521" | "522" | "533" | "544" | "566" | "577" | "588" => {
                        NumberType::Voip
                    }
                    // Geographic NANP numbers do not encode mobile vs fixed
                    _ => NumberType::Mobile,
                }
            }
            44 => {
                if n.starts_with("800") || n.starts_with("808") {
                    NumberType::TollFree
                } else if n.starts_with('9') {
                    NumberType::PremiumRate
                } else if n.starts_with("84") || n.starts_with("87") {
                    NumberType::SharedCost
                } else if n.starts_with("56") || n.starts_with("70") {
                    NumberType::Voip
                } else if n.starts_with('7') {
                    NumberType::Mobile
                } else if n.starts_with('1') || n.starts_with('2') || n.starts_with('3') {
                    NumberType::FixedLine
                } else {
                    NumberType::Unknown
                }
            }
            49 => {
                if n.starts_with("800") {
                    NumberType::TollFree
                } else if n.starts_with("900") {
                    NumberType::PremiumRate
                } else if n.starts_with("180") {
                    NumberType::SharedCost
                } else if n.starts_with("32") {
                    NumberType::Voip
                } else if n.starts_with("15") || n.starts_with("16") || n.starts_with("17") {
                    NumberType::Mobile
                } else {
                    NumberType::FixedLine
                }
            }
            33 => {
                if n.starts_with("80") {
                    NumberType::TollFree
                } else if n.starts_with("89") {
                    NumberType::PremiumRate
                } else if n.starts_with("81") || n.starts_with("82") {
                    NumberType::SharedCost
                } else if n.starts_with('9') {
                    NumberType::Voip
                } else if n.starts_with('6') || n.starts_with('7') {
                    NumberType::Mobile
                } else {
                    NumberType::FixedLine
                }
            }
            61 => {
                if n.starts_with("1800") {
                    NumberType::TollFree
                } else if n.starts_with("190") {
                    NumberType::PremiumRate
                } else if n.starts_with("13") {
                    NumberType::SharedCost
                } else if n.starts_with('4') {
                    NumberType::Mobile
                } else if n.starts_with('2') || n.starts_with('3') || n.starts_with('7')
                    || n.starts_with('8')
                {
                    NumberType::FixedLine
                } else {
                    NumberType::Unknown
                }
            }
            91 => {
                if n.starts_with("1800") {
                    NumberType::TollFree
                } else if n.starts_with(|c: char| ('6'..='9').contains(&c)) {
                    NumberType::Mobile
                } else {
                    NumberType::FixedLine
                }
            }
            _ => NumberType::Unknown,
        }
    }
}
