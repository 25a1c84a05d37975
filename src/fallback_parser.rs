//! # Fallback Receipt Parser
//!
//! Deterministic, rule-based extraction of receipt fields from raw OCR text.
//! It is used whenever the model-based parser is unavailable, fails, or comes
//! back with nothing useful.
//!
//! ## Rules
//!
//! - **Merchant**: first line longer than 3 characters that contains a letter
//! - **Amount**: ordered patterns (currency prefix, `Total`, `Amount`,
//!   `Grand Total`, bare decimal); first accepted value wins
//! - **Date**: `DD-MM-YYYY`, then `YYYY-MM-DD`, then `DD Mon YYYY`
//! - **Category**: ordered keyword table, first category with a hit wins
//! - **Confidence**: `0.6` when an amount was found, `0.3` otherwise
//!
//! Every function here is pure. The only outside input is `today`, which is
//! passed in by the caller and used when no date can be recovered.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, trace};

use crate::draft::{
    sanitize_amount, truncate_merchant, ParseStrategy, ReceiptCategory, ReceiptDraft,
    UNKNOWN_MERCHANT,
};

/// Confidence reported when an amount was found
pub const CONFIDENCE_WITH_AMOUNT: f64 = 0.6;
/// Confidence reported when no amount was found
pub const CONFIDENCE_WITHOUT_AMOUNT: f64 = 0.3;
/// Amounts at or above this value are treated as misreads
pub const MAX_PLAUSIBLE_AMOUNT: f64 = 1_000_000.0;

/// Ordered (category, keywords) table. Order is the tie-break: the first
/// category with any keyword present in the text wins.
pub const CATEGORY_KEYWORDS: &[(ReceiptCategory, &[&str])] = &[
    (
        ReceiptCategory::FoodAndDining,
        &[
            "restaurant", "cafe", "café", "coffee", "food", "pizza", "burger", "dining",
            "bakery", "kitchen", "grill", "diner", "bistro", "swiggy", "zomato", "dominos",
            "mcdonald", "starbucks", "kfc",
        ],
    ),
    (
        ReceiptCategory::Shopping,
        &[
            "supermarket", "mart", "store", "shop", "mall", "retail", "amazon", "flipkart",
            "clothing", "apparel", "fashion", "electronics", "walmart", "target",
        ],
    ),
    (
        ReceiptCategory::Transportation,
        &[
            "uber", "ola cabs", "lyft", "taxi", "fuel", "petrol", "diesel", "gas station",
            "parking", "metro", "railway", "airline", "toll",
        ],
    ),
    (
        ReceiptCategory::Entertainment,
        &[
            "cinema", "movie", "theatre", "theater", "netflix", "spotify", "concert",
            "amusement", "gaming", "bowling",
        ],
    ),
    (
        ReceiptCategory::Healthcare,
        &[
            "pharmacy", "hospital", "clinic", "medical", "doctor", "medicine", "dental",
            "laboratory", "diagnostic", "chemist",
        ],
    ),
    (
        ReceiptCategory::Utilities,
        &[
            "electricity", "water bill", "internet", "broadband", "recharge", "gas bill",
            "utility", "telecom", "postpaid",
        ],
    ),
];

lazy_static! {
    /// Amount patterns, in priority order
    static ref AMOUNT_PATTERNS: Vec<(&'static str, Regex)> = vec![
        (
            "currency",
            Regex::new(r"(?i)(?:₹|\$|€|£|\brs\.?|\binr)\s*([0-9][0-9,]*(?:\.[0-9]+)?)")
                .expect("Invalid currency amount regex pattern"),
        ),
        (
            "total",
            Regex::new(r"(?i)\btotal\s*:?\s*(?:₹|\$|€|£|rs\.?|inr)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)")
                .expect("Invalid total amount regex pattern"),
        ),
        (
            "amount",
            Regex::new(r"(?i)\bamount\s*:?\s*(?:₹|\$|€|£|rs\.?|inr)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)")
                .expect("Invalid amount regex pattern"),
        ),
        (
            "grand_total",
            Regex::new(r"(?i)\bgrand\s+total\s*:?\s*(?:₹|\$|€|£|rs\.?|inr)?\s*([0-9][0-9,]*(?:\.[0-9]+)?)")
                .expect("Invalid grand total regex pattern"),
        ),
        (
            "bare_decimal",
            Regex::new(r"\b([0-9][0-9,]*\.[0-9]+)\b").expect("Invalid bare decimal regex pattern"),
        ),
    ];

    /// DD-MM-YYYY or DD/MM/YYYY
    static ref DAY_FIRST_DATE: Regex =
        Regex::new(r"\b(\d{1,2})[-/](\d{1,2})[-/](\d{4})\b").expect("Invalid day-first date regex pattern");

    /// YYYY-MM-DD or YYYY/MM/DD
    static ref YEAR_FIRST_DATE: Regex =
        Regex::new(r"\b(\d{4})[-/](\d{1,2})[-/](\d{1,2})\b").expect("Invalid year-first date regex pattern");

    /// DD Mon YYYY, e.g. "12 Oct 2024" or "5 September, 2023"
    static ref NAMED_MONTH_DATE: Regex = Regex::new(
        r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b"
    )
    .expect("Invalid named-month date regex pattern");
}

/// Parse raw OCR text into a receipt draft using only deterministic rules.
///
/// # Arguments
///
/// * `text` - Raw OCR output
/// * `today` - Date used when the text contains no recognizable date
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use receipt_ingest::draft::{ParseStrategy, ReceiptCategory};
/// use receipt_ingest::fallback_parser::parse_receipt_text;
///
/// let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// let draft = parse_receipt_text("CAFE MOCHA\nTotal: Rs. 350.00\n12-10-2024", today);
///
/// assert_eq!(draft.merchant, "CAFE MOCHA");
/// assert_eq!(draft.amount, 350.0);
/// assert_eq!(draft.date, NaiveDate::from_ymd_opt(2024, 10, 12).unwrap());
/// assert_eq!(draft.category, ReceiptCategory::FoodAndDining);
/// assert_eq!(draft.confidence, 0.6);
/// assert_eq!(draft.parsed_with, ParseStrategy::Fallback);
/// ```
pub fn parse_receipt_text(text: &str, today: NaiveDate) -> ReceiptDraft {
    let merchant = extract_merchant(text);
    let amount = extract_amount(text).unwrap_or(0.0);
    let date = extract_date(text).unwrap_or(today);
    let category = categorize(text);
    let confidence = fallback_confidence(amount);

    debug!(
        merchant = %merchant,
        amount,
        %date,
        category = %category,
        confidence,
        "Fallback parser produced draft"
    );

    ReceiptDraft {
        merchant,
        amount,
        date,
        category,
        extracted_text: text.to_string(),
        confidence,
        parsed_with: ParseStrategy::Fallback,
    }
}

/// First line longer than 3 characters containing a letter, cut to 50
/// characters; [`UNKNOWN_MERCHANT`] when no line qualifies.
pub fn extract_merchant(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| line.chars().count() > 3 && line.chars().any(char::is_alphabetic))
        .map(truncate_merchant)
        .unwrap_or_else(|| UNKNOWN_MERCHANT.to_string())
}

/// Try each amount pattern in priority order. For every pattern only its
/// first match is considered; the value is accepted when it lies strictly
/// between 0 and [`MAX_PLAUSIBLE_AMOUNT`].
pub fn extract_amount(text: &str) -> Option<f64> {
    for (name, pattern) in AMOUNT_PATTERNS.iter() {
        let Some(captures) = pattern.captures(text) else {
            continue;
        };
        let Some(raw) = captures.get(1) else {
            continue;
        };

        match parse_amount(raw.as_str()) {
            Some(amount) if amount > 0.0 && amount < MAX_PLAUSIBLE_AMOUNT => {
                trace!(pattern = name, raw = raw.as_str(), amount, "Amount pattern accepted");
                return Some(sanitize_amount(amount));
            }
            other => {
                trace!(pattern = name, raw = raw.as_str(), parsed = ?other, "Amount pattern rejected");
            }
        }
    }
    None
}

/// Strip thousands separators and parse
fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").trim_end_matches('.').parse::<f64>().ok()
}

/// Try the three date shapes in order; the first whose match is a real
/// calendar date wins.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    let day_first = DAY_FIRST_DATE
        .captures(text)
        .and_then(|c| ymd(&c[3], &c[2], &c[1]));
    if day_first.is_some() {
        return day_first;
    }

    let year_first = YEAR_FIRST_DATE
        .captures(text)
        .and_then(|c| ymd(&c[1], &c[2], &c[3]));
    if year_first.is_some() {
        return year_first;
    }

    NAMED_MONTH_DATE.captures(text).and_then(|c| {
        let month = month_number(&c[2])?;
        let day = c[1].parse().ok()?;
        let year = c[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn month_number(abbrev: &str) -> Option<u32> {
    let month = match abbrev.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Case-insensitive keyword scan over [`CATEGORY_KEYWORDS`]
pub fn categorize(text: &str) -> ReceiptCategory {
    let haystack = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| haystack.contains(keyword)))
        .map(|(category, _)| *category)
        .unwrap_or(ReceiptCategory::Other)
}

/// Narrow heuristic: only the presence of an amount is scored
pub fn fallback_confidence(amount: f64) -> f64 {
    if amount > 0.0 {
        CONFIDENCE_WITH_AMOUNT
    } else {
        CONFIDENCE_WITHOUT_AMOUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_merchant_skips_short_and_numeric_lines() {
        assert_eq!(extract_merchant("#12\n  \n2024\nBig Bazaar\nTotal"), "Big Bazaar");
        assert_eq!(extract_merchant("abc\n1234"), UNKNOWN_MERCHANT);
        assert_eq!(extract_merchant(""), UNKNOWN_MERCHANT);
    }

    #[test]
    fn test_merchant_truncated_to_fifty_chars() {
        let line = "M".repeat(70);
        assert_eq!(extract_merchant(&line).chars().count(), 50);
    }

    #[test]
    fn test_amount_currency_prefix() {
        assert_eq!(extract_amount("Paid Rs. 1,250.50 by card"), Some(1250.5));
        assert_eq!(extract_amount("TOTAL $42.10"), Some(42.1));
        assert_eq!(extract_amount("₹ 99"), Some(99.0));
    }

    #[test]
    fn test_amount_total_beats_bare_decimal() {
        assert_eq!(extract_amount("Total: 500\nChange 42.00"), Some(500.0));
    }

    #[test]
    fn test_amount_rejects_out_of_range_and_moves_on() {
        // Currency match is zero, so the Total pattern gets its turn
        assert_eq!(extract_amount("Discount $0.00\nTotal: 75.25"), Some(75.25));
        assert_eq!(extract_amount("Total: 1,000,000.00"), None);
    }

    #[test]
    fn test_amount_bare_decimal_last_resort() {
        assert_eq!(extract_amount("Coffee 3.50"), Some(3.5));
        assert_eq!(extract_amount("Coffee 3.5"), Some(3.5));
        assert_eq!(extract_amount("Water 0.125"), Some(0.13));
        assert_eq!(extract_amount("no numbers here"), None);
        assert_eq!(extract_amount("Table 12"), None);
    }

    #[test]
    fn test_amount_keyword_patterns() {
        assert_eq!(extract_amount("Amount: 640"), Some(640.0));
        assert_eq!(extract_amount("GRAND TOTAL 1,999"), Some(1999.0));
    }

    #[test]
    fn test_date_shapes() {
        assert_eq!(extract_date("Date: 12-10-2024"), Some(day(2024, 10, 12)));
        assert_eq!(extract_date("Date: 05/01/2023"), Some(day(2023, 1, 5)));
        assert_eq!(extract_date("2024-03-09 14:22"), Some(day(2024, 3, 9)));
        assert_eq!(extract_date("2024/3/9"), Some(day(2024, 3, 9)));
        assert_eq!(extract_date("Issued 7 Sep 2023"), Some(day(2023, 9, 7)));
        assert_eq!(extract_date("Issued 7 September, 2023"), Some(day(2023, 9, 7)));
        assert_eq!(extract_date("nothing"), None);
    }

    #[test]
    fn test_invalid_day_first_date_falls_through() {
        // 31-02 is not a date; the ISO date later in the text is used instead
        assert_eq!(
            extract_date("ref 31-02-2024\n2024-02-28"),
            Some(day(2024, 2, 28))
        );
    }

    #[test]
    fn test_category_table_order_breaks_ties() {
        assert_eq!(
            categorize("Uber ride to the restaurant"),
            ReceiptCategory::FoodAndDining
        );
        assert_eq!(categorize("CITY PHARMACY"), ReceiptCategory::Healthcare);
        assert_eq!(categorize("Broadband bill"), ReceiptCategory::Utilities);
        assert_eq!(categorize("INVOICE"), ReceiptCategory::Other);
    }

    #[test]
    fn test_confidence_only_tracks_amount() {
        assert_eq!(fallback_confidence(12.0), 0.6);
        assert_eq!(fallback_confidence(0.0), 0.3);
    }

    #[test]
    fn test_cafe_mocha_receipt() {
        let draft = parse_receipt_text("CAFE MOCHA\nTotal: Rs. 350.00\n12-10-2024", day(2025, 1, 1));
        assert_eq!(draft.merchant, "CAFE MOCHA");
        assert_eq!(draft.amount, 350.0);
        assert_eq!(draft.date, day(2024, 10, 12));
        assert_eq!(draft.category, ReceiptCategory::FoodAndDining);
        assert_eq!(draft.confidence, 0.6);
        assert_eq!(draft.parsed_with, ParseStrategy::Fallback);
    }

    #[test]
    fn test_nothing_recognizable() {
        let today = day(2025, 6, 30);
        let draft = parse_receipt_text("~~\n--\n..", today);
        assert_eq!(draft.merchant, UNKNOWN_MERCHANT);
        assert_eq!(draft.amount, 0.0);
        assert_eq!(draft.date, today);
        assert_eq!(draft.category, ReceiptCategory::Other);
        assert_eq!(draft.confidence, 0.3);
        assert_eq!(draft.extracted_text, "~~\n--\n..");
    }
}
