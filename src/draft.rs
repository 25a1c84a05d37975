//! # Receipt Draft Types
//!
//! The pipeline's single output entity and the closed vocabularies it uses.
//! A draft is handed to the transaction-creation flow for the user to review;
//! nothing in this crate persists or mutates it afterwards.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Merchant sentinel used when no merchant could be determined
pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// Maximum merchant length kept in a draft, in characters
pub const MAX_MERCHANT_LENGTH: usize = 50;

/// Spending categories a receipt can be filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReceiptCategory {
    #[serde(rename = "Food & Dining")]
    FoodAndDining,
    #[serde(rename = "Shopping")]
    Shopping,
    #[serde(rename = "Transportation")]
    Transportation,
    #[serde(rename = "Entertainment")]
    Entertainment,
    #[serde(rename = "Healthcare")]
    Healthcare,
    #[serde(rename = "Utilities")]
    Utilities,
    #[default]
    #[serde(rename = "Other")]
    Other,
}

impl ReceiptCategory {
    /// Every category, in declaration order
    pub const ALL: [ReceiptCategory; 7] = [
        ReceiptCategory::FoodAndDining,
        ReceiptCategory::Shopping,
        ReceiptCategory::Transportation,
        ReceiptCategory::Entertainment,
        ReceiptCategory::Healthcare,
        ReceiptCategory::Utilities,
        ReceiptCategory::Other,
    ];

    /// Display label, identical to the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            ReceiptCategory::FoodAndDining => "Food & Dining",
            ReceiptCategory::Shopping => "Shopping",
            ReceiptCategory::Transportation => "Transportation",
            ReceiptCategory::Entertainment => "Entertainment",
            ReceiptCategory::Healthcare => "Healthcare",
            ReceiptCategory::Utilities => "Utilities",
            ReceiptCategory::Other => "Other",
        }
    }

    /// Case-insensitive lookup by label; anything unrecognized maps to `Other`
    pub fn from_label(label: &str) -> Self {
        let wanted = label.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.label().eq_ignore_ascii_case(wanted))
            .unwrap_or(ReceiptCategory::Other)
    }
}

impl std::fmt::Display for ReceiptCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which parser produced a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStrategy {
    /// Model-based extraction
    Primary,
    /// Deterministic regex/keyword extraction
    Fallback,
}

impl ParseStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStrategy::Primary => "primary",
            ParseStrategy::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured, unconfirmed transaction candidate extracted from a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDraft {
    /// Merchant name, or [`UNKNOWN_MERCHANT`]
    pub merchant: String,
    /// Total amount; `0.0` when no amount was found
    pub amount: f64,
    /// Receipt date; the processing date when none was found
    pub date: NaiveDate,
    /// Spending category
    pub category: ReceiptCategory,
    /// Raw OCR output, kept verbatim
    pub extracted_text: String,
    /// Heuristic quality signal in [0, 1]
    pub confidence: f64,
    /// Parser that produced this draft
    pub parsed_with: ParseStrategy,
}

impl ReceiptDraft {
    /// Whether the merchant is the "not found" sentinel
    pub fn has_unknown_merchant(&self) -> bool {
        is_unknown_merchant(&self.merchant)
    }
}

/// True for the merchant sentinel (compared trimmed and case-insensitively)
/// and for blank merchants.
pub fn is_unknown_merchant(merchant: &str) -> bool {
    let trimmed = merchant.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN_MERCHANT)
}

/// Trim and cut a merchant name to [`MAX_MERCHANT_LENGTH`] characters
pub fn truncate_merchant(merchant: &str) -> String {
    merchant.trim().chars().take(MAX_MERCHANT_LENGTH).collect::<String>().trim_end().to_string()
}

/// Force an amount into the draft invariant: finite, non-negative, 2 decimals
pub fn sanitize_amount(amount: f64) -> f64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0.0;
    }
    // Scaling can overflow near f64::MAX
    let rounded = (amount * 100.0).round() / 100.0;
    if rounded.is_finite() {
        rounded
    } else {
        0.0
    }
}

/// Force a confidence into [0, 1]; non-finite values become 0
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
