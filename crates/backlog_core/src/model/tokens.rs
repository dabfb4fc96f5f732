//! Token estimate parsing and effort bucketing.
//!
//! Estimates are free text such as `~30K`, `1.2M`, `800-1.1M` or `-`.

use serde::Serialize;

/// Parses a token estimate into an integer count.
///
/// Ranges keep their lower bound. Unparsable input yields `0`.
pub fn parse_tokens(value: &str) -> u64 {
    if value.trim().is_empty() || value.trim() == "-" {
        return 0;
    }

    let cleaned = value.replace(['~', ','], "").to_uppercase();
    let mut text = cleaned.trim();

    if !text.starts_with('-') {
        if let Some((lower, _)) = text.split_once('-') {
            text = lower.trim();
        }
    }

    if text.contains('K') {
        return scaled(&text.replace('K', ""), 1_000.0);
    }
    if text.contains('M') {
        return scaled(&text.replace('M', ""), 1_000_000.0);
    }

    text.parse::<u64>().unwrap_or(0)
}

fn scaled(mantissa: &str, factor: f64) -> u64 {
    match mantissa.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * factor) as u64,
        _ => 0,
    }
}

/// Renders a token count in thousands, e.g. `125K`.
pub fn format_thousands(tokens: u64) -> String {
    format!("{:.0}K", tokens as f64 / 1000.0)
}

/// Size class of an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum EffortBucket {
    Small,
    Medium,
    Large,
    XLarge,
}

impl EffortBucket {
    pub const ALL: &'static [EffortBucket] =
        &[Self::Small, Self::Medium, Self::Large, Self::XLarge];

    pub fn for_tokens(tokens: u64) -> Self {
        match tokens {
            0..=19_999 => Self::Small,
            20_000..=49_999 => Self::Medium,
            50_000..=99_999 => Self::Large,
            _ => Self::XLarge,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Small => "small (<20K)",
            Self::Medium => "medium (20-50K)",
            Self::Large => "large (50-100K)",
            Self::XLarge => "xlarge (>100K)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{format_thousands, parse_tokens, EffortBucket};

    #[test]
    fn parses_suffixes_and_ranges() {
        assert_eq!(parse_tokens("~30K"), 30_000);
        assert_eq!(parse_tokens("1.5M"), 1_500_000);
        assert_eq!(parse_tokens("800-1.1M"), 800);
        assert_eq!(parse_tokens("20K-40K"), 20_000);
        assert_eq!(parse_tokens("12,500"), 12_500);
    }

    #[test]
    fn placeholders_and_garbage_are_zero() {
        assert_eq!(parse_tokens("-"), 0);
        assert_eq!(parse_tokens(""), 0);
        assert_eq!(parse_tokens("lots"), 0);
        assert_eq!(parse_tokens("xK"), 0);
    }

    #[test]
    fn buckets_split_at_documented_boundaries() {
        assert_eq!(EffortBucket::for_tokens(19_999), EffortBucket::Small);
        assert_eq!(EffortBucket::for_tokens(20_000), EffortBucket::Medium);
        assert_eq!(EffortBucket::for_tokens(99_999), EffortBucket::Large);
        assert_eq!(EffortBucket::for_tokens(100_000), EffortBucket::XLarge);
    }

    #[test]
    fn formats_in_thousands() {
        assert_eq!(format_thousands(125_000), "125K");
        assert_eq!(format_thousands(0), "0K");
    }
}
