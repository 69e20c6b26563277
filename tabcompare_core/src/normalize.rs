use tabcompare_common::{CellValue, CompareConfig, NormalizedKey};

/// How numbers are turned into comparison tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericPolicy {
    /// Shortest decimal form: `1`, `1.0` and `"1"` all become `1`
    #[default]
    Minimal,
    /// Naive string casting as older reports did: integral numbers keep `.0`
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub trim_whitespace: bool,
    pub case_sensitive: bool,
    pub numeric_policy: NumericPolicy,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            trim_whitespace: true,
            case_sensitive: true,
            numeric_policy: NumericPolicy::Minimal,
        }
    }
}

impl From<&CompareConfig> for NormalizeOptions {
    fn from(config: &CompareConfig) -> Self {
        Self {
            trim_whitespace: config.trim_whitespace,
            case_sensitive: config.case_sensitive,
            numeric_policy: if config.legacy_numeric {
                NumericPolicy::Legacy
            } else {
                NumericPolicy::Minimal
            },
        }
    }
}

/// Maps raw cell values to comparison tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueNormalizer {
    options: NormalizeOptions,
}

impl ValueNormalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Token for a cell, or `None` when the cell is null or blank and must be dropped
    pub fn normalize(&self, value: &CellValue) -> Option<NormalizedKey> {
        self.token(value).map(NormalizedKey::new)
    }

    /// Token for one cell of a row tuple; blank cells become the empty string
    pub fn cell_token(&self, value: &CellValue) -> String {
        self.token(value).unwrap_or_default()
    }

    fn token(&self, value: &CellValue) -> Option<String> {
        let raw = match value {
            CellValue::Null => return None,
            CellValue::Text(text) => {
                if text.trim().is_empty() {
                    return None;
                }
                if self.options.trim_whitespace {
                    text.trim().to_string()
                } else {
                    text.clone()
                }
            }
            CellValue::Number(number) => format_number(*number, self.options.numeric_policy),
            CellValue::Boolean(flag) => match self.options.numeric_policy {
                NumericPolicy::Minimal => flag.to_string(),
                NumericPolicy::Legacy => (if *flag { "True" } else { "False" }).to_string(),
            },
        };

        if self.options.case_sensitive {
            Some(raw)
        } else {
            Some(raw.to_lowercase())
        }
    }
}

fn format_number(number: f64, policy: NumericPolicy) -> String {
    if number.is_nan() {
        return match policy {
            NumericPolicy::Minimal => "NaN".to_string(),
            NumericPolicy::Legacy => "nan".to_string(),
        };
    }
    if number.is_infinite() {
        return (if number > 0.0 { "inf" } else { "-inf" }).to_string();
    }
    // -0.0 and 0.0 must share a token
    let number = if number == 0.0 { 0.0 } else { number };

    match policy {
        // f64 Display is already the shortest round-trip form without a trailing `.0`
        NumericPolicy::Minimal => number.to_string(),
        NumericPolicy::Legacy => legacy_number(number),
    }
}

/// Exponent form (`1e+16`, `1.5e-05`) below 1e-4 and from 1e16, else a
/// decimal that keeps `.0` on integral values
fn legacy_number(number: f64) -> String {
    let magnitude = number.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", number);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => formatted,
        };
    }

    if number.fract() == 0.0 {
        format!("{:.1}", number)
    } else {
        number.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(normalizer: &ValueNormalizer, value: CellValue) -> Option<String> {
        normalizer.normalize(&value).map(|key| key.as_str().to_string())
    }

    #[test]
    fn test_null_and_blank_are_dropped() {
        let normalizer = ValueNormalizer::default();
        assert_eq!(token(&normalizer, CellValue::Null), None);
        assert_eq!(token(&normalizer, CellValue::from("")), None);
        assert_eq!(token(&normalizer, CellValue::from("   \t")), None);
    }

    #[test]
    fn test_integral_numbers_match_text() {
        let normalizer = ValueNormalizer::default();
        let from_int = token(&normalizer, CellValue::from(1_i64));
        let from_float = token(&normalizer, CellValue::from(1.0));
        let from_text = token(&normalizer, CellValue::from("1"));
        assert_eq!(from_int.as_deref(), Some("1"));
        assert_eq!(from_int, from_float);
        assert_eq!(from_float, from_text);
    }

    #[test]
    fn test_minimal_decimal_forms() {
        let normalizer = ValueNormalizer::default();
        assert_eq!(token(&normalizer, CellValue::from(2.50)).as_deref(), Some("2.5"));
        assert_eq!(token(&normalizer, CellValue::from(-0.0)).as_deref(), Some("0"));
        assert_eq!(token(&normalizer, CellValue::from(1e15)).as_deref(), Some("1000000000000000"));
        assert_eq!(token(&normalizer, CellValue::from(f64::NAN)).as_deref(), Some("NaN"));
        assert_eq!(token(&normalizer, CellValue::from(f64::NEG_INFINITY)).as_deref(), Some("-inf"));
    }

    #[test]
    fn test_text_trimming_and_case() {
        let normalizer = ValueNormalizer::default();
        assert_eq!(token(&normalizer, CellValue::from("  A-1 ")).as_deref(), Some("A-1"));

        let untrimmed = ValueNormalizer::new(NormalizeOptions {
            trim_whitespace: false,
            ..NormalizeOptions::default()
        });
        assert_eq!(token(&untrimmed, CellValue::from(" A-1")).as_deref(), Some(" A-1"));

        let folded = ValueNormalizer::new(NormalizeOptions {
            case_sensitive: false,
            ..NormalizeOptions::default()
        });
        assert_eq!(
            folded.normalize(&CellValue::from("ABC")),
            folded.normalize(&CellValue::from("abc"))
        );
    }

    #[test]
    fn test_legacy_policy_keeps_float_suffix() {
        let legacy = ValueNormalizer::new(NormalizeOptions {
            numeric_policy: NumericPolicy::Legacy,
            ..NormalizeOptions::default()
        });
        assert_eq!(token(&legacy, CellValue::from(1.0)).as_deref(), Some("1.0"));
        assert_eq!(token(&legacy, CellValue::from(2.5)).as_deref(), Some("2.5"));
        assert_eq!(token(&legacy, CellValue::from(true)).as_deref(), Some("True"));
        assert_ne!(
            legacy.normalize(&CellValue::from(1.0)),
            legacy.normalize(&CellValue::from("1"))
        );
    }

    #[test]
    fn test_legacy_policy_uses_exponent_outside_decimal_range() {
        let legacy = ValueNormalizer::new(NormalizeOptions {
            numeric_policy: NumericPolicy::Legacy,
            ..NormalizeOptions::default()
        });
        let render = |number: f64| token(&legacy, CellValue::from(number)).unwrap();

        assert_eq!(render(1e16), "1e+16");
        assert_eq!(render(-2.5e20), "-2.5e+20");
        assert_eq!(render(1e-5), "1e-05");
        assert_eq!(render(1.5e-7), "1.5e-07");
        assert_eq!(render(1e-100), "1e-100");
        assert_eq!(render(1e15), "1000000000000000.0");
        assert_eq!(render(0.0001), "0.0001");
        assert_eq!(render(0.0), "0.0");
    }

    #[test]
    fn test_cell_token_blank_is_empty_string() {
        let normalizer = ValueNormalizer::default();
        assert_eq!(normalizer.cell_token(&CellValue::Null), "");
        assert_eq!(normalizer.cell_token(&CellValue::from(false)), "false");
    }

    #[test]
    fn test_options_from_config() {
        let config = CompareConfig {
            legacy_numeric: true,
            case_sensitive: false,
            ..CompareConfig::default()
        };
        let options = NormalizeOptions::from(&config);
        assert_eq!(options.numeric_policy, NumericPolicy::Legacy);
        assert!(!options.case_sensitive);
        assert!(options.trim_whitespace);
    }
}
