pub mod error;

/// Shortest text that parses back to exactly `value`, without an exponent.
///
/// `21.5` becomes `"21.5"` and `9.0` becomes `"9"`.
pub fn format_float(value: f64) -> String {
	value.to_string()
}
