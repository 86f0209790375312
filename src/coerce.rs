// 🧮 Scalar coercion
//
// Source cells are frequently empty, textual or malformed. Coercion never
// fails: a value that does not parse as the target type is "no data"
// (`None`), or the caller-supplied default in the `*_or` helpers.

use crate::grid::Cell;

/// Something that may hold a number
pub trait Scalar {
    fn to_int(&self) -> Option<i64>;
    fn to_float(&self) -> Option<f64>;
}

impl Scalar for str {
    fn to_int(&self) -> Option<i64> {
        self.trim().parse::<i64>().ok()
    }

    fn to_float(&self) -> Option<f64> {
        self.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
    }
}

impl Scalar for String {
    fn to_int(&self) -> Option<i64> {
        self.as_str().to_int()
    }

    fn to_float(&self) -> Option<f64> {
        self.as_str().to_float()
    }
}

impl Scalar for f64 {
    /// Truncates toward zero; NaN and infinities are not integers
    fn to_int(&self) -> Option<i64> {
        if self.is_finite() && *self >= i64::MIN as f64 && *self <= i64::MAX as f64 {
            Some(self.trunc() as i64)
        } else {
            None
        }
    }

    fn to_float(&self) -> Option<f64> {
        Some(*self).filter(|v| !v.is_nan())
    }
}

impl Scalar for i64 {
    fn to_int(&self) -> Option<i64> {
        Some(*self)
    }

    fn to_float(&self) -> Option<f64> {
        Some(*self as f64)
    }
}

impl Scalar for Cell {
    fn to_int(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Float(v) => v.to_int(),
            Cell::Text(s) => s.to_int(),
            Cell::Empty | Cell::Bool(_) => None,
        }
    }

    fn to_float(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(v) => v.to_float(),
            Cell::Text(s) => s.to_float(),
            Cell::Empty | Cell::Bool(_) => None,
        }
    }
}

impl<T: Scalar + ?Sized> Scalar for Option<&T> {
    fn to_int(&self) -> Option<i64> {
        self.and_then(|v| v.to_int())
    }

    fn to_float(&self) -> Option<f64> {
        self.and_then(|v| v.to_float())
    }
}

/// Integer value of `value`, or `default` when it does not parse
pub fn int_or<T: Scalar + ?Sized>(value: &T, default: i64) -> i64 {
    value.to_int().unwrap_or(default)
}

/// Float value of `value`, or `default` when it does not parse (NaN included)
pub fn float_or<T: Scalar + ?Sized>(value: &T, default: f64) -> f64 {
    value.to_float().unwrap_or(default)
}

/// Percentage (0–100) to fraction (0–1)
pub fn percent_to_fraction(value: Option<f64>) -> Option<f64> {
    value.map(|v| v / 100.0)
}

/// `numerator / denominator` when both are known and the denominator is positive
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => Some(n / d),
        _ => None,
    }
}

/// Sum of the known values; `None` only when every value is unknown
pub fn sum_known<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}
