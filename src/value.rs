//! Primitive value type
//!
//! Every expression evaluates to one of three primitives: a boolean, a double
//! or a string. Variables cache a `Primitive` together with its numeric and
//! string projections.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// A dynamically typed expression result
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Bool(bool),
    Double(f64),
    Str(Rc<str>),
}

/// Type of a host method parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Bool,
    Double,
    String,
}

impl ParamType {
    pub fn name(&self) -> &'static str {
        match self {
            ParamType::Bool => "bool",
            ParamType::Double => "number",
            ParamType::String => "string",
        }
    }
}

impl Primitive {
    /// Runtime type of this value
    pub fn param_type(&self) -> ParamType {
        match self {
            Primitive::Bool(_) => ParamType::Bool,
            Primitive::Double(_) => ParamType::Double,
            Primitive::Str(_) => ParamType::String,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.param_type().name()
    }

    /// Value equality used for change detection.
    ///
    /// Unlike `==`, two NaNs compare equal so a source stuck at NaN does not
    /// report a change every tick.
    pub fn same_as(&self, other: &Primitive) -> bool {
        match (self, other) {
            (Primitive::Double(a), Primitive::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (a, b) => a == b,
        }
    }

    /// Numeric projection. Booleans map to 1/0, strings that do not parse
    /// as a number map to NaN.
    pub fn to_f64(&self) -> f64 {
        match self {
            Primitive::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Primitive::Double(d) => *d,
            Primitive::Str(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }

    /// Numeric projection suitable for arithmetic: only numbers and numeric
    /// strings qualify.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Primitive::Double(d) => Some(*d),
            Primitive::Str(s) => s.trim().parse::<f64>().ok(),
            Primitive::Bool(_) => None,
        }
    }

    /// Truthiness: only `false` is falsy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Primitive::Bool(false))
    }

    /// Boolean projection used when a bool parameter reads a variable whose
    /// type drifted since binding
    pub fn to_bool_lossy(&self) -> bool {
        match self {
            Primitive::Bool(b) => *b,
            Primitive::Double(d) => *d != 0.0 && !d.is_nan(),
            Primitive::Str(s) => !s.is_empty(),
        }
    }

    /// Convert to the requested parameter type
    pub fn project(&self, ty: ParamType) -> Primitive {
        match ty {
            ParamType::Bool => Primitive::Bool(self.to_bool_lossy()),
            ParamType::Double => Primitive::Double(safe(self.to_f64())),
            ParamType::String => match self {
                Primitive::Str(s) => Primitive::Str(s.clone()),
                other => Primitive::Str(Rc::from(other.to_string())),
            },
        }
    }
}

/// Coerce NaN and infinities to zero
#[inline]
pub fn safe(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Round-trip decimal text for a number: `0`, `0.0` and `0.00` all give `0`
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // -0 folds into 0
        return "0".to_string();
    }
    format!("{}", value)
}

impl Default for Primitive {
    fn default() -> Self {
        Primitive::Double(0.0)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Bool(b) => write!(f, "{}", b),
            Primitive::Double(d) => f.write_str(&format_number(*d)),
            Primitive::Str(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Primitive::Double(v)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::Str(Rc::from(s))
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Primitive::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Primitive {
    fn from(s: Rc<str>) -> Self {
        Primitive::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(45.0), "45");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(-2.5), "-2.5");
    }

    #[test]
    fn test_projections() {
        assert_eq!(Primitive::Bool(true).to_f64(), 1.0);
        assert_eq!(Primitive::from("12.5").to_f64(), 12.5);
        assert!(Primitive::from("abc").to_f64().is_nan());
        assert_eq!(safe(f64::INFINITY), 0.0);
        assert_eq!(safe(f64::NAN), 0.0);
        assert_eq!(Primitive::Double(3.0).to_string(), "3");
    }

    #[test]
    fn test_same_as_treats_nan_as_unchanged() {
        let nan = Primitive::Double(f64::NAN);
        assert!(nan.same_as(&Primitive::Double(f64::NAN)));
        assert!(!Primitive::Double(1.0).same_as(&Primitive::from("1")));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Primitive::Bool(false).is_truthy());
        assert!(Primitive::Double(0.0).is_truthy());
        assert!(Primitive::from("").is_truthy());
    }

    #[test]
    fn test_project() {
        assert_eq!(
            Primitive::Double(f64::NAN).project(ParamType::Double),
            Primitive::Double(0.0)
        );
        assert_eq!(
            Primitive::Double(2.0).project(ParamType::String),
            Primitive::from("2")
        );
        assert_eq!(
            Primitive::Double(2.0).project(ParamType::Bool),
            Primitive::Bool(true)
        );
    }
}
