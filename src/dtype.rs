// dtype.rs
//
// The record codec. A file body is a run of equal-width records and the
// header's dtype tag is the only thing that says how to read them, so every
// supported layout lives in one closed enum.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TbkError};

pub const TAG_INT: i64 = 1;
pub const TAG_FLOAT: i64 = 4;
pub const TAG_DOUBLE: i64 = 5;
pub const TAG_CHAR: i64 = 6;
pub const TAG_STRING: i64 = 7;
pub const TAG_FLOAT_INT: i64 = 31;
pub const TAG_FLOAT_FLOAT: i64 = 32;

/// The low byte of a tag selects the family; for strings the bits above
/// carry the fixed width in bytes.
const FAMILY_MASK: i64 = 0xff;
const STRING_WIDTH_SHIFT: u32 = 8;

/// Widest fixed-width string record, in bytes.
pub const MAX_STRING_WIDTH: usize = u16::MAX as usize;

/// Sentinel for absent numeric values.
pub const MISSING: i32 = -1;

/// Sentinel written for absent `char` values.
pub const MISSING_CHAR: u8 = b'.';

/// Record layouts that can appear in a file body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit signed integer (tags 1, 2 and 3).
    Int,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// One byte.
    Char,
    /// Zero-padded string of the given width in bytes.
    Str(usize),
    /// A float32 followed by an int32.
    FloatInt,
    /// Two float32 values.
    FloatFloat,
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Double(f64),
    Char(u8),
    Str(String),
    FloatInt(f32, i32),
    FloatFloat(f32, f32),
}

impl Value {
    /// Whether this value carries the `-1` missing sentinel in its leading field.
    ///
    /// The codec itself never looks at this; it exists for display and
    /// downstream missingness calculations.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Int(v) => *v == MISSING,
            Value::Float(v) => *v == MISSING as f32,
            Value::Double(v) => *v == MISSING as f64,
            Value::Char(c) => *c == MISSING_CHAR,
            Value::Str(s) => s == "-1",
            Value::FloatInt(v, _) | Value::FloatFloat(v, _) => *v == MISSING as f32,
        }
    }

    /// True for the two-field composite values.
    pub fn is_pair(&self) -> bool {
        matches!(self, Value::FloatInt(..) | Value::FloatFloat(..))
    }
}

impl DType {
    /// Resolve a header tag. Integer tags 1, 2 and 3 all alias [`DType::Int`].
    pub fn from_tag(tag: i64) -> Result<Self> {
        if tag < 0 {
            return Err(TbkError::UnsupportedDType(tag));
        }
        let family = tag & FAMILY_MASK;
        let extra = tag >> STRING_WIDTH_SHIFT;
        let dtype = match (family, extra) {
            (1..=3, 0) => DType::Int,
            (TAG_FLOAT, 0) => DType::Float,
            (TAG_DOUBLE, 0) => DType::Double,
            (TAG_CHAR, 0) => DType::Char,
            (TAG_STRING, 0) => DType::Str(1),
            (TAG_STRING, width) if width as usize <= MAX_STRING_WIDTH => {
                DType::Str(width as usize)
            }
            (TAG_FLOAT_INT, 0) => DType::FloatInt,
            (TAG_FLOAT_FLOAT, 0) => DType::FloatFloat,
            _ => return Err(TbkError::UnsupportedDType(tag)),
        };
        Ok(dtype)
    }

    /// A fixed-width string type, `width` in `1..=MAX_STRING_WIDTH`.
    pub fn string(width: usize) -> Result<Self> {
        let dtype = DType::Str(width);
        dtype.check()?;
        Ok(dtype)
    }

    /// Reject layouts that cannot be written: strings of width zero or
    /// wider than [`MAX_STRING_WIDTH`].
    pub fn check(&self) -> Result<()> {
        match self {
            DType::Str(width) if *width == 0 || *width > MAX_STRING_WIDTH => Err(TbkError::Encode {
                dtype: "string".to_string(),
                value: width.to_string(),
                reason: format!("string width must be between 1 and {}", MAX_STRING_WIDTH),
            }),
            _ => Ok(()),
        }
    }

    /// The tag written to the header.
    pub fn tag(&self) -> i64 {
        match self {
            DType::Int => TAG_INT,
            DType::Float => TAG_FLOAT,
            DType::Double => TAG_DOUBLE,
            DType::Char => TAG_CHAR,
            DType::Str(1) => TAG_STRING,
            DType::Str(width) => TAG_STRING | ((*width as i64) << STRING_WIDTH_SHIFT),
            DType::FloatInt => TAG_FLOAT_INT,
            DType::FloatFloat => TAG_FLOAT_FLOAT,
        }
    }

    /// On-disk width of one record in bytes.
    pub fn width(&self) -> usize {
        match self {
            DType::Int | DType::Float => 4,
            DType::Double | DType::FloatInt | DType::FloatFloat => 8,
            DType::Char => 1,
            DType::Str(width) => *width,
        }
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, DType::FloatInt | DType::FloatFloat)
    }

    /// The value written for a coordinate with no data.
    pub fn missing_value(&self) -> Value {
        match self {
            DType::Int => Value::Int(MISSING),
            DType::Float => Value::Float(MISSING as f32),
            DType::Double => Value::Double(MISSING as f64),
            DType::Char => Value::Char(MISSING_CHAR),
            DType::Str(_) => Value::Str("-1".to_string()),
            DType::FloatInt => Value::FloatInt(MISSING as f32, MISSING),
            DType::FloatFloat => Value::FloatFloat(MISSING as f32, MISSING as f32),
        }
    }

    fn encode_error(&self, value: impl fmt::Debug, reason: impl Into<String>) -> TbkError {
        TbkError::Encode {
            dtype: self.to_string(),
            value: format!("{:?}", value),
            reason: reason.into(),
        }
    }

    /// Encode `value` into `buf`, which must be exactly [`DType::width`] bytes.
    ///
    /// Numeric values are widened or narrowed between the float types and
    /// an `Int` is accepted for either float type; anything else that does
    /// not match the layout is an [`TbkError::Encode`].
    pub fn encode(&self, value: &Value, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.width() {
            return Err(self.encode_error(
                value,
                format!("buffer is {} bytes, record is {}", buf.len(), self.width()),
            ));
        }
        match (self, value) {
            (DType::Int, Value::Int(v)) => buf.copy_from_slice(&v.to_le_bytes()),
            (DType::Float, Value::Float(v)) => buf.copy_from_slice(&v.to_le_bytes()),
            (DType::Float, Value::Double(v)) => buf.copy_from_slice(&(*v as f32).to_le_bytes()),
            (DType::Float, Value::Int(v)) => buf.copy_from_slice(&(*v as f32).to_le_bytes()),
            (DType::Double, Value::Double(v)) => buf.copy_from_slice(&v.to_le_bytes()),
            (DType::Double, Value::Float(v)) => buf.copy_from_slice(&(*v as f64).to_le_bytes()),
            (DType::Double, Value::Int(v)) => buf.copy_from_slice(&(*v as f64).to_le_bytes()),
            (DType::Char, Value::Char(c)) => buf[0] = *c,
            (DType::Str(width), Value::Str(s)) => {
                let mut n = s.len().min(*width);
                while !s.is_char_boundary(n) {
                    n -= 1;
                }
                buf[..n].copy_from_slice(&s.as_bytes()[..n]);
                buf[n..].fill(0);
            }
            (DType::FloatInt, Value::FloatInt(a, b)) => {
                buf[..4].copy_from_slice(&a.to_le_bytes());
                buf[4..].copy_from_slice(&b.to_le_bytes());
            }
            (DType::FloatFloat, Value::FloatFloat(a, b)) => {
                buf[..4].copy_from_slice(&a.to_le_bytes());
                buf[4..].copy_from_slice(&b.to_le_bytes());
            }
            _ => return Err(self.encode_error(value, "value does not match record layout")),
        }
        Ok(())
    }

    /// Parse one text field into a value of this type.
    ///
    /// Composite values are written as two comma-separated fields, e.g. `0.75,12`.
    pub fn parse_value(&self, text: &str) -> Result<Value> {
        let text = text.trim();
        let value = match self {
            DType::Int => Value::Int(self.parse_scalar(text)?),
            DType::Float => Value::Float(self.parse_scalar(text)?),
            DType::Double => Value::Double(self.parse_scalar(text)?),
            DType::Char => match text.as_bytes() {
                [c] => Value::Char(*c),
                _ => return Err(self.encode_error(text, "expected exactly one byte")),
            },
            DType::Str(_) => Value::Str(text.to_string()),
            DType::FloatInt => {
                let (a, b) = self.split_pair(text)?;
                Value::FloatInt(self.parse_scalar(a)?, self.parse_scalar(b)?)
            }
            DType::FloatFloat => {
                let (a, b) = self.split_pair(text)?;
                Value::FloatFloat(self.parse_scalar(a)?, self.parse_scalar(b)?)
            }
        };
        Ok(value)
    }

    fn parse_scalar<T: FromStr>(&self, text: &str) -> Result<T> {
        text.trim()
            .parse()
            .map_err(|_| self.encode_error(text, "not a valid number"))
    }

    fn split_pair<'a>(&self, text: &'a str) -> Result<(&'a str, &'a str)> {
        text.split_once(',')
            .ok_or_else(|| self.encode_error(text, "expected two comma-separated fields"))
    }

    /// Parse and encode a text field in one step.
    pub fn encode_str(&self, text: &str, buf: &mut [u8]) -> Result<()> {
        let value = self.parse_value(text)?;
        self.encode(&value, buf)
    }

    /// Decode one record. `bytes` must be exactly [`DType::width`] long.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.len() != self.width() {
            return Err(TbkError::Decode {
                dtype: self.to_string(),
                expected: self.width(),
                found: bytes.len(),
            });
        }
        let value = match self {
            DType::Int => Value::Int(i32::from_le_bytes(word(bytes, 0))),
            DType::Float => Value::Float(f32::from_le_bytes(word(bytes, 0))),
            DType::Double => {
                let mut b = [0u8; 8];
                b.copy_from_slice(bytes);
                Value::Double(f64::from_le_bytes(b))
            }
            DType::Char => Value::Char(bytes[0]),
            DType::Str(_) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Value::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            DType::FloatInt => Value::FloatInt(
                f32::from_le_bytes(word(bytes, 0)),
                i32::from_le_bytes(word(bytes, 4)),
            ),
            DType::FloatFloat => Value::FloatFloat(
                f32::from_le_bytes(word(bytes, 0)),
                f32::from_le_bytes(word(bytes, 4)),
            ),
        };
        Ok(value)
    }

    /// Guess a numeric type from a sample of text fields: `Int` when every
    /// sample is an integer literal, `Double` when every sample is decimal.
    pub fn infer<S: AsRef<str>>(samples: &[S]) -> Result<Self> {
        if samples.is_empty() {
            return Err(TbkError::Encode {
                dtype: "auto".to_string(),
                value: String::new(),
                reason: "no values to infer a dtype from".to_string(),
            });
        }
        let all = |ok: fn(u8) -> bool| {
            samples.iter().all(|s| {
                let s = s.as_ref().trim();
                !s.is_empty() && s.bytes().all(ok)
            })
        };
        if all(|b| b.is_ascii_digit() || b == b'-') {
            Ok(DType::Int)
        } else if all(|b| b.is_ascii_digit() || b == b'-' || b == b'.') {
            Ok(DType::Double)
        } else {
            let first_bad = samples
                .iter()
                .map(|s| s.as_ref())
                .find(|s| s.parse::<f64>().is_err())
                .unwrap_or_default();
            Err(TbkError::Encode {
                dtype: "auto".to_string(),
                value: first_bad.to_string(),
                reason: "could not detect data type, specify one explicitly".to_string(),
            })
        }
    }
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[at..at + 4]);
    b
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Int => write!(f, "int"),
            DType::Float => write!(f, "float"),
            DType::Double => write!(f, "double"),
            DType::Char => write!(f, "char"),
            DType::Str(1) => write!(f, "string"),
            DType::Str(width) => write!(f, "string:{}", width),
            DType::FloatInt => write!(f, "float.int"),
            DType::FloatFloat => write!(f, "float.float"),
        }
    }
}

impl FromStr for DType {
    type Err = TbkError;

    fn from_str(s: &str) -> Result<Self> {
        let dtype = match s.to_ascii_lowercase().as_str() {
            "int" | "int32" => DType::Int,
            "float" => DType::Float,
            "double" => DType::Double,
            "char" | "chr" => DType::Char,
            "string" => DType::Str(1),
            "float.int" => DType::FloatInt,
            "float.float" => DType::FloatFloat,
            other => match other.strip_prefix("string:") {
                Some(width) => match width.parse::<usize>() {
                    Ok(w) => DType::string(w)?,
                    Err(_) => return Err(format!("Invalid string width in dtype {:?}", s).into()),
                },
                None => return Err(format!("Unrecognized data type: {}", s).into()),
            },
        };
        Ok(dtype)
    }
}
