// display.rs

use std::fmt::Write as _;
use std::io::Write;

use crate::dtype::Value;
use crate::error::Result;
use crate::query::QueryRow;

/// How `-1` sentinel values are rendered in text output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Print the stored number as is.
    #[default]
    Literal,
    /// Print this marker in place of the leading field of a missing value.
    Marker(String),
}

#[derive(Debug, Clone)]
pub struct DisplayOptions {
    /// Digits after the decimal point for floating point fields.
    pub precision: usize,
    pub missing: MissingPolicy,
    /// Emit a column-name line before the first row.
    pub header: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            precision: 6,
            missing: MissingPolicy::Literal,
            header: true,
        }
    }
}

impl DisplayOptions {
    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Append `value` to `out`. Composite values become two tab-separated fields.
    pub fn format_value(&self, value: &Value, out: &mut String) {
        if let (true, MissingPolicy::Marker(marker)) = (value.is_missing(), &self.missing) {
            out.push_str(marker);
            match value {
                Value::FloatInt(_, b) => {
                    let _ = write!(out, "\t{}", b);
                }
                Value::FloatFloat(_, b) => {
                    let _ = write!(out, "\t{:.*}", self.precision, b);
                }
                _ => {}
            }
            return;
        }

        // Writing into a String cannot fail.
        let _ = match value {
            Value::Int(v) => write!(out, "{}", v),
            Value::Float(v) => write!(out, "{:.*}", self.precision, v),
            Value::Double(v) => write!(out, "{:.*}", self.precision, v),
            Value::Char(c) => write!(out, "{}", *c as char),
            Value::Str(s) => write!(out, "{}", s),
            Value::FloatInt(a, b) => write!(out, "{:.*}\t{}", self.precision, a, b),
            Value::FloatFloat(a, b) => {
                write!(out, "{:.*}\t{:.*}", self.precision, a, self.precision, b)
            }
        };
    }

    pub fn value_to_string(&self, value: &Value) -> String {
        let mut out = String::new();
        self.format_value(value, &mut out);
        out
    }
}

/// Write query rows as tab-separated text.
///
/// Rows carrying a sample label get a `sample` column.
pub fn write_rows<W: Write>(rows: &[QueryRow], options: &DisplayOptions, out: &mut W) -> Result<()> {
    let with_sample = rows.iter().any(|r| r.sample.is_some());
    let pair = rows.first().map_or(false, |r| r.value.is_pair());

    if options.header {
        let mut line = String::from("seqname\tstart\tend");
        if with_sample {
            line.push_str("\tsample");
        }
        line.push_str(if pair { "\tvalue1\tvalue2" } else { "\tvalue" });
        writeln!(out, "{}", line)?;
    }

    // Re-usable line buffer
    let mut line = String::new();
    for row in rows {
        line.clear();
        let _ = write!(line, "{}\t{}\t{}", row.seqname, row.start, row.end);
        if with_sample {
            line.push('\t');
            line.push_str(row.sample.as_deref().unwrap_or("."));
        }
        line.push('\t');
        options.format_value(&row.value, &mut line);
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_scalars() {
        let options = DisplayOptions::default().precision(2);
        assert_eq!(options.value_to_string(&Value::Int(-1)), "-1");
        assert_eq!(options.value_to_string(&Value::Double(0.126)), "0.13");
        assert_eq!(options.value_to_string(&Value::Char(b'C')), "C");
        assert_eq!(options.value_to_string(&Value::FloatInt(0.5, 12)), "0.50\t12");
    }

    #[test]
    fn test_missing_marker() {
        let options = DisplayOptions::default().missing(MissingPolicy::Marker("NA".into()));
        assert_eq!(options.value_to_string(&Value::Float(-1.0)), "NA");
        assert_eq!(options.value_to_string(&Value::Float(0.0)), "0.000000");
        assert_eq!(options.value_to_string(&Value::FloatInt(-1.0, 3)), "NA\t3");
    }

    #[test]
    fn test_write_rows() {
        let rows = vec![
            QueryRow {
                seqname: "chr1".into(),
                start: 100,
                end: 102,
                sample: Some("a".into()),
                value: Value::Int(3),
            },
            QueryRow {
                seqname: "chr1".into(),
                start: 100,
                end: 102,
                sample: Some("b".into()),
                value: Value::Int(-1),
            },
        ];
        let mut out = Vec::new();
        write_rows(&rows, &DisplayOptions::default(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "seqname\tstart\tend\tsample\tvalue\nchr1\t100\t102\ta\t3\nchr1\t100\t102\tb\t-1\n"
        );
    }
}
