//! Dimension suffixes on column names: `x`, `x[3]`, `x[2][5]`, `x[n]`, `x[]`.

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::{Error, Result};

/// Per-entry shape of a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    /// Fixed dimensions, outermost first.
    Fixed(Vec<usize>),
    /// Variable length, sized per entry by the named count leaf.
    Dynamic { count: Option<String> },
}

impl Shape {
    /// Number of elements for shapes known without reading a count.
    pub fn len(&self) -> usize {
        match self {
            Shape::Scalar | Shape::Dynamic { .. } => 1,
            Shape::Fixed(dims) => dims.iter().product(),
        }
    }

    pub fn count(&self) -> Option<&str> {
        match self {
            Shape::Dynamic { count } => count.as_deref(),
            _ => None,
        }
    }

    /// Renders `name` with this shape's suffix.
    pub fn render(&self, name: &str) -> String {
        let mut out = name.to_string();
        match self {
            Shape::Scalar => {}
            Shape::Fixed(dims) => {
                for d in dims {
                    let _ = write!(out, "[{d}]");
                }
            }
            Shape::Dynamic { count } => {
                let _ = write!(out, "[{}]", count.as_deref().unwrap_or(""));
            }
        }
        out
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidLeaf {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Splits `s` into its bare name and shape.
pub fn parse_dims(s: &str) -> Result<(String, Shape)> {
    static DIM_RE: OnceLock<Regex> = OnceLock::new();
    let re = DIM_RE.get_or_init(|| Regex::new(r"\[(\w*)\]").expect("valid regex"));

    let Some(open) = s.find('[') else {
        if s.is_empty() {
            return Err(invalid(s, "empty name"));
        }
        return Ok((s.to_string(), Shape::Scalar));
    };
    let (name, suffix) = s.split_at(open);
    if name.is_empty() {
        return Err(invalid(s, "empty name"));
    }

    let mut dims = Vec::new();
    let mut consumed = 0;
    for cap in re.captures_iter(suffix) {
        let (Some(all), Some(dim)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if all.start() != consumed {
            break;
        }
        consumed = all.end();
        dims.push(dim.as_str());
    }
    if consumed != suffix.len() {
        return Err(invalid(s, format!("malformed dimension suffix {suffix:?}")));
    }

    if let [dim] = dims[..] {
        if dim.is_empty() {
            return Ok((name.to_string(), Shape::Dynamic { count: None }));
        }
        if !dim.bytes().all(|b| b.is_ascii_digit()) {
            return Ok((
                name.to_string(),
                Shape::Dynamic {
                    count: Some(dim.to_string()),
                },
            ));
        }
    }

    let fixed = dims
        .iter()
        .map(|d| match d.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(invalid(
                s,
                format!("dimension {d:?}: only the single outer dimension may be variable"),
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((name.to_string(), Shape::Fixed(fixed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dimension_vectors() {
        let cases = [
            ("N", Shape::Scalar),
            ("ArrF32[10]", Shape::Fixed(vec![10])),
            ("Mat[2][3]", Shape::Fixed(vec![2, 3])),
            (
                "SliF64[N]",
                Shape::Dynamic {
                    count: Some("N".into()),
                },
            ),
            ("Sli[]", Shape::Dynamic { count: None }),
        ];
        for (input, want) in cases {
            let (name, shape) = parse_dims(input).unwrap();
            assert_eq!(shape, want, "{input}");
            assert_eq!(shape.render(&name), input);
        }
    }

    #[test]
    fn malformed_suffixes_are_rejected() {
        for bad in ["", "[3]", "x[3", "x[3]y", "x[N][3]", "x[0]", "x[-1]"] {
            assert!(parse_dims(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn fixed_len_is_the_product() {
        assert_eq!(Shape::Fixed(vec![2, 3, 4]).len(), 24);
        assert_eq!(Shape::Scalar.len(), 1);
    }
}
