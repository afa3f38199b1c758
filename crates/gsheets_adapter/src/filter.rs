use std::cmp::Ordering;

use gsheets_error::{DbError, Result};

use crate::field::Value;

/// Kinds of filters a field can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Equal,
    Range,
}

/// A filter on a single column, as extracted by the host engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal(Value),
    Range {
        start: Option<Value>,
        end: Option<Value>,
        include_start: bool,
        include_end: bool,
    },
    /// A filter no value can satisfy.
    Impossible,
}

impl Filter {
    pub fn greater_than(value: Value) -> Self {
        Filter::Range {
            start: Some(value),
            end: None,
            include_start: false,
            include_end: false,
        }
    }

    pub fn greater_than_or_equal(value: Value) -> Self {
        Filter::Range {
            start: Some(value),
            end: None,
            include_start: true,
            include_end: false,
        }
    }

    pub fn less_than(value: Value) -> Self {
        Filter::Range {
            start: None,
            end: Some(value),
            include_start: false,
            include_end: false,
        }
    }

    pub fn less_than_or_equal(value: Value) -> Self {
        Filter::Range {
            start: None,
            end: Some(value),
            include_start: false,
            include_end: true,
        }
    }

    pub fn kind(&self) -> Option<FilterKind> {
        match self {
            Filter::Equal(_) => Some(FilterKind::Equal),
            Filter::Range { .. } => Some(FilterKind::Range),
            Filter::Impossible => None,
        }
    }

    /// Intersect two filters on the same column.
    ///
    /// Errors if values of different types are compared.
    pub fn combine(self, other: Filter) -> Result<Filter> {
        let combined = match (self, other) {
            (Filter::Impossible, _) | (_, Filter::Impossible) => Filter::Impossible,
            (Filter::Equal(a), Filter::Equal(b)) => {
                if cmp(&a, &b)? == Ordering::Equal {
                    Filter::Equal(a)
                } else {
                    Filter::Impossible
                }
            }
            (Filter::Equal(v), range @ Filter::Range { .. })
            | (range @ Filter::Range { .. }, Filter::Equal(v)) => {
                if range_contains(&range, &v)? {
                    Filter::Equal(v)
                } else {
                    Filter::Impossible
                }
            }
            (
                Filter::Range {
                    start: s1,
                    end: e1,
                    include_start: is1,
                    include_end: ie1,
                },
                Filter::Range {
                    start: s2,
                    end: e2,
                    include_start: is2,
                    include_end: ie2,
                },
            ) => {
                let (start, include_start) = tighter_bound(s1, is1, s2, is2, Ordering::Greater)?;
                let (end, include_end) = tighter_bound(e1, ie1, e2, ie2, Ordering::Less)?;
                Filter::Range {
                    start,
                    end,
                    include_start,
                    include_end,
                }
            }
        };

        combined.normalize()
    }

    /// Collapse empty ranges to `Impossible` and single point ranges to
    /// `Equal`.
    fn normalize(self) -> Result<Filter> {
        if let Filter::Range {
            start: Some(start),
            end: Some(end),
            include_start,
            include_end,
        } = &self
        {
            match cmp(start, end)? {
                Ordering::Greater => return Ok(Filter::Impossible),
                Ordering::Equal if *include_start && *include_end => {
                    return Ok(Filter::Equal(start.clone()));
                }
                Ordering::Equal => return Ok(Filter::Impossible),
                Ordering::Less => (),
            }
        }
        Ok(self)
    }
}

fn cmp(a: &Value, b: &Value) -> Result<Ordering> {
    a.compare(b).ok_or_else(|| {
        DbError::new("Cannot compare filter values")
            .with_field("left", a)
            .with_field("right", b)
    })
}

/// Pick the more restrictive of two bounds. `prefer` is the ordering that
/// makes a bound tighter (greater for lower bounds, less for upper bounds).
fn tighter_bound(
    a: Option<Value>,
    include_a: bool,
    b: Option<Value>,
    include_b: bool,
    prefer: Ordering,
) -> Result<(Option<Value>, bool)> {
    match (a, b) {
        (None, None) => Ok((None, false)),
        (Some(a), None) => Ok((Some(a), include_a)),
        (None, Some(b)) => Ok((Some(b), include_b)),
        (Some(a), Some(b)) => {
            let ord = cmp(&a, &b)?;
            if ord == Ordering::Equal {
                Ok((Some(a), include_a && include_b))
            } else if ord == prefer {
                Ok((Some(a), include_a))
            } else {
                Ok((Some(b), include_b))
            }
        }
    }
}

fn range_contains(range: &Filter, value: &Value) -> Result<bool> {
    let (start, end, include_start, include_end) = match range {
        Filter::Range {
            start,
            end,
            include_start,
            include_end,
        } => (start, end, *include_start, *include_end),
        _ => return Ok(false),
    };

    if let Some(start) = start {
        match cmp(value, start)? {
            Ordering::Less => return Ok(false),
            Ordering::Equal if !include_start => return Ok(false),
            _ => (),
        }
    }
    if let Some(end) = end {
        match cmp(value, end)? {
            Ordering::Greater => return Ok(false),
            Ordering::Equal if !include_end => return Ok(false),
            _ => (),
        }
    }

    Ok(true)
}

/// A filter on a named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub filter: Filter,
}

impl Predicate {
    pub fn new(column: impl Into<String>, filter: Filter) -> Self {
        Predicate {
            column: column.into(),
            filter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedOrder {
    pub column: String,
    pub direction: SortDirection,
}

impl RequestedOrder {
    pub fn asc(column: impl Into<String>) -> Self {
        RequestedOrder {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        RequestedOrder {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Everything the host engine pushes down for a single scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    pub predicates: Vec<Predicate>,
    pub order: Vec<RequestedOrder>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(v: f64) -> Value {
        Value::Float(v)
    }

    #[test]
    fn contradictory_bounds() {
        let combined = Filter::greater_than(f(10.0))
            .combine(Filter::less_than(f(5.0)))
            .unwrap();
        assert_eq!(Filter::Impossible, combined);
    }

    #[test]
    fn overlapping_bounds_tighten() {
        let combined = Filter::greater_than_or_equal(f(1.0))
            .combine(Filter::greater_than(f(3.0)))
            .unwrap()
            .combine(Filter::less_than_or_equal(f(7.0)))
            .unwrap();
        assert_eq!(
            Filter::Range {
                start: Some(f(3.0)),
                end: Some(f(7.0)),
                include_start: false,
                include_end: true,
            },
            combined
        );
    }

    #[test]
    fn equal_bounds_collapse() {
        let combined = Filter::greater_than_or_equal(f(4.0))
            .combine(Filter::less_than_or_equal(f(4.0)))
            .unwrap();
        assert_eq!(Filter::Equal(f(4.0)), combined);

        let combined = Filter::greater_than(f(4.0))
            .combine(Filter::less_than_or_equal(f(4.0)))
            .unwrap();
        assert_eq!(Filter::Impossible, combined);
    }

    #[test]
    fn equal_against_range() {
        let inside = Filter::Equal(f(5.0))
            .combine(Filter::less_than(f(6.0)))
            .unwrap();
        assert_eq!(Filter::Equal(f(5.0)), inside);

        let outside = Filter::less_than(f(5.0))
            .combine(Filter::Equal(f(5.0)))
            .unwrap();
        assert_eq!(Filter::Impossible, outside);
    }

    #[test]
    fn distinct_equalities() {
        let a = Value::String("BR".to_string());
        let b = Value::String("US".to_string());
        let combined = Filter::Equal(a).combine(Filter::Equal(b)).unwrap();
        assert_eq!(Filter::Impossible, combined);
    }

    #[test]
    fn mixed_types_error() {
        let err = Filter::Equal(f(1.0))
            .combine(Filter::Equal(Value::String("1".to_string())))
            .unwrap_err();
        assert_eq!("Cannot compare filter values", err.get_msg());
    }
}
