//! Binary search over monotonic sequences, with rounding.
//!
//! Both tree paths and a cruncher's pending output are sequences whose
//! elements carry a monotonic non-decreasing value (usually the clock).
//! [`binary_search_by_index`] locates the boundary around a target value
//! in O(log n) probes and returns a [`Bracket`]; [`Bracket::round`] then
//! picks the answer the caller asked for.
//!
//! # Bracket semantics
//!
//! - An exact match yields `(m, m)`, where `m` is the **last** element of
//!   the run of equal values.
//! - Otherwise `low` is the last element below the target and `high` the
//!   first element above it. Either side is absent at a boundary.
//! - An empty sequence (or a NaN target) yields `(None, None)`.

/// How to pick a single answer out of a [`Bracket`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rounding {
    /// The element at or just below the target.
    Low,
    /// The element at or just above the target.
    High,
    /// Only an element whose value equals the target.
    Exact,
    /// Whichever side is nearer; ties go to `Low`.
    Closest,
    /// Both sides of the bracket.
    Both,
}

/// The elements straddling a target value.
#[derive(Clone, Debug, PartialEq)]
pub struct Bracket<T> {
    /// Element at or below the target.
    pub low: Option<T>,
    /// Element at or above the target.
    pub high: Option<T>,
    /// Whether `low` and `high` are the same element, equal to the target.
    pub exact: bool,
}

/// The answer of a rounded lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum Rounded<T> {
    /// A single element (`Low`, `High`, `Exact`, `Closest`).
    Single(T),
    /// Both sides (`Both`); either may be absent at a boundary.
    Both(Option<T>, Option<T>),
}

impl<T> Rounded<T> {
    /// The single element, if this is not a `Both` answer.
    pub fn into_single(self) -> Option<T> {
        match self {
            Self::Single(value) => Some(value),
            Self::Both(..) => None,
        }
    }

    /// Apply `f` to every element held.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Rounded<U> {
        match self {
            Self::Single(value) => Rounded::Single(f(value)),
            Self::Both(low, high) => Rounded::Both(low.map(&mut f), high.map(f)),
        }
    }
}

impl<T> Bracket<T> {
    /// No elements on either side.
    pub fn empty() -> Self {
        Self {
            low: None,
            high: None,
            exact: false,
        }
    }

    /// Target lies strictly between `low` and `high`.
    pub fn between(low: Option<T>, high: Option<T>) -> Self {
        Self {
            low,
            high,
            exact: false,
        }
    }

    /// Whether neither side is present.
    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    /// Apply `f` to both sides.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Bracket<U> {
        Bracket {
            low: self.low.map(&mut f),
            high: self.high.map(f),
            exact: self.exact,
        }
    }

    /// Pick the answer for `rounding`.
    ///
    /// `value_of` extracts the monotonic value of an element; it is only
    /// consulted for [`Rounding::Closest`]. Returns `None` when the
    /// requested side does not exist.
    pub fn round(
        self,
        rounding: Rounding,
        target: f64,
        value_of: impl Fn(&T) -> f64,
    ) -> Option<Rounded<T>> {
        match rounding {
            Rounding::Both => Some(Rounded::Both(self.low, self.high)),
            Rounding::Low => self.low.map(Rounded::Single),
            Rounding::High => self.high.map(Rounded::Single),
            Rounding::Exact => {
                if self.exact {
                    self.low.map(Rounded::Single)
                } else {
                    None
                }
            }
            Rounding::Closest => match (self.low, self.high) {
                (Some(low), Some(high)) => {
                    if self.exact {
                        return Some(Rounded::Single(low));
                    }
                    let below = target - value_of(&low);
                    let above = value_of(&high) - target;
                    if above < below {
                        Some(Rounded::Single(high))
                    } else {
                        Some(Rounded::Single(low))
                    }
                }
                (Some(only), None) | (None, Some(only)) => Some(Rounded::Single(only)),
                (None, None) => None,
            },
        }
    }
}

impl<T: Clone> Bracket<T> {
    /// Both sides are the element equal to the target.
    pub fn exact(value: T) -> Self {
        Self {
            low: Some(value.clone()),
            high: Some(value),
            exact: true,
        }
    }
}

/// Locate `target` in a sequence of `len` elements read by index.
///
/// `value_at` must be monotonic non-decreasing over `0..len`. Degenerate
/// cases (empty, everything above, everything below, match at the end)
/// are settled before the loop; the loop keeps
/// `value(low) <= target < value(high)` and therefore lands on the last
/// element of a run of duplicates.
pub fn binary_search_by_index(
    len: usize,
    mut value_at: impl FnMut(usize) -> f64,
    target: f64,
) -> Bracket<usize> {
    if len == 0 || target.is_nan() {
        return Bracket::empty();
    }

    let first_value = value_at(0);
    if target < first_value {
        return Bracket::between(None, Some(0));
    }
    let last_value = value_at(len - 1);
    if target > last_value {
        return Bracket::between(Some(len - 1), None);
    }
    if target == last_value {
        return Bracket::exact(len - 1);
    }

    let mut low = 0;
    let mut low_value = first_value;
    let mut high = len - 1;
    while high - low > 1 {
        let medium = low + (high - low) / 2;
        let medium_value = value_at(medium);
        if medium_value <= target {
            low = medium;
            low_value = medium_value;
        } else {
            high = medium;
        }
    }

    if low_value == target {
        Bracket::exact(low)
    } else {
        Bracket::between(Some(low), Some(high))
    }
}
