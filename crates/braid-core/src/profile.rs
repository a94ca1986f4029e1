//! Step profiles ("how to step") and crunching profiles ("how much").
//!
//! A [`StepProfile`] is the argument bundle handed to a step function.
//! Equality and hashing are structural, so two profiles built from the
//! same arguments compare equal; the engine relies on this to detect when
//! a cruncher switched profiles mid-run.
//!
//! A [`CrunchingProfile`] adds a [`CrunchTarget`] that tells a cruncher
//! when to stop on its own.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

// ── ProfileValue ─────────────────────────────────────────────────

/// A single positional or keyword argument of a [`StepProfile`].
#[derive(Clone, Debug)]
pub enum ProfileValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Real number. Compared and hashed by bit pattern.
    Float(f64),
    /// Text.
    Str(String),
    /// Nested list of values.
    List(Vec<ProfileValue>),
}

impl ProfileValue {
    /// The value as a float, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The value as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for ProfileValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ProfileValue {}

impl Hash for ProfileValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Bool(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Str(v) => v.hash(state),
            Self::List(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ProfileValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for ProfileValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ProfileValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ProfileValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for ProfileValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ProfileValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ProfileValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for ProfileValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<ProfileValue>> From<Vec<T>> for ProfileValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

// ── StepProfile ──────────────────────────────────────────────────

/// Immutable bundle of positional and keyword arguments for a step function.
///
/// ```
/// use braid_core::StepProfile;
///
/// let a = StepProfile::new().arg(2).kwarg("rate", 0.5);
/// let b = StepProfile::new().arg(2).kwarg("rate", 0.5);
/// assert_eq!(a, b);
/// assert_eq!(a.get_f64("rate"), Some(0.5));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StepProfile {
    args: SmallVec<[ProfileValue; 4]>,
    kwargs: BTreeMap<String, ProfileValue>,
}

impl StepProfile {
    /// An empty profile (no arguments).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<ProfileValue>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument, replacing any previous value.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ProfileValue>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Positional arguments in order.
    pub fn args(&self) -> &[ProfileValue] {
        &self.args
    }

    /// Keyword arguments, sorted by name.
    pub fn kwargs(&self) -> &BTreeMap<String, ProfileValue> {
        &self.kwargs
    }

    /// Positional argument `index`, if present.
    pub fn get_arg(&self, index: usize) -> Option<&ProfileValue> {
        self.args.get(index)
    }

    /// Keyword argument `name`, if present.
    pub fn get_kwarg(&self, name: &str) -> Option<&ProfileValue> {
        self.kwargs.get(name)
    }

    /// Keyword argument `name` as a float.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get_kwarg(name).and_then(ProfileValue::as_f64)
    }

    /// Keyword argument `name` as an integer.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get_kwarg(name).and_then(ProfileValue::as_i64)
    }

    /// Whether the profile carries no arguments at all.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

impl fmt::Display for StepProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepProfile(")?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{arg}")?;
        }
        for (name, value) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

// ── Crunch amounts and targets ───────────────────────────────────

/// How much history a caller wants past a node, relative to that node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CrunchAmount {
    /// This many more nodes.
    Nodes(u64),
    /// Until the clock has advanced by this much.
    Clock(f64),
}

impl CrunchAmount {
    /// Convert to a target for a cruncher starting at `frontier_clock`.
    pub fn target_from(self, frontier_clock: f64) -> CrunchTarget {
        match self {
            Self::Nodes(n) => CrunchTarget::Nodes(n),
            Self::Clock(span) => CrunchTarget::Clock(frontier_clock + span),
        }
    }

    /// Whether a node `depth` hops and `clock_distance` clock units away
    /// from the origin still lies within this amount.
    pub fn reaches(self, depth: u64, clock_distance: f64) -> bool {
        match self {
            Self::Nodes(n) => depth <= n,
            Self::Clock(span) => clock_distance <= span,
        }
    }
}

/// The point at which a cruncher stops on its own.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CrunchTarget {
    /// Stop after producing this many states since the cruncher started.
    Nodes(u64),
    /// Stop at the first state whose clock reaches this value.
    Clock(f64),
}

// ── CrunchingProfile ─────────────────────────────────────────────

/// A [`StepProfile`] plus the target that bounds a cruncher's work.
#[derive(Clone, Debug, PartialEq)]
pub struct CrunchingProfile {
    /// Arguments for the step function.
    pub step_profile: StepProfile,
    /// When to stop.
    pub target: CrunchTarget,
}

impl CrunchingProfile {
    /// Create a crunching profile.
    pub fn new(step_profile: StepProfile, target: CrunchTarget) -> Self {
        Self {
            step_profile,
            target,
        }
    }

    /// Whether a state at `clock`, being the `nodes_produced`-th state
    /// produced, meets the target.
    ///
    /// Evaluated once per produced state, so a cruncher stops exactly at
    /// the target and never runs past it.
    pub fn state_satisfies(&self, clock: f64, nodes_produced: u64) -> bool {
        match self.target {
            CrunchTarget::Nodes(n) => nodes_produced >= n,
            CrunchTarget::Clock(target) => clock >= target,
        }
    }

    /// The profile still owed after `nodes_added` nodes reached the tree.
    ///
    /// Node targets shrink; clock targets are absolute and stay put.
    pub fn remaining_after(&self, nodes_added: u64) -> Self {
        let target = match self.target {
            CrunchTarget::Nodes(n) => CrunchTarget::Nodes(n.saturating_sub(nodes_added)),
            clock @ CrunchTarget::Clock(_) => clock,
        };
        Self::new(self.step_profile.clone(), target)
    }

    /// The same profile with node targets shifted by `offset`.
    ///
    /// Used to translate a frontier-relative node target into the count a
    /// running cruncher measures from its own start.
    pub fn offset_nodes(&self, offset: u64) -> Self {
        let target = match self.target {
            CrunchTarget::Nodes(n) => CrunchTarget::Nodes(n.saturating_add(offset)),
            clock @ CrunchTarget::Clock(_) => clock,
        };
        Self::new(self.step_profile.clone(), target)
    }

    /// Merge a newer request into this one, keeping the further target.
    ///
    /// The existing step profile is kept. Targets of different kinds are
    /// not comparable; the newer request wins outright.
    pub fn merge_max(&self, newer: &CrunchingProfile) -> Self {
        let target = match (self.target, newer.target) {
            (CrunchTarget::Nodes(a), CrunchTarget::Nodes(b)) => CrunchTarget::Nodes(a.max(b)),
            (CrunchTarget::Clock(a), CrunchTarget::Clock(b)) => CrunchTarget::Clock(a.max(b)),
            (_, other) => return Self::new(newer.step_profile.clone(), other),
        };
        Self::new(self.step_profile.clone(), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn structural_equality_and_hash() {
        let a = StepProfile::new().arg(1).arg("x").kwarg("t", 0.5);
        let b = StepProfile::new().arg(1).arg("x").kwarg("t", 0.5);
        let c = StepProfile::new().arg(1).arg("x").kwarg("t", 0.25);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<StepProfile> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn kwarg_order_does_not_matter() {
        let a = StepProfile::new().kwarg("a", 1).kwarg("b", 2);
        let b = StepProfile::new().kwarg("b", 2).kwarg("a", 1);
        assert_eq!(a, b);
    }

    #[test]
    fn display_lists_args_then_kwargs() {
        let p = StepProfile::new().arg(3).kwarg("name", "walk");
        assert_eq!(p.to_string(), "StepProfile(3, name=\"walk\")");
        assert_eq!(StepProfile::new().to_string(), "StepProfile()");
    }

    #[test]
    fn node_target_stops_exactly() {
        let p = CrunchingProfile::new(StepProfile::new(), CrunchTarget::Nodes(3));
        assert!(!p.state_satisfies(100.0, 2));
        assert!(p.state_satisfies(0.0, 3));
    }

    #[test]
    fn clock_target_is_inclusive() {
        let p = CrunchingProfile::new(StepProfile::new(), CrunchTarget::Clock(10.0));
        assert!(!p.state_satisfies(9.5, 1000));
        assert!(p.state_satisfies(10.0, 1));
    }

    #[test]
    fn remaining_after_shrinks_node_targets_only() {
        let nodes = CrunchingProfile::new(StepProfile::new(), CrunchTarget::Nodes(5));
        assert_eq!(nodes.remaining_after(3).target, CrunchTarget::Nodes(2));
        assert_eq!(nodes.remaining_after(9).target, CrunchTarget::Nodes(0));

        let clock = CrunchingProfile::new(StepProfile::new(), CrunchTarget::Clock(5.0));
        assert_eq!(clock.remaining_after(3).target, CrunchTarget::Clock(5.0));
    }

    #[test]
    fn merge_keeps_further_target_and_old_profile() {
        let old = CrunchingProfile::new(StepProfile::new().arg(1), CrunchTarget::Clock(4.0));
        let new = CrunchingProfile::new(StepProfile::new().arg(2), CrunchTarget::Clock(7.0));
        let merged = old.merge_max(&new);
        assert_eq!(merged.target, CrunchTarget::Clock(7.0));
        assert_eq!(merged.step_profile, old.step_profile);

        let shorter = CrunchingProfile::new(StepProfile::new(), CrunchTarget::Clock(1.0));
        assert_eq!(old.merge_max(&shorter).target, CrunchTarget::Clock(4.0));
    }

    #[test]
    fn amount_conversion() {
        assert_eq!(
            CrunchAmount::Clock(2.5).target_from(1.0),
            CrunchTarget::Clock(3.5)
        );
        assert_eq!(CrunchAmount::Nodes(4).target_from(9.0), CrunchTarget::Nodes(4));
        assert!(CrunchAmount::Nodes(2).reaches(2, 100.0));
        assert!(!CrunchAmount::Clock(2.0).reaches(0, 2.5));
    }
}
