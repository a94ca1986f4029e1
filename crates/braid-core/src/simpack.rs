//! Simulation packages: the domain logic the engine drives.
//!
//! A [`Simpack`] binds exactly one step form, chosen explicitly through
//! [`StepFunction`]:
//!
//! | Variant | Input | Output |
//! |---------|-------|--------|
//! | `Simple` | previous state | next state |
//! | `SimpleHistory` | history view | next state |
//! | `Generator` | starting state | lazy sequence of states |
//! | `HistoryGenerator` | history view | lazy sequence of states |
//!
//! [`SimpackBuilder::build`] rejects a package with no step function and
//! a package mixing history-dependent and plain forms. When both the
//! plain and the generator form of the same kind are supplied, the
//! generator is used.

use std::fmt;
use std::sync::Arc;

use crate::error::{SimpackError, StepError};
use crate::history::History;
use crate::profile::StepProfile;
use crate::state::State;

/// Result of a single step.
pub type StepResult<S> = Result<S, StepError>;

/// Lazy sequence of produced states. Ends after the first error.
pub type StateIter<S> = Box<dyn Iterator<Item = StepResult<S>> + Send>;

/// Shared handle to a history view, owned by a history generator.
pub type HistoryHandle<S> = Arc<dyn History<S>>;

type SimpleStepFn<S> = dyn Fn(&S, &StepProfile) -> StepResult<S> + Send + Sync;
type HistoryStepFn<S> = dyn Fn(&dyn History<S>, &StepProfile) -> StepResult<S> + Send + Sync;
type GeneratorFn<S> = dyn Fn(S, StepProfile) -> StateIter<S> + Send + Sync;
type HistoryGeneratorFn<S> = dyn Fn(HistoryHandle<S>, StepProfile) -> StateIter<S> + Send + Sync;
type RootFactory<S> = dyn Fn() -> S + Send + Sync;

/// The four step forms a simulation package may supply.
pub enum StepFunction<S: State> {
    /// `(state, profile) -> state`.
    Simple(Arc<SimpleStepFn<S>>),
    /// `(history, profile) -> state`.
    SimpleHistory(Arc<HistoryStepFn<S>>),
    /// `(state, profile) -> iterator of states`.
    Generator(Arc<GeneratorFn<S>>),
    /// `(history, profile) -> iterator of states`.
    HistoryGenerator(Arc<HistoryGeneratorFn<S>>),
}

impl<S: State> Clone for StepFunction<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Simple(f) => Self::Simple(Arc::clone(f)),
            Self::SimpleHistory(f) => Self::SimpleHistory(Arc::clone(f)),
            Self::Generator(f) => Self::Generator(Arc::clone(f)),
            Self::HistoryGenerator(f) => Self::HistoryGenerator(Arc::clone(f)),
        }
    }
}

/// Tag of a [`StepFunction`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// See [`StepFunction::Simple`].
    Simple,
    /// See [`StepFunction::SimpleHistory`].
    SimpleHistory,
    /// See [`StepFunction::Generator`].
    Generator,
    /// See [`StepFunction::HistoryGenerator`].
    HistoryGenerator,
}

impl StepKind {
    /// Whether steps of this kind read history rather than one state.
    pub fn is_history_dependent(self) -> bool {
        matches!(self, Self::SimpleHistory | Self::HistoryGenerator)
    }
}

impl<S: State> StepFunction<S> {
    /// The variant tag.
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Simple(_) => StepKind::Simple,
            Self::SimpleHistory(_) => StepKind::SimpleHistory,
            Self::Generator(_) => StepKind::Generator,
            Self::HistoryGenerator(_) => StepKind::HistoryGenerator,
        }
    }
}

/// What a step iterator starts from.
pub enum StepStart<S: State> {
    /// A plain state (non-history-dependent steps).
    State(S),
    /// A history view (history-dependent steps).
    History(HistoryHandle<S>),
}

/// A bound simulation package.
pub struct Simpack<S: State> {
    name: String,
    step: StepFunction<S>,
    create_root: Option<Arc<RootFactory<S>>>,
    create_messy_root: Option<Arc<RootFactory<S>>>,
    default_step_profile: StepProfile,
}

impl<S: State> Clone for Simpack<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            step: self.step.clone(),
            create_root: self.create_root.clone(),
            create_messy_root: self.create_messy_root.clone(),
            default_step_profile: self.default_step_profile.clone(),
        }
    }
}

impl<S: State> fmt::Debug for Simpack<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simpack")
            .field("name", &self.name)
            .field("step", &self.step.kind())
            .field("create_root", &self.create_root.is_some())
            .field("create_messy_root", &self.create_messy_root.is_some())
            .field("default_step_profile", &self.default_step_profile)
            .finish()
    }
}

impl<S: State> Simpack<S> {
    /// Start building a simulation package.
    pub fn builder(name: impl Into<String>) -> SimpackBuilder<S> {
        SimpackBuilder::new(name)
    }

    /// Package name, for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bound step form.
    pub fn step_function(&self) -> &StepFunction<S> {
        &self.step
    }

    /// Whether steps need a history view.
    pub fn is_history_dependent(&self) -> bool {
        self.step.kind().is_history_dependent()
    }

    /// Profile used when a caller does not name one.
    pub fn default_step_profile(&self) -> &StepProfile {
        &self.default_step_profile
    }

    /// A fresh initial state, if the package provides a factory.
    pub fn create_root(&self) -> Option<S> {
        self.create_root.as_ref().map(|factory| factory())
    }

    /// A randomized initial state, if the package provides a factory.
    pub fn create_messy_root(&self) -> Option<S> {
        self.create_messy_root.as_ref().map(|factory| factory())
    }

    /// Build the step iterator for `start` under `profile`.
    ///
    /// # Errors
    ///
    /// [`SimpackError::StartMismatch`] if a history-dependent package is
    /// started from a plain state or vice versa.
    pub fn steps_from(
        &self,
        start: StepStart<S>,
        profile: StepProfile,
    ) -> Result<StateIter<S>, SimpackError> {
        match (&self.step, start) {
            (StepFunction::Simple(step), StepStart::State(state)) => Ok(Box::new(SimpleSteps {
                step: Arc::clone(step),
                current: Some(state),
                profile,
            })),
            (StepFunction::Generator(generator), StepStart::State(state)) => {
                Ok(Box::new(generator(state, profile).fuse()))
            }
            (StepFunction::SimpleHistory(step), StepStart::History(history)) => {
                Ok(Box::new(HistorySteps {
                    step: Arc::clone(step),
                    history,
                    profile,
                    finished: false,
                }))
            }
            (StepFunction::HistoryGenerator(generator), StepStart::History(history)) => {
                Ok(Box::new(generator(history, profile).fuse()))
            }
            (step, _) => Err(SimpackError::StartMismatch {
                name: self.name.clone(),
                expected: if step.kind().is_history_dependent() {
                    "history view"
                } else {
                    "state"
                },
            }),
        }
    }
}

/// Repeated application of a plain step function.
struct SimpleSteps<S: State> {
    step: Arc<SimpleStepFn<S>>,
    current: Option<S>,
    profile: StepProfile,
}

impl<S: State> Iterator for SimpleSteps<S> {
    type Item = StepResult<S>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        match (self.step)(&current, &self.profile) {
            Ok(next) => {
                self.current = Some(next.clone());
                Some(Ok(next))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Repeated application of a history-dependent step function.
///
/// The history view grows as the caller publishes each produced state,
/// so every call sees its predecessor.
struct HistorySteps<S: State> {
    step: Arc<HistoryStepFn<S>>,
    history: HistoryHandle<S>,
    profile: StepProfile,
    finished: bool,
}

impl<S: State> Iterator for HistorySteps<S> {
    type Item = StepResult<S>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = (self.step)(&*self.history, &self.profile);
        self.finished = result.is_err();
        Some(result)
    }
}

// ── SimpackBuilder ───────────────────────────────────────────────

/// Builder for [`Simpack`]. Validation happens in [`build`](Self::build).
pub struct SimpackBuilder<S: State> {
    name: String,
    step: Option<Arc<SimpleStepFn<S>>>,
    history_step: Option<Arc<HistoryStepFn<S>>>,
    step_generator: Option<Arc<GeneratorFn<S>>>,
    history_step_generator: Option<Arc<HistoryGeneratorFn<S>>>,
    create_root: Option<Arc<RootFactory<S>>>,
    create_messy_root: Option<Arc<RootFactory<S>>>,
    default_step_profile: StepProfile,
}

impl<S: State> SimpackBuilder<S> {
    /// Start an empty builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step: None,
            history_step: None,
            step_generator: None,
            history_step_generator: None,
            create_root: None,
            create_messy_root: None,
            default_step_profile: StepProfile::default(),
        }
    }

    /// Supply a plain step function.
    pub fn step(
        mut self,
        f: impl Fn(&S, &StepProfile) -> StepResult<S> + Send + Sync + 'static,
    ) -> Self {
        self.step = Some(Arc::new(f));
        self
    }

    /// Supply a history-dependent step function.
    pub fn history_step(
        mut self,
        f: impl Fn(&dyn History<S>, &StepProfile) -> StepResult<S> + Send + Sync + 'static,
    ) -> Self {
        self.history_step = Some(Arc::new(f));
        self
    }

    /// Supply a plain step generator.
    pub fn step_generator(
        mut self,
        f: impl Fn(S, StepProfile) -> StateIter<S> + Send + Sync + 'static,
    ) -> Self {
        self.step_generator = Some(Arc::new(f));
        self
    }

    /// Supply a history-dependent step generator.
    pub fn history_step_generator(
        mut self,
        f: impl Fn(HistoryHandle<S>, StepProfile) -> StateIter<S> + Send + Sync + 'static,
    ) -> Self {
        self.history_step_generator = Some(Arc::new(f));
        self
    }

    /// Supply an initial-state factory.
    pub fn create_root(mut self, f: impl Fn() -> S + Send + Sync + 'static) -> Self {
        self.create_root = Some(Arc::new(f));
        self
    }

    /// Supply a randomized initial-state factory.
    pub fn create_messy_root(mut self, f: impl Fn() -> S + Send + Sync + 'static) -> Self {
        self.create_messy_root = Some(Arc::new(f));
        self
    }

    /// Profile used when callers do not name one.
    pub fn default_step_profile(mut self, profile: StepProfile) -> Self {
        self.default_step_profile = profile;
        self
    }

    /// Validate and bind the package.
    ///
    /// # Errors
    ///
    /// [`SimpackError::NoStepFunction`] or
    /// [`SimpackError::MixedHistoryForms`].
    pub fn build(self) -> Result<Simpack<S>, SimpackError> {
        let has_plain = self.step.is_some() || self.step_generator.is_some();
        let has_history = self.history_step.is_some() || self.history_step_generator.is_some();
        if has_plain && has_history {
            return Err(SimpackError::MixedHistoryForms { name: self.name });
        }

        let step = if let Some(generator) = self.history_step_generator {
            StepFunction::HistoryGenerator(generator)
        } else if let Some(step) = self.history_step {
            StepFunction::SimpleHistory(step)
        } else if let Some(generator) = self.step_generator {
            StepFunction::Generator(generator)
        } else if let Some(step) = self.step {
            StepFunction::Simple(step)
        } else {
            return Err(SimpackError::NoStepFunction { name: self.name });
        };

        Ok(Simpack {
            name: self.name,
            step,
            create_root: self.create_root,
            create_messy_root: self.create_messy_root,
            default_step_profile: self.default_step_profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Count(u64);
    impl State for Count {}

    fn plus_one(state: &Count, _: &StepProfile) -> StepResult<Count> {
        Ok(Count(state.0 + 1))
    }

    #[test]
    fn rejects_missing_step() {
        let err = SimpackBuilder::<Count>::new("empty").build().unwrap_err();
        assert_eq!(
            err,
            SimpackError::NoStepFunction {
                name: "empty".into()
            }
        );
    }

    #[test]
    fn rejects_mixed_forms() {
        let err = SimpackBuilder::<Count>::new("mixed")
            .step(plus_one)
            .history_step(|history, _| Ok(Count(history.len()? as u64)))
            .build()
            .unwrap_err();
        assert!(matches!(err, SimpackError::MixedHistoryForms { .. }));
    }

    #[test]
    fn generator_wins_over_plain_step() {
        let pack = SimpackBuilder::<Count>::new("both")
            .step(plus_one)
            .step_generator(|state, _| {
                Box::new((1..).map(move |i| Ok(Count(state.0 + 10 * i))))
            })
            .build()
            .unwrap();
        assert_eq!(pack.step_function().kind(), StepKind::Generator);
        assert!(!pack.is_history_dependent());
    }

    #[test]
    fn simple_steps_chain() {
        let pack = Simpack::builder("count").step(plus_one).build().unwrap();
        let states: Vec<_> = pack
            .steps_from(StepStart::State(Count(0)), StepProfile::new())
            .unwrap()
            .take(3)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(states, vec![Count(1), Count(2), Count(3)]);
    }

    #[test]
    fn simple_steps_stop_after_error() {
        let pack = Simpack::builder("short")
            .step(|state: &Count, _: &StepProfile| {
                if state.0 >= 2 {
                    Err(StepError::WorldEnded)
                } else {
                    Ok(Count(state.0 + 1))
                }
            })
            .build()
            .unwrap();
        let results: Vec<_> = pack
            .steps_from(StepStart::State(Count(0)), StepProfile::new())
            .unwrap()
            .collect();
        assert_eq!(
            results,
            vec![Ok(Count(1)), Ok(Count(2)), Err(StepError::WorldEnded)]
        );
    }

    #[test]
    fn profile_reaches_step() {
        let pack = Simpack::builder("stride")
            .step(|state: &Count, profile: &StepProfile| {
                let stride = profile.get_i64("stride").unwrap_or(1) as u64;
                Ok(Count(state.0 + stride))
            })
            .build()
            .unwrap();
        let mut steps = pack
            .steps_from(
                StepStart::State(Count(0)),
                StepProfile::new().kwarg("stride", 5),
            )
            .unwrap();
        assert_eq!(steps.next(), Some(Ok(Count(5))));
    }

    #[test]
    fn root_factories() {
        let pack = Simpack::builder("roots")
            .step(plus_one)
            .create_root(|| Count(0))
            .build()
            .unwrap();
        assert_eq!(pack.create_root(), Some(Count(0)));
        assert_eq!(pack.create_messy_root(), None);
    }
}
