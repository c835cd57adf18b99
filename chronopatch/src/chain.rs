use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ChainError, ChainResult, PatchingFailure};
use crate::skip::{SkipCondition, SkipProbe};
use crate::slice::{default_grace, far_future, far_past, Direction, Slice};

pub type SerializeFn<E> = Rc<dyn Fn(&E) -> serde_json::Result<String>>;
pub type DeserializeFn<E> = Rc<dyn Fn(&str) -> serde_json::Result<E>>;
pub type PopulateFn<E> = Rc<dyn Fn(&str, &mut E) -> serde_json::Result<()>>;

/// What happens to already-recorded later entries when a new key date is
/// inserted in front of them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FuturePolicy {
    KeepFuture,
    OverwriteFuture,
}

/// The outcome of reconstructing an entity at a key date.
#[derive(Clone, Debug)]
pub struct Reconstruction<E> {
    pub entity: E,
    pub skipped: Vec<Slice>,
    pub final_deserialization_failed: bool,
}

impl<E> Reconstruction<E> {
    pub fn patches_have_been_skipped(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Like [`Reconstruction`], for the in-place populate flavor where the
/// caller already owns the target entity.
#[derive(Clone, Debug)]
pub struct PopulateOutcome {
    pub skipped: Vec<Slice>,
    pub final_deserialization_failed: bool,
}

/// A gapless sequence of half-open slices covering the whole timeline, each
/// carrying the structural difference to its predecessor's state.
///
/// The entity type only has to cross the JSON boundary: slices themselves
/// never hold an `E`, they hold deltas between serialized states.
pub struct Chain<E> {
    direction: Direction,
    slices: Vec<Slice>,
    serialize: SerializeFn<E>,
    deserialize: DeserializeFn<E>,
    populate: Option<PopulateFn<E>>,
    skip_conditions: Vec<SkipCondition<E>>,
}

impl<E> Debug for Chain<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("direction", &self.direction)
            .field("slices", &self.slices)
            .finish_non_exhaustive()
    }
}

// How far a reconstruction walks: up to and including a key date, or up to
// the state holding just before an instant.
enum Cutoff {
    At(DateTime<Utc>),
    JustBefore(DateTime<Utc>),
}

struct Walk {
    doc: Value,
    skipped: Vec<usize>,
}

impl<E> Chain<E>
where
    E: Serialize + DeserializeOwned,
{
    pub fn new(direction: Direction) -> Self {
        Chain {
            direction,
            slices: Vec::new(),
            serialize: Rc::new(|entity| serde_json::to_string(entity)),
            deserialize: Rc::new(|text| serde_json::from_str(text)),
            populate: None,
            skip_conditions: Vec::new(),
        }
    }

    /// Rebuilds a chain from persisted slices, validating that they form a
    /// single unambiguous cover of the timeline in the chain's direction.
    pub fn from_slices(direction: Direction, slices: Vec<Slice>) -> ChainResult<Self> {
        for slice in &slices {
            if slice.direction() != direction {
                return Err(ChainError::InconsistentChain {
                    chain: direction,
                    slice: slice.direction(),
                    from: slice.from(),
                    to: slice.to(),
                });
            }
        }

        let mut slices = slices;
        slices.sort_by_key(|slice| slice.from());

        if let Some(at) = slices.iter().map(|slice| slice.from()).duplicates().next() {
            return Err(ChainError::AmbiguousBoundaries {
                detail: format!("two slices start at {}", at),
            });
        }
        if let Some(at) = slices.iter().map(|slice| slice.to()).duplicates().next() {
            return Err(ChainError::AmbiguousBoundaries {
                detail: format!("two slices end at {}", at),
            });
        }
        for slice in &slices {
            if slice.from() >= slice.to() {
                return Err(ChainError::AmbiguousBoundaries {
                    detail: format!("the slice starting at {} has no duration", slice.from()),
                });
            }
        }
        if let Some(first) = slices.first() {
            if first.from() != far_past() {
                return Err(ChainError::AmbiguousBoundaries {
                    detail: format!("coverage starts at {} instead of the far past", first.from()),
                });
            }
        }
        if let Some(last) = slices.last() {
            if last.to() != far_future() {
                return Err(ChainError::AmbiguousBoundaries {
                    detail: format!("coverage ends at {} instead of the far future", last.to()),
                });
            }
        }
        for (earlier, later) in slices.iter().tuple_windows() {
            if earlier.to() != later.from() {
                return Err(ChainError::AmbiguousBoundaries {
                    detail: format!(
                        "the slice ending at {} does not meet the slice starting at {}",
                        earlier.to(),
                        later.from()
                    ),
                });
            }
        }

        let mut chain = Chain::new(direction);
        chain.slices = slices;
        Ok(chain)
    }
}

impl<E> Default for Chain<E>
where
    E: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Chain::new(Direction::Forward)
    }
}

impl<E> Chain<E> {
    pub fn with_serializer(
        mut self,
        serialize: impl Fn(&E) -> serde_json::Result<String> + 'static,
    ) -> Self {
        self.serialize = Rc::new(serialize);
        self
    }

    pub fn with_deserializer(
        mut self,
        deserialize: impl Fn(&str) -> serde_json::Result<E> + 'static,
    ) -> Self {
        self.deserialize = Rc::new(deserialize);
        self
    }

    pub fn with_populate(
        mut self,
        populate: impl Fn(&str, &mut E) -> serde_json::Result<()> + 'static,
    ) -> Self {
        self.populate = Some(Rc::new(populate));
        self
    }

    pub fn with_skip_condition(mut self, condition: SkipCondition<E>) -> Self {
        self.skip_conditions.push(condition);
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Every instant at which a state point was recorded, ascending. The
    /// sentinel boundaries are not key dates.
    pub fn key_dates(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.slices
            .iter()
            .map(|slice| slice.from())
            .filter(|&from| from != far_past())
    }

    /// True when some slice starts within the default tolerance of `moment`.
    pub fn contains(&self, moment: DateTime<Utc>) -> bool {
        self.contains_within(moment, default_grace())
    }

    /// True when some slice starts within `grace` of `moment`; a zero grace
    /// demands exact equality.
    pub fn contains_within(&self, moment: DateTime<Utc>, grace: Duration) -> bool {
        self.slices
            .iter()
            .any(|slice| slice.from().signed_duration_since(moment).abs() <= grace)
    }

    /// Reconstructs the entity state holding at `key_date`.
    pub fn patch_to_date(
        &self,
        initial: &E,
        key_date: DateTime<Utc>,
    ) -> ChainResult<Reconstruction<E>>
    where
        E: Clone,
    {
        let Walk { doc, skipped } = self.walk(initial, Cutoff::At(key_date))?;
        let skipped = self.skipped_slices(skipped);
        match (self.deserialize)(&doc.to_string()) {
            Ok(entity) => Ok(Reconstruction {
                entity,
                skipped,
                final_deserialization_failed: false,
            }),
            Err(cause) => {
                let probe = SkipProbe::FinalDeserialization(&cause);
                if self.accepts(initial, None, &probe) {
                    warn!(
                        "state at {} does not deserialize, falling back to the initial entity: {}",
                        key_date, cause
                    );
                    Ok(Reconstruction {
                        entity: initial.clone(),
                        skipped,
                        final_deserialization_failed: true,
                    })
                } else {
                    Err(ChainError::Serde(cause))
                }
            }
        }
    }

    /// Reconstructs the state holding at `key_date` into an entity the
    /// caller already owns, using the configured populate hook.
    pub fn patch_to_date_into(
        &self,
        initial: &E,
        key_date: DateTime<Utc>,
        target: &mut E,
    ) -> ChainResult<PopulateOutcome> {
        let populate = self
            .populate
            .as_ref()
            .ok_or(ChainError::PopulateNotConfigured)?;
        let Walk { doc, skipped } = self.walk(initial, Cutoff::At(key_date))?;
        let skipped = self.skipped_slices(skipped);
        match populate(&doc.to_string(), target) {
            Ok(()) => Ok(PopulateOutcome {
                skipped,
                final_deserialization_failed: false,
            }),
            Err(cause) => {
                let probe = SkipProbe::FinalDeserialization(&cause);
                if self.accepts(initial, None, &probe) {
                    warn!(
                        "state at {} does not populate the target, leaving it untouched: {}",
                        key_date, cause
                    );
                    Ok(PopulateOutcome {
                        skipped,
                        final_deserialization_failed: true,
                    })
                } else {
                    Err(ChainError::Serde(cause))
                }
            }
        }
    }

    /// Records that the entity changed from its current state to `changed`
    /// at `moment`.
    ///
    /// Patches are differential, so any slice whose predecessor state this
    /// operation changes is recomputed against the states reconstructed from
    /// the chain as it was before the insertion.
    pub fn add(
        &mut self,
        initial: &E,
        changed: &E,
        moment: DateTime<Utc>,
        future_policy: Option<FuturePolicy>,
    ) -> ChainResult<()> {
        if self.direction == Direction::Backward {
            return Err(ChainError::UnsupportedOperation {
                direction: self.direction,
            });
        }
        // The sentinel boundaries are permanently occupied.
        if moment == far_past() || moment == far_future() {
            return Err(ChainError::DuplicateKeyDate { moment });
        }

        let exact = self.slices.iter().position(|slice| slice.from() == moment);
        match exact {
            Some(_) if future_policy != Some(FuturePolicy::KeepFuture) => {
                return Err(ChainError::DuplicateKeyDate { moment });
            }
            // Within tolerance of an existing start but not equal to it:
            // there is no slice this could replace, so it is a duplicate
            // under every policy.
            None if self.contains(moment) => {
                return Err(ChainError::DuplicateKeyDate { moment });
            }
            _ => {}
        }

        let changed_doc: Value = serde_json::from_str(&(self.serialize)(changed)?)?;

        if let Some(index) = exact {
            return self.replace_point(initial, &changed_doc, moment, index);
        }
        if self.slices.is_empty() {
            debug!("starting chain with key date {}", moment);
            let opening = json_delta::diff(&self.initial_doc(initial)?, &changed_doc);
            self.slices
                .push(Slice::new(far_past(), moment, None, self.direction));
            self.slices
                .push(Slice::new(moment, far_future(), opening, self.direction));
            return Ok(());
        }

        let next_start = self
            .slices
            .iter()
            .map(|slice| slice.from())
            .find(|&from| from > moment);
        match next_start {
            None => self.append_point(initial, &changed_doc, moment),
            Some(next_start) => match future_policy {
                None => Err(ChainError::MissingFuturePolicy { moment, next_start }),
                Some(FuturePolicy::OverwriteFuture) => {
                    self.overwrite_future(initial, &changed_doc, moment)
                }
                Some(FuturePolicy::KeepFuture) => {
                    self.insert_keeping_future(initial, &changed_doc, moment)
                }
            },
        }
    }

    /// Produces the chain running the other way, along with the entity state
    /// at the opposite end of the timeline. The source chain is untouched.
    pub fn reverse(&self, initial: &E) -> ChainResult<(E, Chain<E>)> {
        let mut states = Vec::with_capacity(self.slices.len());
        for slice in &self.slices {
            states.push(self.walk(initial, Cutoff::At(slice.from()))?.doc);
        }

        let reversed_direction = self.direction.flipped();
        let mut reversed = Vec::with_capacity(self.slices.len());
        for (index, slice) in self.slices.iter().enumerate() {
            let patch = match self.direction {
                // A reversed forward slice carries the transition at its end,
                // so unapplying it from the far future walks back in time.
                Direction::Forward => states
                    .get(index + 1)
                    .and_then(|next| json_delta::diff(&states[index], next)),
                // And symmetrically, a reversed backward slice carries the
                // transition at its start.
                Direction::Backward => {
                    if index == 0 {
                        None
                    } else {
                        json_delta::diff(&states[index - 1], &states[index])
                    }
                }
            };
            reversed.push(Slice::new(
                slice.from(),
                slice.to(),
                patch,
                reversed_direction,
            ));
        }

        let boundary_doc = match self.direction {
            Direction::Forward => states.last(),
            Direction::Backward => states.first(),
        };
        let boundary_text = match boundary_doc {
            Some(doc) => doc.to_string(),
            None => (self.serialize)(initial)?,
        };
        let boundary = (self.deserialize)(&boundary_text)?;

        let chain = Chain {
            direction: reversed_direction,
            slices: reversed,
            serialize: self.serialize.clone(),
            deserialize: self.deserialize.clone(),
            populate: self.populate.clone(),
            skip_conditions: self.skip_conditions.clone(),
        };
        Ok((boundary, chain))
    }

    fn initial_doc(&self, initial: &E) -> ChainResult<Value> {
        Ok(serde_json::from_str(&(self.serialize)(initial)?)?)
    }

    fn skipped_slices(&self, indices: Vec<usize>) -> Vec<Slice> {
        indices
            .into_iter()
            .map(|index| self.slices[index].clone())
            .collect()
    }

    fn walk(&self, initial: &E, cutoff: Cutoff) -> ChainResult<Walk> {
        let initial_text = (self.serialize)(initial)?;
        let mut doc: Value = serde_json::from_str(&initial_text)?;
        let mut skipped = Vec::new();

        match self.direction {
            Direction::Forward => {
                for (index, slice) in self.slices.iter().enumerate() {
                    if forward_applies(slice, &cutoff) {
                        self.step(&mut doc, &mut skipped, index, slice, &initial_text)?;
                    }
                }
            }
            Direction::Backward => {
                for (index, slice) in self.slices.iter().enumerate().rev() {
                    if backward_applies(slice, &cutoff) {
                        self.step(&mut doc, &mut skipped, index, slice, &initial_text)?;
                    }
                }
            }
        }
        Ok(Walk { doc, skipped })
    }

    fn step(
        &self,
        doc: &mut Value,
        skipped: &mut Vec<usize>,
        index: usize,
        slice: &Slice,
        initial_text: &str,
    ) -> ChainResult<()> {
        let Some(patch) = slice.patch() else {
            return Ok(());
        };
        let outcome = match self.direction {
            Direction::Forward => json_delta::apply(doc, patch),
            Direction::Backward => json_delta::unapply(doc, patch),
        };
        match outcome {
            Ok(next) => {
                trace!("slice {} advanced the document", index);
                *doc = next;
                Ok(())
            }
            Err(cause) => {
                let probe = SkipProbe::PatchApplication(&cause);
                if self.accepts_document(doc, Some(slice), &probe) {
                    warn!(
                        "skipping the patch of slice {} ({} to {}): {}",
                        index,
                        slice.from(),
                        slice.to(),
                        cause
                    );
                    skipped.push(index);
                    Ok(())
                } else {
                    Err(ChainError::PatchingFailure(Box::new(PatchingFailure {
                        initial: initial_text.to_owned(),
                        intermediate: doc.clone(),
                        patch: patch.clone(),
                        index,
                        cause,
                    })))
                }
            }
        }
    }

    fn accepts_document(&self, doc: &Value, slice: Option<&Slice>, probe: &SkipProbe) -> bool {
        if self.skip_conditions.is_empty() {
            return false;
        }
        // Policies inspect the entity, not the raw document. If the
        // intermediate state does not even deserialize, none of them can
        // claim the failure.
        let Ok(entity) = (self.deserialize)(&doc.to_string()) else {
            return false;
        };
        self.accepts(&entity, slice, probe)
    }

    fn accepts(&self, entity: &E, slice: Option<&Slice>, probe: &SkipProbe) -> bool {
        self.skip_conditions
            .iter()
            .any(|condition| condition(entity, slice, probe))
    }

    fn append_point(
        &mut self,
        initial: &E,
        changed_doc: &Value,
        moment: DateTime<Utc>,
    ) -> ChainResult<()> {
        debug!("appending key date {} after every recorded point", moment);
        let current = self.walk(initial, Cutoff::At(moment))?.doc;
        let patch = json_delta::diff(&current, changed_doc);
        let last = self
            .slices
            .last_mut()
            .expect("a non-empty chain has a last slice");
        last.shrink_end_to(moment);
        self.slices
            .push(Slice::new(moment, far_future(), patch, self.direction));
        Ok(())
    }

    fn overwrite_future(
        &mut self,
        initial: &E,
        changed_doc: &Value,
        moment: DateTime<Utc>,
    ) -> ChainResult<()> {
        let current = self.walk(initial, Cutoff::At(moment))?.doc;
        let patch = json_delta::diff(&current, changed_doc);
        let before = self.slices.len();
        self.slices.retain(|slice| slice.from() < moment);
        debug!(
            "dropped {} future slice(s) to rewrite history from {}",
            before - self.slices.len(),
            moment
        );
        let last = self
            .slices
            .last_mut()
            .expect("the slice opening at the far past never starts after a key date");
        last.shrink_end_to(moment);
        self.slices
            .push(Slice::new(moment, far_future(), patch, self.direction));
        Ok(())
    }

    fn replace_point(
        &mut self,
        initial: &E,
        changed_doc: &Value,
        moment: DateTime<Utc>,
        index: usize,
    ) -> ChainResult<()> {
        debug!("replacing the recorded point at {}", moment);
        let before = self.walk(initial, Cutoff::JustBefore(moment))?.doc;
        // The follower's patch described the transition out of the state
        // being replaced; rediff it so the state at its start is preserved.
        let follower_patch = match self.slices.get(index + 1) {
            Some(follower) => {
                let old_state = self.walk(initial, Cutoff::At(follower.from()))?.doc;
                Some(json_delta::diff(changed_doc, &old_state))
            }
            None => None,
        };
        self.slices[index].set_patch(json_delta::diff(&before, changed_doc));
        if let Some(patch) = follower_patch {
            self.slices[index + 1].set_patch(patch);
        }
        Ok(())
    }

    fn insert_keeping_future(
        &mut self,
        initial: &E,
        changed_doc: &Value,
        moment: DateTime<Utc>,
    ) -> ChainResult<()> {
        let follower = self
            .slices
            .iter()
            .position(|slice| slice.from() > moment)
            .expect("caller established that a later slice exists");
        // The slice opening at the far past starts before any key date, so
        // the follower always has a predecessor, and it covers `moment`.
        let covering = follower - 1;
        debug!(
            "splitting the slice covering {} to keep {} later slice(s)",
            moment,
            self.slices.len() - follower
        );

        let at_moment = self.walk(initial, Cutoff::At(moment))?.doc;
        let inserted_patch = json_delta::diff(&at_moment, changed_doc);
        let old_state = self.walk(initial, Cutoff::At(self.slices[follower].from()))?.doc;
        let follower_patch = json_delta::diff(changed_doc, &old_state);

        self.slices[follower].set_patch(follower_patch);
        let split = self.slices[follower].from();
        self.slices[covering].shrink_end_to(moment);
        self.slices
            .insert(follower, Slice::new(moment, split, inserted_patch, self.direction));
        Ok(())
    }
}

fn forward_applies(slice: &Slice, cutoff: &Cutoff) -> bool {
    match *cutoff {
        // Written out the way the reconstruction contract states it: the
        // slice opening at the far past applies whenever the key date is a
        // real instant, every other slice when it has started by then.
        Cutoff::At(key_date) => {
            (slice.from() == far_past() && key_date != far_past()) || slice.from() <= key_date
        }
        Cutoff::JustBefore(moment) => slice.from() == far_past() || slice.from() < moment,
    }
}

fn backward_applies(slice: &Slice, cutoff: &Cutoff) -> bool {
    match *cutoff {
        Cutoff::At(key_date) => slice.to() > key_date,
        Cutoff::JustBefore(moment) => slice.to() >= moment,
    }
}
