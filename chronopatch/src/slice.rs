use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use json_delta::Delta;
use serde::{Deserialize, Deserializer, Serialize};

/// The instant standing in for the open lower end of the timeline.
pub fn far_past() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

/// The instant standing in for the open upper end of the timeline.
pub fn far_future() -> DateTime<Utc> {
    DateTime::<Utc>::MAX_UTC
}

// Persistence round-trips can drift timestamps by fractions of a
// millisecond, so key-date matching defaults to a small tolerance.
pub fn default_grace() -> Duration {
    Duration::microseconds(100)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Forward => "Forward",
            Direction::Backward => "Backward",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A half-open span `[from, to)` of the timeline carrying the structural
/// difference to the state of its predecessor.
///
/// The field names are the wire contract for persisted slices; an absent or
/// `null` end decodes as the far future.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    from: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_end", default = "far_future")]
    to: DateTime<Utc>,
    #[serde(default)]
    patch: Option<Delta>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    timestamp: Option<DateTime<Utc>>,
    direction: Direction,
}

fn deserialize_end<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let end = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(end.unwrap_or_else(far_future))
}

impl Slice {
    pub fn new(
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        patch: Option<Delta>,
        direction: Direction,
    ) -> Self {
        Slice {
            from,
            to,
            patch,
            timestamp: None,
            direction,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn patch(&self) -> Option<&Delta> {
        self.patch.as_ref()
    }

    pub fn set_patch(&mut self, patch: Option<Delta>) {
        self.patch = patch;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn duration(&self) -> Duration {
        self.to.signed_duration_since(self.from)
    }

    pub fn is_moment(&self) -> bool {
        self.from == self.to
    }

    pub fn contains_instant(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }

    pub fn shrink_end_to(&mut self, instant: DateTime<Utc>) {
        debug_assert!(self.from < instant && instant <= self.to);
        self.to = instant;
    }

    pub fn shrink_start_to(&mut self, instant: DateTime<Utc>) {
        debug_assert!(self.from <= instant && instant < self.to);
        self.from = instant;
    }

    pub fn expand_end_to(&mut self, instant: DateTime<Utc>) {
        debug_assert!(instant >= self.to);
        self.to = instant;
    }

    pub fn expand_start_to(&mut self, instant: DateTime<Utc>) {
        debug_assert!(instant <= self.from);
        self.from = instant;
    }

    pub fn translate(&mut self, offset: Duration) {
        self.from = self
            .from
            .checked_add_signed(offset)
            .expect("translated slice start leaves the representable range");
        self.to = self
            .to
            .checked_add_signed(offset)
            .expect("translated slice end leaves the representable range");
    }

    pub fn overlaps(&self, other: &Slice) -> bool {
        self.from < other.to && other.from < self.to
    }

    pub fn intersection(&self, other: &Slice) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if !self.overlaps(other) {
            return None;
        }
        Some((self.from.max(other.from), self.to.min(other.to)))
    }
}
