use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use log::warn;

/// Status tag of a normal analyzer reading.
pub(crate) const NORMAL_TAG: char = 'N';

/// Preference order when categories of a reading are equally long.
const TAG_ORDER: [char; 6] = [NORMAL_TAG, 'L', 'V', 'X', 'C', 'T'];

/// A single reading handed to [`Measurement::add`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Value {
    Scalar(f64),
    Sequence(Vec<f64>),
    /// Reading grouped by status tag, as returned by the parameter analyzer.
    Categorized(BTreeMap<char, Vec<f64>>),
}

impl Value {
    /// Number of rows this value spans; scalars span one.
    pub(crate) fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Sequence(values) => values.len(),
            Value::Categorized(categories) => categories.values().map(Vec::len).max().unwrap_or(0),
        }
    }

    /// Value for the given row of a call spanning several rows.
    pub(crate) fn at(&self, row: usize) -> f64 {
        match self {
            Value::Scalar(value) => *value,
            Value::Sequence(values) if values.len() == 1 => values[0],
            Value::Sequence(values) => values.get(row).copied().unwrap_or(f64::NAN),
            Value::Categorized(_) => f64::NAN,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::Sequence(values)
    }
}

impl From<&[f64]> for Value {
    fn from(values: &[f64]) -> Self {
        Value::Sequence(values.to_vec())
    }
}

impl From<BTreeMap<char, Vec<f64>>> for Value {
    fn from(categories: BTreeMap<char, Vec<f64>>) -> Self {
        Value::Categorized(categories)
    }
}

/// One logical sample: named readings gathered over a short time window.
#[derive(Clone, Debug, Default)]
pub(crate) struct Measurement {
    data: HashMap<String, Value>,
    time_in: Option<DateTime<Utc>>,
    time_out: Option<DateTime<Utc>>,
    error: String,
}

impl Measurement {
    pub(crate) fn new() -> Measurement {
        Measurement::default()
    }

    /// Store a reading under `name`. The first call opens the time window, every call moves its
    /// end.
    pub(crate) fn add<V: Into<Value>>(&mut self, name: &str, value: V) {
        let now = Utc::now();
        if self.time_in.is_none() {
            self.time_in = Some(now);
        }
        self.time_out = Some(now);

        match value.into() {
            Value::Categorized(categories) => {
                if let Some((tag, payload)) = pick_category(categories) {
                    if tag != NORMAL_TAG {
                        warn!("reading '{}' flagged with status '{}'.", name, tag);
                        self.error.push(tag);
                    }
                    self.data.insert(name.to_string(), Value::Sequence(payload));
                } else {
                    warn!("reading '{}' carried no data in any category.", name);
                }
            }
            other => {
                self.data.insert(name.to_string(), other);
            }
        }
    }

    pub(crate) fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub(crate) fn time_in(&self) -> Option<DateTime<Utc>> {
        self.time_in
    }

    pub(crate) fn time_out(&self) -> Option<DateTime<Utc>> {
        self.time_out
    }

    /// Accumulated status tags of flagged readings; empty when all were normal.
    pub(crate) fn error(&self) -> &str {
        &self.error
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.time_in.is_none()
    }

    /// Seconds between the first and the last `add` call.
    pub(crate) fn adding_duration(&self) -> Option<f64> {
        match (self.time_in, self.time_out) {
            (Some(time_in), Some(time_out)) => Some(seconds(time_out) - seconds(time_in)),
            _ => None,
        }
    }
}

/// Seconds since the epoch with microsecond resolution.
pub(crate) fn seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1e6
}

fn tag_rank(tag: char) -> (usize, char) {
    let rank = TAG_ORDER
        .iter()
        .position(|known| *known == tag)
        .unwrap_or(TAG_ORDER.len());
    (rank, tag)
}

/// Choose which category of a reading to keep.
///
/// Normally only one category is non-empty. When several are, the longest payload
/// wins and equal lengths fall back to the tag order. This is a compatibility policy
/// carried over from the analyzer scripts and has not been confirmed as the right one.
fn pick_category(categories: BTreeMap<char, Vec<f64>>) -> Option<(char, Vec<f64>)> {
    let mut best: Option<(char, Vec<f64>)> = None;
    for (tag, payload) in categories {
        if payload.is_empty() {
            continue;
        }
        let better = match &best {
            None => true,
            Some((best_tag, best_payload)) => {
                payload.len() > best_payload.len()
                    || (payload.len() == best_payload.len() && tag_rank(tag) < tag_rank(*best_tag))
            }
        };
        if better {
            best = Some((tag, payload));
        }
    }
    best
}
