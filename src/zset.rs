use enum_variants::VariantNames;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use strum_macros::EnumString;

use crate::commands::CommandError;
use crate::value::normalize_range;

/// A score that orders totally, so that it can be part of a `BTreeSet` key. NaN never makes it
/// into a set: every insertion path rejects it first.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        // -0.0 and 0.0 are the same score.
        if self.0 == other.0 {
            Ordering::Equal
        } else {
            self.0.total_cmp(&other.0)
        }
    }
}

/// Members ordered by score first and member name second.
///
/// `scores` is the member index: a member is present in `ordered` exactly when it is present in
/// `scores`, under the score recorded there. Lookups and removals by member go through `scores`
/// so the ordered index never has to be searched by name.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: HashMap<String, f64>,
    ordered: BTreeSet<(Score, String)>,
}

impl PartialEq for SortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.ordered == other.ordered
    }
}

impl SortedSet {
    pub fn new() -> SortedSet {
        SortedSet::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.scores.contains_key(member)
    }

    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Inserts `member` or moves it to `score`. Returns `true` when the member is new.
    pub fn insert(&mut self, member: &str, score: f64) -> bool {
        match self.scores.insert(member.to_string(), score) {
            Some(previous) => {
                if Score(previous) != Score(score) {
                    self.ordered.remove(&(Score(previous), member.to_string()));
                    self.ordered.insert((Score(score), member.to_string()));
                }
                false
            }
            None => {
                self.ordered.insert((Score(score), member.to_string()));
                true
            }
        }
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(Score(score), member.to_string()));
                true
            }
            None => false,
        }
    }

    /// Adds `delta` to the score of `member`, inserting it with a zero score first if absent.
    pub fn incr(&mut self, member: &str, delta: f64) -> Result<f64, CommandError> {
        let score = self.score(member).unwrap_or(0.0) + delta;
        if score.is_nan() {
            return Err(CommandError::NaNScore);
        }
        self.insert(member, score);
        Ok(score)
    }

    /// Position of `member` counting from the lowest score, or from the highest when `rev`.
    pub fn rank(&self, member: &str, rev: bool) -> Option<usize> {
        let score = self.score(member)?;
        let key = (Score(score), member.to_string());
        let below = self.ordered.range(..&key).count();

        Some(if rev { self.len() - below - 1 } else { below })
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, f64)> {
        self.ordered.iter().map(|(s, m)| (m.as_str(), s.0))
    }

    fn directed(&self, rev: bool) -> Box<dyn Iterator<Item = (&str, f64)> + '_> {
        if rev {
            Box::new(self.iter().rev())
        } else {
            Box::new(self.iter())
        }
    }

    /// Members between the `start` and `stop` ranks, both inclusive. Negative ranks count from
    /// the end of the set.
    pub fn range_by_rank(&self, start: i64, stop: i64, rev: bool) -> Vec<(String, f64)> {
        match normalize_range(start, stop, self.len()) {
            Some((start, stop)) => self
                .directed(rev)
                .skip(start)
                .take(stop - start + 1)
                .map(|(m, s)| (m.to_string(), s))
                .collect(),
            None => vec![],
        }
    }

    pub fn range_by_score(
        &self,
        range: &ScoreRange,
        rev: bool,
        limit: Option<Limit>,
    ) -> Vec<(String, f64)> {
        let matching = self
            .directed(rev)
            .filter(|(_, score)| range.contains(*score))
            .map(|(m, s)| (m.to_string(), s));

        apply_limit(matching, limit)
    }

    pub fn count_by_score(&self, range: &ScoreRange) -> usize {
        self.iter().filter(|(_, s)| range.contains(*s)).count()
    }

    /// Members within a lexicographic range, ignoring scores.
    ///
    /// Member names are snapshotted in name order and the two boundaries located by binary
    /// search; the result is the slice between them.
    pub fn range_by_lex(&self, range: &LexRange, rev: bool, limit: Option<Limit>) -> Vec<String> {
        let mut names: Vec<&str> = self.scores.keys().map(String::as_str).collect();
        names.sort_unstable();

        let (start, end) = range.bounds_in(&names);
        let slice = names[start..end.max(start)].iter().map(|m| m.to_string());

        if rev {
            apply_limit(slice.rev(), limit)
        } else {
            apply_limit(slice, limit)
        }
    }

    pub fn count_by_lex(&self, range: &LexRange) -> usize {
        self.range_by_lex(range, false, None).len()
    }

    /// Removes and returns up to `count` members from the low end, or the high end when `max`.
    pub fn pop(&mut self, count: usize, max: bool) -> Vec<(String, f64)> {
        let popped: Vec<(String, f64)> = self
            .directed(max)
            .take(count)
            .map(|(m, s)| (m.to_string(), s))
            .collect();

        for (member, _) in &popped {
            self.remove(member);
        }

        popped
    }

    pub fn remove_all<'a>(&mut self, members: impl IntoIterator<Item = &'a str>) -> usize {
        members.into_iter().filter(|m| self.remove(m)).count()
    }
}

fn apply_limit<T>(items: impl Iterator<Item = T>, limit: Option<Limit>) -> Vec<T> {
    match limit {
        Some(Limit { offset, count }) => {
            if offset < 0 {
                return vec![];
            }
            let items = items.skip(offset as usize);
            if count < 0 {
                items.collect()
            } else {
                items.take(count as usize).collect()
            }
        }
        None => items.collect(),
    }
}

/// `LIMIT offset count`; a negative count means "all remaining".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub offset: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBound {
    pub value: f64,
    pub exclusive: bool,
}

impl FromStr for ScoreBound {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exclusive, number) = match s.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let value = parse_score(number).map_err(|_| CommandError::InvalidScoreRange)?;

        Ok(ScoreBound { value, exclusive })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: ScoreBound,
    pub max: ScoreBound,
}

impl ScoreRange {
    pub fn parse(min: &str, max: &str) -> Result<ScoreRange, CommandError> {
        let range = ScoreRange {
            min: min.parse()?,
            max: max.parse()?,
        };
        if range.min.value > range.max.value {
            return Err(CommandError::InvertedRange);
        }
        Ok(range)
    }

    pub fn contains(&self, score: f64) -> bool {
        let above_min = if self.min.exclusive {
            score > self.min.value
        } else {
            score >= self.min.value
        };
        let below_max = if self.max.exclusive {
            score < self.max.value
        } else {
            score <= self.max.value
        };
        above_min && below_max
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexBound {
    Min,
    Max,
    Inclusive(String),
    Exclusive(String),
}

impl FromStr for LexBound {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-" => Ok(LexBound::Min),
            "+" => Ok(LexBound::Max),
            _ => match (s.strip_prefix('['), s.strip_prefix('(')) {
                (Some(value), _) => Ok(LexBound::Inclusive(value.to_string())),
                (_, Some(value)) => Ok(LexBound::Exclusive(value.to_string())),
                _ => Err(CommandError::InvalidLexRange),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexRange {
    pub min: LexBound,
    pub max: LexBound,
}

impl LexRange {
    pub fn parse(min: &str, max: &str) -> Result<LexRange, CommandError> {
        let range = LexRange {
            min: min.parse()?,
            max: max.parse()?,
        };

        let inverted = match (&range.min, &range.max) {
            (LexBound::Max, _) | (_, LexBound::Min) => true,
            (LexBound::Min, _) | (_, LexBound::Max) => false,
            (
                LexBound::Inclusive(a) | LexBound::Exclusive(a),
                LexBound::Inclusive(b) | LexBound::Exclusive(b),
            ) => a > b,
        };
        if inverted {
            return Err(CommandError::InvertedRange);
        }

        Ok(range)
    }

    /// Half open `[start, end)` index range of the members of `sorted` inside the bounds.
    fn bounds_in(&self, sorted: &[&str]) -> (usize, usize) {
        let start = match &self.min {
            LexBound::Min => 0,
            LexBound::Max => sorted.len(),
            LexBound::Inclusive(v) => sorted.partition_point(|m| *m < v.as_str()),
            LexBound::Exclusive(v) => sorted.partition_point(|m| *m <= v.as_str()),
        };
        let end = match &self.max {
            LexBound::Min => 0,
            LexBound::Max => sorted.len(),
            LexBound::Inclusive(v) => sorted.partition_point(|m| *m <= v.as_str()),
            LexBound::Exclusive(v) => sorted.partition_point(|m| *m < v.as_str()),
        };
        (start, end)
    }
}

/// Parses a score, accepting `inf`, `+inf` and `-inf` and rejecting NaN.
pub fn parse_score(s: &str) -> Result<f64, CommandError> {
    match s.parse::<f64>() {
        Ok(score) if !score.is_nan() => Ok(score),
        _ => Err(CommandError::NotFloat),
    }
}

/// Formats a score the way replies carry it: `1`, `2.5`, `inf`, `-inf`.
pub fn format_score(score: f64) -> String {
    score.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, EnumString, VariantNames)]
#[strum(ascii_case_insensitive)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    fn combine(self, acc: f64, score: f64) -> f64 {
        match self {
            Aggregate::Sum => nan_to_zero(acc + score),
            Aggregate::Min => acc.min(score),
            Aggregate::Max => acc.max(score),
        }
    }
}

fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// A collection whose members carry a score, so that sorted sets and plain sets can be combined
/// by the same algebra. Plain set members all score 1.
pub trait Scored {
    fn size(&self) -> usize;
    fn score_of(&self, member: &str) -> Option<f64>;
    fn scored(&self) -> Vec<(&str, f64)>;
}

impl Scored for SortedSet {
    fn size(&self) -> usize {
        self.len()
    }

    fn score_of(&self, member: &str) -> Option<f64> {
        self.score(member)
    }

    fn scored(&self) -> Vec<(&str, f64)> {
        self.iter().collect()
    }
}

impl Scored for HashSet<String> {
    fn size(&self) -> usize {
        self.len()
    }

    fn score_of(&self, member: &str) -> Option<f64> {
        self.contains(member).then_some(1.0)
    }

    fn scored(&self) -> Vec<(&str, f64)> {
        self.iter().map(|m| (m.as_str(), 1.0)).collect()
    }
}

/// One operand of a set operation: a collection and the weight its scores are multiplied by.
pub type Input<'a> = (&'a dyn Scored, f64);

fn weighted(score: f64, weight: f64) -> f64 {
    nan_to_zero(score * weight)
}

pub fn union(inputs: &[Input], aggregate: Aggregate) -> SortedSet {
    let mut combined: HashMap<&str, f64> = HashMap::new();

    for (set, weight) in inputs {
        for (member, score) in set.scored() {
            let score = weighted(score, *weight);
            combined
                .entry(member)
                .and_modify(|acc| *acc = aggregate.combine(*acc, score))
                .or_insert(score);
        }
    }

    collect(combined)
}

/// Members present in every input. The smallest input drives the scan, while scores are always
/// combined in input order so the result does not depend on which input is smallest.
pub fn intersect(inputs: &[Input], aggregate: Aggregate) -> SortedSet {
    let Some((smallest, _)) = inputs.iter().min_by_key(|(set, _)| set.size()) else {
        return SortedSet::new();
    };

    let mut combined: HashMap<&str, f64> = HashMap::new();

    'members: for (member, _) in smallest.scored() {
        let mut acc: Option<f64> = None;
        for (set, weight) in inputs {
            let Some(score) = set.score_of(member) else {
                continue 'members;
            };
            let score = weighted(score, *weight);
            acc = Some(match acc {
                Some(acc) => aggregate.combine(acc, score),
                None => score,
            });
        }
        if let Some(score) = acc {
            combined.insert(member, score);
        }
    }

    collect(combined)
}

/// Members of the first input that no other input contains, keeping the first input's scores.
pub fn difference(inputs: &[Input]) -> SortedSet {
    let Some(((first, weight), others)) = inputs.split_first() else {
        return SortedSet::new();
    };

    let combined: HashMap<&str, f64> = first
        .scored()
        .into_iter()
        .filter(|(member, _)| others.iter().all(|(set, _)| set.score_of(member).is_none()))
        .map(|(member, score)| (member, weighted(score, *weight)))
        .collect();

    collect(combined)
}

fn collect(scores: HashMap<&str, f64>) -> SortedSet {
    let mut set = SortedSet::new();
    for (member, score) in scores {
        set.insert(member, score);
    }
    set
}
