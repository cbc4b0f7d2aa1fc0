//! Dice rolling system.
//!
//! Supports `XdY+Z` notation, ability score generation (4d6 drop lowest),
//! and d20 ability checks with advantage/disadvantage. All randomness flows
//! through a [`DieSource`] owned by the [`DiceEngine`], so tests can supply
//! a scripted sequence while production code keeps a real RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Most dice a single roll may throw.
pub const MAX_DICE_COUNT: u32 = 1_000;

/// Most faces a single die may have.
pub const MAX_DICE_SIDES: u32 = 1_000_000;

/// Error type for dice parsing and rolling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error(
        "Invalid dice: {count}d{sides}. Count must be 1-{max_count} and sides 1-{max_sides}",
        max_count = MAX_DICE_COUNT,
        max_sides = MAX_DICE_SIDES
    )]
    InvalidDice { sides: u32, count: u32 },
    #[error("Invalid dice notation: {0}. Use a format like '1d20' or '2d6+3'")]
    InvalidDiceNotation(String),
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Build from a pair of flags. Both set cancels out to `Normal`.
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Advantage {
        match (advantage, disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }

    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }
}

/// Source of individual die results.
pub trait DieSource: Send {
    /// Roll a single die. Implementations should return a value in `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// [`DieSource`] backed by any `rand` generator.
pub struct RngSource<R>(R);

impl<R: Rng + Send> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self(rng)
    }
}

impl<R: Rng + Send> DieSource for RngSource<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.0.gen_range(1..=sides)
    }
}

/// Parsed `<count>d<sides>[+|-<modifier>]` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceNotation {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceNotation {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// Reject counts and sides outside `1..=MAX_DICE_COUNT` and
    /// `1..=MAX_DICE_SIDES`.
    pub fn validate(&self) -> Result<(), DiceError> {
        validate_dice(self.sides, self.count)
    }
}

fn validate_dice(sides: u32, count: u32) -> Result<(), DiceError> {
    if (1..=MAX_DICE_SIDES).contains(&sides) && (1..=MAX_DICE_COUNT).contains(&count) {
        Ok(())
    } else {
        Err(DiceError::InvalidDice { sides, count })
    }
}

impl FromStr for DiceNotation {
    type Err = DiceError;

    /// Case-insensitive and whitespace-insensitive. Anything that does not
    /// match `^(\d+)d(\d+)([+-]\d+)?$` is rejected with the original input;
    /// well-formed notation with too many dice or faces is `InvalidDice`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DiceError::InvalidDiceNotation(s.to_string());

        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        let (count_str, rest) = normalized.split_once('d').ok_or_else(invalid)?;
        let (sides_str, modifier_str) = match rest.find(['+', '-']) {
            Some(pos) => rest.split_at(pos),
            None => (rest, ""),
        };

        let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !is_digits(count_str) || !is_digits(sides_str) {
            return Err(invalid());
        }
        if !modifier_str.is_empty() && !is_digits(&modifier_str[1..]) {
            return Err(invalid());
        }

        let count: u32 = count_str.parse().map_err(|_| invalid())?;
        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;
        let modifier: i32 = if modifier_str.is_empty() {
            0
        } else {
            modifier_str.parse().map_err(|_| invalid())?
        };

        let notation = DiceNotation::new(count, sides, modifier);
        notation.validate()?;
        Ok(notation)
    }
}

impl fmt::Display for DiceNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

/// Outcome of a roll.
///
/// `rolls` holds every die thrown; `kept` are the dice counted toward the
/// total and `dropped` the rest (only non-empty for ability score rolls and
/// advantage/disadvantage). The total is always recomputed from `kept` and
/// `modifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRollResult {
    sides: u32,
    rolls: Vec<u32>,
    kept: Vec<u32>,
    dropped: Vec<u32>,
    modifier: i32,
    description: String,
}

impl DiceRollResult {
    pub fn sides(&self) -> u32 {
        self.sides
    }

    pub fn count(&self) -> usize {
        self.rolls.len()
    }

    pub fn rolls(&self) -> &[u32] {
        &self.rolls
    }

    pub fn kept(&self) -> &[u32] {
        &self.kept
    }

    pub fn dropped(&self) -> &[u32] {
        &self.dropped
    }

    pub fn modifier(&self) -> i32 {
        self.modifier
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Sum of kept dice plus the modifier, saturating at the `i32` bounds.
    pub fn total(&self) -> i32 {
        let sum = self.kept.iter().map(|&r| i64::from(r)).sum::<i64>() + i64::from(self.modifier);
        sum.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total() >= dc
    }

    /// Stack an ability modifier on top and extend the description.
    fn with_ability_modifier(mut self, modifier: i32) -> Self {
        self.modifier = self.modifier.saturating_add(modifier);
        if modifier >= 0 {
            self.description.push_str(&format!(" + {modifier}"));
        } else {
            self.description.push_str(&format!(" - {}", modifier.abs()));
        }
        self
    }
}

impl fmt::Display for DiceRollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kept = self
            .kept
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}: [{}]", self.description, kept)?;
        if !self.dropped.is_empty() {
            let dropped = self
                .dropped
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " (dropped {dropped})")?;
        }
        match self.modifier {
            0 => {}
            m if m > 0 => write!(f, " + {m}")?,
            m => write!(f, " - {}", m.abs())?,
        }
        write!(f, " = {}", self.total())
    }
}

/// The description/total pair recorded into the story log and handed to the
/// narrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollSummary {
    pub description: String,
    pub total: i32,
}

impl RollSummary {
    pub fn new(description: impl Into<String>, total: i32) -> Self {
        Self {
            description: description.into(),
            total,
        }
    }
}

impl From<&DiceRollResult> for RollSummary {
    fn from(result: &DiceRollResult) -> Self {
        Self::new(result.description(), result.total())
    }
}

impl fmt::Display for RollSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.description, self.total)
    }
}

/// Dice roller with an injectable randomness source.
pub struct DiceEngine {
    source: Box<dyn DieSource>,
}

impl DiceEngine {
    /// Engine backed by an entropy-seeded `StdRng`.
    pub fn new() -> Self {
        Self::with_source(RngSource::new(StdRng::from_entropy()))
    }

    /// Reproducible engine for replays and property tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_source(RngSource::new(StdRng::seed_from_u64(seed)))
    }

    pub fn with_source(source: impl DieSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Roll one die, clamping whatever the source returns into `1..=sides`.
    fn die(&mut self, sides: u32) -> u32 {
        self.source.roll_die(sides).clamp(1, sides)
    }

    fn throw(&mut self, sides: u32, count: u32, modifier: i32) -> DiceRollResult {
        let rolls: Vec<u32> = (0..count).map(|_| self.die(sides)).collect();
        DiceRollResult {
            sides,
            kept: rolls.clone(),
            rolls,
            dropped: Vec::new(),
            modifier,
            description: DiceNotation::new(count, sides, modifier).to_string(),
        }
    }

    /// Roll `count` dice with `sides` faces and add `modifier`.
    pub fn roll(&mut self, sides: u32, count: u32, modifier: i32) -> Result<DiceRollResult, DiceError> {
        validate_dice(sides, count)?;
        Ok(self.throw(sides, count, modifier))
    }

    pub fn d4(&mut self, count: u32, modifier: i32) -> Result<DiceRollResult, DiceError> {
        self.roll(4, count, modifier)
    }

    pub fn d6(&mut self, count: u32, modifier: i32) -> Result<DiceRollResult, DiceError> {
        self.roll(6, count, modifier)
    }

    pub fn d8(&mut self, count: u32, modifier: i32) -> Result<DiceRollResult, DiceError> {
        self.roll(8, count, modifier)
    }

    pub fn d10(&mut self, count: u32, modifier: i32) -> Result<DiceRollResult, DiceError> {
        self.roll(10, count, modifier)
    }

    pub fn d12(&mut self, count: u32, modifier: i32) -> Result<DiceRollResult, DiceError> {
        self.roll(12, count, modifier)
    }

    /// A single d20 plus modifier.
    pub fn d20(&mut self, modifier: i32) -> DiceRollResult {
        self.throw(20, 1, modifier)
    }

    /// Parse dice notation and roll it.
    pub fn parse_and_roll(&mut self, notation: &str) -> Result<DiceRollResult, DiceError> {
        let parsed: DiceNotation = notation.parse()?;
        self.roll(parsed.sides, parsed.count, parsed.modifier)
    }

    /// 4d6, sorted high to low, keep the top three.
    pub fn ability_score_roll(&mut self) -> DiceRollResult {
        let mut rolls: Vec<u32> = (0..4).map(|_| self.die(6)).collect();
        rolls.sort_by(|a, b| b.cmp(a));
        DiceRollResult {
            sides: 6,
            kept: rolls[..3].to_vec(),
            dropped: rolls[3..].to_vec(),
            rolls,
            modifier: 0,
            description: "4d6 drop lowest".to_string(),
        }
    }

    /// 2d20, keep the higher.
    pub fn advantage(&mut self) -> DiceRollResult {
        self.two_d20(Advantage::Advantage)
    }

    /// 2d20, keep the lower.
    pub fn disadvantage(&mut self) -> DiceRollResult {
        self.two_d20(Advantage::Disadvantage)
    }

    fn two_d20(&mut self, advantage: Advantage) -> DiceRollResult {
        let first = self.die(20);
        let second = self.die(20);
        let (kept, dropped, description) = match advantage {
            Advantage::Disadvantage => (
                first.min(second),
                first.max(second),
                "Disadvantage (2d20, take lower)",
            ),
            _ => (
                first.max(second),
                first.min(second),
                "Advantage (2d20, take higher)",
            ),
        };
        DiceRollResult {
            sides: 20,
            rolls: vec![first, second],
            kept: vec![kept],
            dropped: vec![dropped],
            modifier: 0,
            description: description.to_string(),
        }
    }

    /// d20 check using `floor((score - 10) / 2)` as the modifier.
    /// Advantage and disadvantage together degrade to a plain roll.
    pub fn ability_check(&mut self, score: u8, advantage: bool, disadvantage: bool) -> DiceRollResult {
        self.ability_check_with(score, Advantage::from_flags(advantage, disadvantage))
    }

    pub fn ability_check_with(&mut self, score: u8, advantage: Advantage) -> DiceRollResult {
        let modifier = ability_modifier(score);
        match advantage {
            Advantage::Normal => self.d20(modifier),
            Advantage::Advantage => self.advantage().with_ability_modifier(modifier),
            Advantage::Disadvantage => self.disadvantage().with_ability_modifier(modifier),
        }
    }

    /// Pick one element uniformly. Returns `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.die(items.len() as u32) as usize - 1;
        items.get(index)
    }
}

impl Default for DiceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiceEngine").finish_non_exhaustive()
    }
}

/// `floor((score - 10) / 2)`: 8-9 = -1, 10-11 = 0, 12-13 = +1.
pub fn ability_modifier(score: u8) -> i32 {
    (score as i32 - 10).div_euclid(2)
}
