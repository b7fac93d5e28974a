//! Dice notation and rolling
//!
//! Supports the notation used throughout stat blocks: `NdM`, `dM` (one die),
//! and `NdM+K` / `NdM-K` with a flat modifier. Parsing is done with `nom`;
//! rolling goes through the [`DiceRoller`] trait so tests and replays can
//! substitute scripted results for random ones.

use nom::{
    character::complete::{digit1, multispace0, one_of},
    combinator::{all_consuming, map_res, opt},
    sequence::{preceded, tuple},
    IResult,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Largest number of dice accepted in a single expression
pub const MAX_DICE: u32 = 100;

/// Largest die accepted in a single expression
pub const MAX_SIDES: u32 = 1000;

/// Largest flat modifier accepted, in either direction
pub const MAX_MODIFIER: i32 = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: '{0}'")]
    InvalidNotation(String),

    #[error("Dice count {count} out of range in '{notation}' (1..={max})", max = MAX_DICE)]
    CountOutOfRange { notation: String, count: u32 },

    #[error("Die size {sides} out of range in '{notation}' (1..={max})", max = MAX_SIDES)]
    SidesOutOfRange { notation: String, sides: u32 },

    #[error("Modifier {modifier} out of range in '{notation}' (-{max}..={max})", max = MAX_MODIFIER)]
    ModifierOutOfRange { notation: String, modifier: i32 },
}

/// A parsed dice expression such as `2d6+3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiceExpr {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceExpr {
    /// Build an expression directly (no validation beyond the type system)
    pub const fn new(count: u32, sides: u32, modifier: i32) -> Self {
        DiceExpr {
            count,
            sides,
            modifier,
        }
    }

    /// Parse dice notation
    ///
    /// `"d20"`, `"1d8"`, `"2d6+3"`, `"4d4 - 1"` are all accepted; the `d` may be
    /// upper or lower case and whitespace around the modifier is ignored.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let (_, (count, sides, modifier)) = all_consuming(dice_expr)(notation)
            .map_err(|_| DiceError::InvalidNotation(notation.to_string()))?;

        let count = count.unwrap_or(1);
        if count == 0 || count > MAX_DICE {
            return Err(DiceError::CountOutOfRange {
                notation: notation.to_string(),
                count,
            });
        }
        if sides == 0 || sides > MAX_SIDES {
            return Err(DiceError::SidesOutOfRange {
                notation: notation.to_string(),
                sides,
            });
        }

        let modifier = modifier.unwrap_or(0);
        if !(-MAX_MODIFIER..=MAX_MODIFIER).contains(&modifier) {
            return Err(DiceError::ModifierOutOfRange {
                notation: notation.to_string(),
                modifier,
            });
        }

        Ok(DiceExpr {
            count,
            sides,
            modifier,
        })
    }

    /// Smallest possible total
    pub fn min(&self) -> i32 {
        self.count as i32 + self.modifier
    }

    /// Largest possible total
    pub fn max(&self) -> i32 {
        (self.count * self.sides) as i32 + self.modifier
    }

    /// Expected total
    pub fn average(&self) -> f64 {
        self.count as f64 * (self.sides as f64 + 1.0) / 2.0 + self.modifier as f64
    }
}

impl fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

impl std::str::FromStr for DiceExpr {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpr::parse(s)
    }
}

impl TryFrom<String> for DiceExpr {
    type Error = DiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DiceExpr::parse(&value)
    }
}

impl From<DiceExpr> for String {
    fn from(expr: DiceExpr) -> Self {
        expr.to_string()
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}

fn modifier(input: &str) -> IResult<&str, i32> {
    let (input, (sign, value)) = tuple((
        one_of("+-"),
        preceded(multispace0, map_res(digit1, str::parse::<i32>)),
    ))(input)?;
    Ok((input, if sign == '-' { -value } else { value }))
}

fn dice_expr(input: &str) -> IResult<&str, (Option<u32>, u32, Option<i32>)> {
    let (input, _) = multispace0(input)?;
    let (input, count) = opt(number)(input)?;
    let (input, _) = one_of("dD")(input)?;
    let (input, sides) = number(input)?;
    let (input, modifier) = opt(preceded(multispace0, modifier))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (count, sides, modifier)))
}

/// Source of die results
///
/// Implementors only supply single-die rolls; totals and notation handling
/// are provided.
pub trait DiceRoller {
    /// Roll one die with the given number of sides, returning 1..=sides
    fn roll_die(&mut self, sides: u32) -> u32;

    /// Roll a full expression and return its total (may be negative)
    fn roll(&mut self, expr: &DiceExpr) -> i32 {
        let mut total = expr.modifier;
        for _ in 0..expr.count {
            let face = i32::try_from(self.roll_die(expr.sides)).unwrap_or(i32::MAX);
            total = total.saturating_add(face);
        }
        total
    }

    /// Roll an expression for an amount of damage or healing (never negative)
    fn roll_amount(&mut self, expr: &DiceExpr) -> u32 {
        self.roll(expr).max(0) as u32
    }

    /// Roll a d20
    fn roll_d20(&mut self) -> u32 {
        self.roll_die(20)
    }

    /// Parse and roll notation in one step
    fn roll_notation(&mut self, notation: &str) -> Result<i32, DiceError> {
        let expr = DiceExpr::parse(notation)?;
        Ok(self.roll(&expr))
    }
}

/// Dice backed by a random number generator
#[derive(Debug, Clone)]
pub struct RngDice<R: Rng = ChaCha12Rng> {
    rng: R,
}

impl<R: Rng> RngDice<R> {
    pub fn new(rng: R) -> Self {
        RngDice { rng }
    }
}

impl RngDice<ChaCha12Rng> {
    /// Seeded dice for reproducible battles
    pub fn seeded(seed: u64) -> Self {
        RngDice {
            rng: ChaCha12Rng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> DiceRoller for RngDice<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        if sides == 0 {
            return 0;
        }
        self.rng.gen_range(1..=sides)
    }
}

/// Dice that replay a queue of predetermined die faces
///
/// Each `roll_die` call consumes one queued value (clamped to the die). When
/// the queue runs dry the die's maximum is returned.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    faces: VecDeque<u32>,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        ScriptedDice {
            faces: faces.into_iter().collect(),
        }
    }

    /// Queue more faces
    pub fn push(&mut self, face: u32) {
        self.faces.push_back(face);
    }

    /// Faces not yet consumed
    pub fn remaining(&self) -> usize {
        self.faces.len()
    }
}

impl DiceRoller for ScriptedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        match self.faces.pop_front() {
            Some(face) => face.clamp(1, sides.max(1)),
            None => {
                warn!(sides, "scripted dice exhausted, rolling maximum");
                sides
            }
        }
    }
}
