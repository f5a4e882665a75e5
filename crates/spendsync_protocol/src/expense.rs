//! The expense record and its boundary types.

use crate::error::ValidationError;
use crate::id::{ExpenseId, ServerId};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fractional digits kept on every amount.
const AMOUNT_SCALE: u32 = 2;

/// A positive currency amount with two fractional digits.
///
/// Inputs with more precision are rounded half away from zero
/// (`12.345` becomes `12.35`, `0.125` becomes `0.13`). An input that is
/// zero or negative, or that rounds to zero, is rejected, as is anything
/// above [`Amount::MAX`]. The cap keeps every ledger sum far inside the
/// range of `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// The largest accepted amount, `999999999999.99`.
    pub const MAX: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, AMOUNT_SCALE);

    /// Validates and rounds a decimal value.
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        let mut rounded =
            value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
        if rounded <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(value.to_string()));
        }
        if rounded > Self::MAX {
            return Err(ValidationError::AmountTooLarge(value.to_string()));
        }
        rounded.rescale(AMOUNT_SCALE);
        Ok(Self(rounded))
    }

    /// Returns the decimal value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s.trim()).map_err(|_| ValidationError::InvalidAmount(s.into()))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The closed set of expense categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Meals and groceries.
    Food,
    /// Commuting, fuel, fares.
    Transport,
    /// Leisure.
    Entertainment,
    /// Retail purchases.
    Shopping,
    /// Bills for power, water, internet.
    Utilities,
    /// Medical costs.
    Health,
    /// Trips.
    Travel,
    /// Courses and books.
    Education,
    /// Anything else.
    Other,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 9] = [
        Category::Food,
        Category::Transport,
        Category::Entertainment,
        Category::Shopping,
        Category::Utilities,
        Category::Health,
        Category::Travel,
        Category::Education,
        Category::Other,
    ];

    /// Returns the wire name of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Entertainment => "entertainment",
            Category::Shopping => "shopping",
            Category::Utilities => "utilities",
            Category::Health => "health",
            Category::Travel => "travel",
            Category::Education => "education",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownCategory(s.into()))
    }
}

/// Returns the `updatedAt` value for a new mutation of a record last
/// stamped at `previous`.
///
/// The result is strictly greater than `previous`, so a mutation always
/// wins a last-writer-wins comparison against the version it replaced,
/// even if the wall clock stalls or steps backwards.
#[must_use]
pub fn bump_timestamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// An expense record as held by a replica.
///
/// `updated_at` is the conflict-resolution authority. `synced` is true only
/// when the local copy is known identical to the server's. `deleted` is a
/// tombstone: the record stays in the replica so the deletion can propagate,
/// but it is excluded from every user-facing view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Identity (provisional or server-assigned).
    pub id: ExpenseId,
    /// Amount spent.
    pub amount: Amount,
    /// Category tag.
    pub category: Category,
    /// Display text.
    pub description: String,
    /// Day the expense occurred.
    pub date: NaiveDate,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,
    /// Whether the server holds this exact version.
    #[serde(default)]
    pub synced: bool,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl Expense {
    /// Creates a new, unsynced record with a fresh provisional identity.
    ///
    /// The input is expected to have passed [`NewExpense::validate`].
    #[must_use]
    pub fn create(new: NewExpense, now: DateTime<Utc>) -> Self {
        Self {
            id: ExpenseId::provisional(),
            amount: new.amount,
            category: new.category,
            description: new.description.trim().to_string(),
            date: new.date,
            created_at: now,
            updated_at: now,
            synced: false,
            deleted: false,
        }
    }

    /// Returns true unless the record is tombstoned.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self.deleted
    }

    /// Checks the rules every stored record satisfies. The date cap
    /// applies to user input only and is not checked here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_description(&self.description)
    }

    /// Returns the server identity, if assigned.
    #[must_use]
    pub fn server_id(&self) -> Option<&ServerId> {
        self.id.server_id()
    }

    /// Records a local mutation: bumps `updated_at` and clears `synced`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = bump_timestamp(self.updated_at, now);
        self.synced = false;
    }

    /// Tombstones the record as a local mutation.
    pub fn tombstone(&mut self, now: DateTime<Utc>) {
        self.deleted = true;
        self.touch(now);
    }

    /// Applies the fields present in `patch` as a local mutation.
    pub fn apply_patch(&mut self, patch: &ExpensePatch, now: DateTime<Utc>) {
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(description) = &patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        self.touch(now);
    }

    /// Returns this record flagged as identical to the server copy.
    #[must_use]
    pub fn into_synced(mut self) -> Self {
        self.synced = true;
        self
    }
}

/// User input for a new expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    /// Amount spent.
    pub amount: Amount,
    /// Category tag.
    pub category: Category,
    /// Display text.
    pub description: String,
    /// Day the expense occurred.
    pub date: NaiveDate,
}

impl NewExpense {
    /// Creates a new expense input.
    pub fn new(
        amount: Amount,
        category: Category,
        description: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            amount,
            category,
            description: description.into(),
            date,
        }
    }

    /// Parses raw user input. Amount and category errors surface here.
    pub fn parse(
        amount: &str,
        category: &str,
        description: impl Into<String>,
        date: NaiveDate,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(amount.parse()?, category.parse()?, description, date))
    }

    /// Checks the rules the type system cannot: a non-blank description and
    /// a date no later than `today`.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        validate_description(&self.description)?;
        validate_date(self.date, today)
    }
}

/// A partial edit of an existing expense.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpensePatch {
    /// New amount.
    pub amount: Option<Amount>,
    /// New category.
    pub category: Option<Category>,
    /// New description.
    pub description: Option<String>,
    /// New date.
    pub date: Option<NaiveDate>,
}

impl ExpensePatch {
    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.date.is_none()
    }

    /// Applies the same rules as [`NewExpense::validate`] to present fields.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(date) = self.date {
            validate_date(date, today)?;
        }
        Ok(())
    }
}

fn validate_description(description: &str) -> Result<(), ValidationError> {
    if description.trim().is_empty() {
        Err(ValidationError::EmptyDescription)
    } else {
        Ok(())
    }
}

fn validate_date(date: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    if date > today {
        Err(ValidationError::FutureDate { date, today })
    } else {
        Ok(())
    }
}
