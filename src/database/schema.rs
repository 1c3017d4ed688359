use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Serialize, Serializer};

use super::error::TypeError;
use crate::constants::{PRICE_DECIMAL_PLACES, PRICE_MAX_DIGITS};

pub type Id = i32;

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub password: String,
    pub name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Columns left as `None` are not touched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Id,
    pub email: String,
    pub name: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthToken {
    pub token: String,
}

/// The two per-user label registries share one shape and one contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LabelKind {
    Tag,
    Ingredient,
}

impl LabelKind {
    pub fn table(self) -> &'static str {
        match self {
            LabelKind::Tag => "tags",
            LabelKind::Ingredient => "ingredients",
        }
    }

    pub fn link_table(self) -> &'static str {
        match self {
            LabelKind::Tag => "recipe_tags",
            LabelKind::Ingredient => "recipe_ingredients",
        }
    }

    pub fn link_column(self) -> &'static str {
        match self {
            LabelKind::Tag => "tag_id",
            LabelKind::Ingredient => "ingredient_id",
        }
    }

    /// Payload key holding the nested descriptors on a recipe.
    pub fn field(self) -> &'static str {
        self.table()
    }

    pub fn verbose_name(self) -> &'static str {
        match self {
            LabelKind::Tag => "tag",
            LabelKind::Ingredient => "ingredient",
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub id: Id,
    #[serde(skip)]
    pub user_id: Id,
    pub name: String,
}

pub type Tag = Label;
pub type Ingredient = Label;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedLabel {
    pub recipe_id: Id,
    pub id: Id,
    pub user_id: Id,
    pub name: String,
}

impl From<LinkedLabel> for Label {
    fn from(value: LinkedLabel) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            name: value.name,
        }
    }
}

/// Fixed point amount with two fractional digits, held as cents.
#[derive(sqlx::Type, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[sqlx(transparent)]
pub struct Price(i64);

impl Price {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }
}

impl FromStr for Price {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::new("A valid number is required.");

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let fraction = fraction.trim_end_matches('0');
        let whole = whole.trim_start_matches('0');

        if whole.len() + fraction.len() > PRICE_MAX_DIGITS {
            return Err(TypeError::new(&format!(
                "Ensure that there are no more than {PRICE_MAX_DIGITS} digits in total."
            )));
        }
        if fraction.len() > PRICE_DECIMAL_PLACES {
            return Err(TypeError::new(&format!(
                "Ensure that there are no more than {PRICE_DECIMAL_PLACES} decimal places."
            )));
        }
        if whole.len() > PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES {
            return Err(TypeError::new(&format!(
                "Ensure that there are no more than {} digits before the decimal point.",
                PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES
            )));
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_e| invalid())? };
        let fraction: i64 = format!("{fraction:0<2}").parse().map_err(|_e| invalid())?;
        let cents = whole * 100 + fraction;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub time_minutes: i32,
    pub price: Price,
    pub description: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub time_minutes: i32,
    pub price: Price,
    pub description: Option<String>,
    pub link: Option<String>,
}

/// Outer `None` leaves the column untouched; nullable columns can be cleared
/// with `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Price>,
    pub description: Option<Option<String>>,
    pub link: Option<Option<String>>,
}

impl RecipeChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.time_minutes.is_none()
            && self.price.is_none()
            && self.description.is_none()
            && self.link.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeSummary {
    pub id: Id,
    pub title: String,
    pub time_minutes: i32,
    pub price: Price,
    pub link: Option<String>,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub summary: RecipeSummary,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeImage {
    pub id: Id,
    pub image: Option<String>,
}
