//! Rows of the `themes` and `toys` tables and their write payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::slug::to_slug;

/// A user-owned named collection of toys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Theme {
    /// URL identifier derived from the name; not guaranteed unique.
    pub fn slug(&self) -> String {
        to_slug(&self.name)
    }
}

/// Payload for inserting a theme
#[derive(Debug, Clone, Serialize)]
pub struct NewTheme {
    pub name: String,
    pub image: Option<String>,
    pub user_id: String,
}

impl NewTheme {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)
    }
}

/// A single cataloged item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toy {
    pub id: Uuid,
    pub theme_id: Uuid,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub nb_pieces: Option<i32>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub is_exposed: bool,
    #[serde(default)]
    pub is_soon: bool,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub studio: Option<String>,
    #[serde(default)]
    pub release_date: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Payload for inserting a toy
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewToy {
    pub theme_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub size: Option<String>,
    pub nb_pieces: Option<i32>,
    pub number: Option<String>,
    pub is_exposed: bool,
    pub is_soon: bool,
    pub photo_url: Option<String>,
    pub category: Option<String>,
    pub studio: Option<String>,
    pub release_date: Option<i32>,
}

impl NewToy {
    /// A toy with only the required fields set.
    pub fn named(theme_id: Uuid, user_id: &str, name: &str) -> Self {
        Self {
            theme_id,
            user_id: user_id.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_pieces(self.nb_pieces)
    }

    /// Trims free-text fields and turns blank optional text into `None`.
    pub fn normalized(mut self) -> Self {
        normalize_text(
            &mut self.name,
            [
                &mut self.size,
                &mut self.number,
                &mut self.photo_url,
                &mut self.category,
                &mut self.studio,
            ],
        );
        self
    }
}

/// Full replacement of a toy's editable fields
///
/// Every field is written, so `None` clears the column.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToyChanges {
    pub name: String,
    pub size: Option<String>,
    pub nb_pieces: Option<i32>,
    pub number: Option<String>,
    pub is_exposed: bool,
    pub is_soon: bool,
    pub photo_url: Option<String>,
    pub category: Option<String>,
    pub studio: Option<String>,
    pub release_date: Option<i32>,
}

impl ToyChanges {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_pieces(self.nb_pieces)
    }

    pub fn normalized(mut self) -> Self {
        normalize_text(
            &mut self.name,
            [
                &mut self.size,
                &mut self.number,
                &mut self.photo_url,
                &mut self.category,
                &mut self.studio,
            ],
        );
        self
    }

    /// Apply the changes to a copy of `toy`.
    pub fn apply_to(&self, toy: &Toy) -> Toy {
        Toy {
            name: self.name.clone(),
            size: self.size.clone(),
            nb_pieces: self.nb_pieces,
            number: self.number.clone(),
            is_exposed: self.is_exposed,
            is_soon: self.is_soon,
            photo_url: self.photo_url.clone(),
            category: self.category.clone(),
            studio: self.studio.clone(),
            release_date: self.release_date,
            ..toy.clone()
        }
    }
}

impl From<&Toy> for ToyChanges {
    fn from(toy: &Toy) -> Self {
        Self {
            name: toy.name.clone(),
            size: toy.size.clone(),
            nb_pieces: toy.nb_pieces,
            number: toy.number.clone(),
            is_exposed: toy.is_exposed,
            is_soon: toy.is_soon,
            photo_url: toy.photo_url.clone(),
            category: toy.category.clone(),
            studio: toy.studio.clone(),
            release_date: toy.release_date,
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("name must not be empty"));
    }
    Ok(())
}

fn validate_pieces(nb_pieces: Option<i32>) -> Result<()> {
    match nb_pieces {
        Some(n) if n < 0 => Err(Error::validation(format!(
            "piece count must be zero or more, got {}",
            n
        ))),
        _ => Ok(()),
    }
}

/// Trims `name` and turns blank optional text into `None`.
fn normalize_text(name: &mut String, optional: [&mut Option<String>; 5]) {
    *name = name.trim().to_string();
    for field in optional {
        *field = blank_to_none(field.take());
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
