//! Typed schema of a Qiita:Team JSON export.
//!
//! Only `articles[].{title, body, rendered_body, url, comments}` drive the
//! migration. The rest is decoded so that a malformed export fails up front
//! instead of halfway through a run.
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// One export document. Immutable once decoded.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Export {
    #[serde(default)]
    pub version: String,
    pub articles: Vec<Article>,
    #[serde(default)]
    pub groups: Vec<Value>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub rendered_body: String,
    pub url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub coediting: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub user: Option<Author>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub permanent_id: Option<i64>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

/// A discussion entry; appended to the page in export order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub user: Author,
    pub body: String,
}

/// Projects are carried through the decode but never migrated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub rendered_body: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<Author>,
}

impl Export {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DecodeError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read an export from a file on disk.
    pub fn from_path(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl Article {
    /// Author ids of the comments, in append order.
    pub fn commenters(&self) -> impl Iterator<Item = &str> {
        self.comments.iter().map(|c| c.user.id.as_str())
    }
}
