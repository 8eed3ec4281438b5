use serde::{Deserialize, Serialize};

use crate::ids::temp_id;
use crate::Normalized;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavoritableType {
    Project,
    Note,
    Thread,
}

impl FavoritableType {
    pub fn as_str(self) -> &'static str {
        match self {
            FavoritableType::Project => "project",
            FavoritableType::Note => "note",
            FavoritableType::Thread => "thread",
        }
    }

    /// Collection segment used in REST paths.
    pub fn path_segment(self) -> &'static str {
        match self {
            FavoritableType::Project => "projects",
            FavoritableType::Note => "notes",
            FavoritableType::Thread => "threads",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: String,
    #[serde(default = "favorite_type_name")]
    pub type_name: String,
    pub favoritable_id: String,
    pub favoritable_type: FavoritableType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

fn favorite_type_name() -> String {
    Favorite::TYPE_NAME.to_string()
}

impl Favorite {
    /// Placeholder shown until the server assigns an id.
    pub fn optimistic(
        resource_id: &str,
        favoritable_type: FavoritableType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: temp_id(resource_id),
            type_name: favorite_type_name(),
            favoritable_id: resource_id.to_string(),
            favoritable_type,
            name: name.into(),
            url: None,
            position: None,
        }
    }
}

impl Normalized for Favorite {
    const TYPE_NAME: &'static str = "favorite";
}
