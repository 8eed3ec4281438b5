//! Optimistic favorites for projects, notes and threads.

use std::sync::Arc;

use tracing::{debug, Level};

use moon_cache::{FavoritesQuery, QueryCache};
use moon_client::FavoriteApi;
use moon_observability::{emit_event, ObservabilityEvent, ProcessKind};
use moon_types::{Favorite, FavoritableType, MessageThread, Note, Project};

use crate::error::SyncResult;

const COMPONENT: &str = "favorite_sync";

#[derive(Clone)]
pub struct FavoriteSync {
    cache: QueryCache,
    api: Arc<dyn FavoriteApi>,
    org: String,
    process: ProcessKind,
}

impl FavoriteSync {
    pub fn new(cache: QueryCache, api: Arc<dyn FavoriteApi>, org: impl Into<String>) -> Self {
        Self {
            cache,
            api,
            org: org.into(),
            process: ProcessKind::Embedded,
        }
    }

    pub fn with_process(mut self, process: ProcessKind) -> Self {
        self.process = process;
        self
    }

    fn query(&self) -> FavoritesQuery {
        FavoritesQuery {
            org: self.org.clone(),
        }
    }

    /// Favorites a resource. A `temp-<id>` placeholder is appended to the
    /// cached favorites list (if one is loaded) and swapped for the server
    /// record on success; on failure the placeholder is dropped and the flag
    /// goes back to its previous value.
    pub async fn add(
        &self,
        kind: FavoritableType,
        resource_id: &str,
        name: impl Into<String>,
    ) -> SyncResult<Favorite> {
        let placeholder = Favorite::optimistic(resource_id, kind, name);
        let was_favorited = self.flag(kind, resource_id)?.unwrap_or(false);
        self.cache.update(&self.query(), |old| {
            let mut favorites = old?;
            if favorites
                .iter()
                .any(|f| f.favoritable_type == kind && f.favoritable_id == resource_id)
            {
                return None;
            }
            favorites.push(placeholder.clone());
            Some(favorites)
        })?;
        self.set_flag(kind, resource_id, true)?;

        match self.api.create_favorite(kind, resource_id).await {
            Ok(favorite) => {
                self.cache
                    .replace_normalized(&placeholder.id, &favorite)?;
                self.emit(Level::INFO, "favorite_added", resource_id, "confirmed", None);
                Ok(favorite)
            }
            Err(err) => {
                self.cache.remove_normalized::<Favorite>(&placeholder.id);
                self.set_flag(kind, resource_id, was_favorited)?;
                self.emit(
                    Level::WARN,
                    "favorite_add_failed",
                    resource_id,
                    "rolled_back",
                    Some(err.code()),
                );
                Err(err.into())
            }
        }
    }

    /// Unfavorites a resource, restoring the list entry and flag on failure.
    pub async fn remove(&self, kind: FavoritableType, resource_id: &str) -> SyncResult<()> {
        let existing = self.cache.get(&self.query())?.and_then(|favorites| {
            favorites
                .into_iter()
                .find(|f| f.favoritable_type == kind && f.favoritable_id == resource_id)
        });
        let was_favorited = self.flag(kind, resource_id)?.unwrap_or(true);
        let removals = match &existing {
            Some(favorite) => self.cache.remove_normalized::<Favorite>(&favorite.id),
            None => Vec::new(),
        };
        self.set_flag(kind, resource_id, false)?;

        match self.api.delete_favorite(kind, resource_id).await {
            Ok(()) => {
                self.emit(Level::INFO, "favorite_removed", resource_id, "confirmed", None);
                Ok(())
            }
            Err(err) => {
                let restored = self.cache.restore_removals(&removals);
                self.set_flag(kind, resource_id, was_favorited)?;
                debug!(resource_id, restored, "favorite removal rolled back");
                self.emit(
                    Level::WARN,
                    "favorite_remove_failed",
                    resource_id,
                    "rolled_back",
                    Some(err.code()),
                );
                Err(err.into())
            }
        }
    }

    /// The cached `viewer_has_favorited` of the first cached copy.
    fn flag(&self, kind: FavoritableType, id: &str) -> SyncResult<Option<bool>> {
        let flag = match kind {
            FavoritableType::Project => self
                .cache
                .get_normalized::<Project>(id)?
                .map(|p| p.viewer_has_favorited),
            FavoritableType::Note => self
                .cache
                .get_normalized::<Note>(id)?
                .map(|n| n.viewer_has_favorited),
            FavoritableType::Thread => self
                .cache
                .get_normalized::<MessageThread>(id)?
                .map(|t| t.viewer_has_favorited),
        };
        Ok(flag)
    }

    fn set_flag(&self, kind: FavoritableType, id: &str, value: bool) -> SyncResult<usize> {
        let touched = match kind {
            FavoritableType::Project => self.cache.set_normalized::<Project, _>(id, |mut p| {
                p.viewer_has_favorited = value;
                p
            })?,
            FavoritableType::Note => self.cache.set_normalized::<Note, _>(id, |mut n| {
                n.viewer_has_favorited = value;
                n
            })?,
            FavoritableType::Thread => {
                self.cache.set_normalized::<MessageThread, _>(id, |mut t| {
                    t.viewer_has_favorited = value;
                    t
                })?
            }
        };
        Ok(touched)
    }

    fn emit(
        &self,
        level: Level,
        event: &str,
        resource_id: &str,
        status: &str,
        error_code: Option<&str>,
    ) {
        emit_event(
            level,
            self.process,
            ObservabilityEvent {
                correlation_id: Some(resource_id),
                status: Some(status),
                error_code,
                ..ObservabilityEvent::new(COMPONENT, event)
            },
        );
    }
}
