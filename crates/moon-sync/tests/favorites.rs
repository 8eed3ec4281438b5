use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use moon_cache::{FavoritesQuery, ProjectQuery, QueryCache};
use moon_client::{ApiError, ApiResult, FavoriteApi};
use moon_sync::FavoriteSync;
use moon_types::{is_temp_id, Favorite, FavoritableType, Project};

#[derive(Default)]
struct FakeFavorites {
    fail: AtomicBool,
}

#[async_trait]
impl FavoriteApi for FakeFavorites {
    async fn create_favorite(&self, kind: FavoritableType, id: &str) -> ApiResult<Favorite> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected {
                status: 500,
                body: "nope".to_string(),
            });
        }
        Ok(Favorite {
            id: format!("fav_{id}"),
            type_name: "favorite".to_string(),
            favoritable_id: id.to_string(),
            favoritable_type: kind,
            name: "Apollo".to_string(),
            url: None,
            position: Some(1),
        })
    }

    async fn delete_favorite(&self, _kind: FavoritableType, _id: &str) -> ApiResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected {
                status: 500,
                body: "nope".to_string(),
            });
        }
        Ok(())
    }
}

fn favorites_query() -> FavoritesQuery {
    FavoritesQuery {
        org: "acme".to_string(),
    }
}

fn project_query() -> ProjectQuery {
    ProjectQuery {
        org: "acme".to_string(),
        project_id: "proj1".to_string(),
    }
}

fn setup() -> (FavoriteSync, Arc<FakeFavorites>, QueryCache) {
    let cache = QueryCache::new();
    cache.set(&favorites_query(), &Vec::new()).unwrap();
    cache
        .set(
            &project_query(),
            &Project {
                id: "proj1".to_string(),
                name: "Apollo".to_string(),
                ..Project::default()
            },
        )
        .unwrap();
    let api = Arc::new(FakeFavorites::default());
    let sync = FavoriteSync::new(cache.clone(), api.clone(), "acme");
    (sync, api, cache)
}

fn favorited(cache: &QueryCache) -> bool {
    cache
        .get(&project_query())
        .unwrap()
        .unwrap()
        .viewer_has_favorited
}

#[tokio::test]
async fn add_swaps_the_placeholder_for_the_server_record() {
    let (sync, _api, cache) = setup();
    let favorite = sync
        .add(FavoritableType::Project, "proj1", "Apollo")
        .await
        .unwrap();
    assert_eq!(favorite.id, "fav_proj1");

    let list = cache.get(&favorites_query()).unwrap().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, "fav_proj1");
    assert!(!is_temp_id(&list[0].id));
    assert!(favorited(&cache));
}

#[tokio::test]
async fn failed_add_removes_the_placeholder() {
    let (sync, api, cache) = setup();
    api.fail.store(true, Ordering::SeqCst);

    assert!(sync
        .add(FavoritableType::Project, "proj1", "Apollo")
        .await
        .is_err());
    assert!(cache.get(&favorites_query()).unwrap().unwrap().is_empty());
    assert!(!favorited(&cache));
}

#[tokio::test]
async fn failed_remove_restores_the_entry() {
    let (sync, api, cache) = setup();
    sync.add(FavoritableType::Project, "proj1", "Apollo")
        .await
        .unwrap();

    api.fail.store(true, Ordering::SeqCst);
    assert!(sync.remove(FavoritableType::Project, "proj1").await.is_err());
    let list = cache.get(&favorites_query()).unwrap().unwrap();
    assert_eq!(list.len(), 1);
    assert!(favorited(&cache));

    api.fail.store(false, Ordering::SeqCst);
    sync.remove(FavoritableType::Project, "proj1").await.unwrap();
    assert!(cache.get(&favorites_query()).unwrap().unwrap().is_empty());
    assert!(!favorited(&cache));
}

#[tokio::test]
async fn uncached_favorites_list_is_not_created() {
    let cache = QueryCache::new();
    let sync = FavoriteSync::new(cache.clone(), Arc::new(FakeFavorites::default()), "acme");
    sync.add(FavoritableType::Note, "n1", "Notes")
        .await
        .unwrap();
    assert!(cache.get(&favorites_query()).unwrap().is_none());
}

#[tokio::test]
async fn failed_add_keeps_an_existing_favorite() {
    let (sync, api, cache) = setup();
    sync.add(FavoritableType::Project, "proj1", "Apollo")
        .await
        .unwrap();

    api.fail.store(true, Ordering::SeqCst);
    assert!(sync
        .add(FavoritableType::Project, "proj1", "Apollo")
        .await
        .is_err());
    let list = cache.get(&favorites_query()).unwrap().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, "fav_proj1");
    assert!(favorited(&cache));
}
