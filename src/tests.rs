//! Collection View Scenario Tests
//!
//! End-to-end runs of the view, queue, store and drain hooks against an
//! in-process backend with failure injection.

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::commands::{
        AssetCommands, ItemCommands, MaintenanceCommands, Services, SnapshotFeed, SnapshotListener,
        Subscription,
    };
    use crate::config::SyncConfig;
    use crate::correlation::ItemId;
    use crate::error::{SyncError, SyncResult};
    use crate::models::{
        AssetKind, CollectionKey, Item, ItemDraft, ItemPayload, NewItem, OrderAssignment,
        PendingAsset,
    };
    use crate::queue::TaskFailure;
    use crate::view::CollectionView;

    type Listeners = Arc<Mutex<Vec<(usize, CollectionKey, SnapshotListener)>>>;

    /// In-memory backing store that records calls and can be told to fail
    #[derive(Default)]
    struct FakeBackend {
        rows: Mutex<Vec<(CollectionKey, Item)>>,
        counts: Mutex<HashMap<CollectionKey, i64>>,
        next_id: AtomicUsize,
        calls: Mutex<Vec<String>>,
        depth: AtomicUsize,
        max_depth: AtomicUsize,
        failing_titles: Mutex<HashSet<String>>,
        fail_uploads: AtomicBool,
        fail_deletes: AtomicBool,
        fail_reindex: AtomicBool,
        push_snapshots: AtomicBool,
        listeners: Listeners,
        next_listener: AtomicUsize,
    }

    struct DepthGuard<'a>(&'a AtomicUsize);

    impl Drop for DepthGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FakeBackend {
        fn seeded(key: &CollectionKey, items: Vec<Item>) -> Arc<Self> {
            let backend = Self {
                next_id: AtomicUsize::new(100),
                ..Default::default()
            };
            backend
                .rows
                .lock()
                .unwrap()
                .extend(items.into_iter().map(|item| (key.clone(), item)));
            Arc::new(backend)
        }

        /// Count a call and hold the slot across a yield so overlaps show up
        async fn enter(&self, call: String) -> DepthGuard<'_> {
            self.calls.lock().unwrap().push(call);
            let now = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_depth.fetch_max(now, Ordering::SeqCst);
            let guard = DepthGuard(&self.depth);
            tokio::task::yield_now().await;
            guard
        }

        fn fail_title(&self, title: &str) {
            self.failing_titles.lock().unwrap().insert(title.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn snapshot_of(&self, key: &CollectionKey) -> Vec<Item> {
            let mut items: Vec<Item> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, item)| item.clone())
                .collect();
            items.sort_by_key(|item| item.order_index);
            items
        }

        fn count_of(&self, key: &CollectionKey) -> i64 {
            self.counts.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        fn set_count(&self, key: &CollectionKey, count: i64) {
            self.counts.lock().unwrap().insert(key.clone(), count);
        }

        fn notify(&self, key: &CollectionKey) {
            if !self.push_snapshots.load(Ordering::SeqCst) {
                return;
            }
            let snapshot = self.snapshot_of(key);
            let targets: Vec<SnapshotListener> = self
                .listeners
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, k, _)| k == key)
                .map(|(_, _, listener)| listener.clone())
                .collect();
            for listener in targets {
                listener(snapshot.clone());
            }
        }

        fn key_of(&self, id: &ItemId) -> Option<CollectionKey> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|(_, item)| &item.id == id)
                .map(|(key, _)| key.clone())
        }
    }

    #[async_trait]
    impl ItemCommands for FakeBackend {
        async fn create_item(&self, new_item: NewItem) -> SyncResult<Item> {
            let _guard = self.enter(format!("create {}", new_item.payload.title)).await;
            if self.failing_titles.lock().unwrap().contains(&new_item.payload.title) {
                return Err(SyncError::Persist(format!("rejected {}", new_item.payload.title)));
            }
            let id = format!("p{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let item = Item::new(id, new_item.order_index, new_item.payload)
                .with_client_id(new_item.client_id);
            self.rows
                .lock()
                .unwrap()
                .push((new_item.collection.clone(), item.clone()));
            self.notify(&new_item.collection);
            Ok(item)
        }

        async fn update_item(&self, id: &ItemId, payload: ItemPayload) -> SyncResult<()> {
            let _guard = self.enter(format!("update {}", id)).await;
            if self.failing_titles.lock().unwrap().contains(&payload.title) {
                return Err(SyncError::Persist(format!("rejected {}", payload.title)));
            }
            let key = {
                let mut rows = self.rows.lock().unwrap();
                let (key, item) = rows
                    .iter_mut()
                    .find(|(_, item)| &item.id == id)
                    .ok_or_else(|| SyncError::Persist(format!("no row {}", id)))?;
                item.payload = payload;
                key.clone()
            };
            self.notify(&key);
            Ok(())
        }

        async fn delete_item(&self, id: &ItemId) -> SyncResult<()> {
            let _guard = self.enter(format!("delete {}", id)).await;
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(SyncError::Persist("delete refused".to_string()));
            }
            let key = self.key_of(id);
            self.rows.lock().unwrap().retain(|(_, item)| &item.id != id);
            if let Some(key) = key {
                self.notify(&key);
            }
            Ok(())
        }

        async fn fetch_snapshot(&self, key: &CollectionKey) -> SyncResult<Vec<Item>> {
            Ok(self.snapshot_of(key))
        }
    }

    #[async_trait]
    impl AssetCommands for FakeBackend {
        async fn upload_asset(&self, asset: &PendingAsset, path: &str) -> SyncResult<String> {
            let _guard = self.enter(format!("upload {}", path)).await;
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(SyncError::Upload(format!("{} too large", asset.file_name)));
            }
            Ok(format!("asset://{}", path))
        }

        async fn derive_preview(&self, url: &str) -> SyncResult<Option<String>> {
            let _guard = self.enter(format!("derive {}", url)).await;
            Ok(Some(format!("preview:{}", url)))
        }
    }

    #[async_trait]
    impl MaintenanceCommands for FakeBackend {
        async fn reindex(&self, key: &CollectionKey, assignments: &[OrderAssignment]) -> SyncResult<()> {
            let _guard = self.enter(format!("reindex {}", key)).await;
            if self.fail_reindex.load(Ordering::SeqCst) {
                return Err(SyncError::Persist("positions locked".to_string()));
            }
            {
                let mut rows = self.rows.lock().unwrap();
                for assignment in assignments {
                    if let Some((_, item)) = rows.iter_mut().find(|(_, item)| item.id == assignment.id) {
                        item.order_index = assignment.order_index;
                    }
                }
            }
            self.notify(key);
            Ok(())
        }

        async fn reconcile_count(&self, key: &CollectionKey) -> SyncResult<()> {
            let _guard = self.enter(format!("count {}", key)).await;
            let actual = self.snapshot_of(key).len() as i64;
            self.set_count(key, actual);
            Ok(())
        }
    }

    impl SnapshotFeed for FakeBackend {
        fn subscribe(&self, key: &CollectionKey, listener: SnapshotListener) -> Subscription {
            let handle = self.next_listener.fetch_add(1, Ordering::SeqCst);
            self.listeners
                .lock()
                .unwrap()
                .push((handle, key.clone(), listener));
            let listeners = Arc::clone(&self.listeners);
            Subscription::new(move || {
                listeners.lock().unwrap().retain(|(h, _, _)| *h != handle);
            })
        }
    }

    fn key() -> CollectionKey {
        CollectionKey::pages("u1")
    }

    fn row(id: &str, order_index: i64) -> Item {
        Item::new(id, order_index, ItemPayload::titled(id))
    }

    fn draft(title: &str) -> ItemDraft {
        ItemDraft::new(ItemPayload::titled(title))
    }

    fn ids(items: &[Item]) -> Vec<String> {
        items.iter().map(|item| item.id.to_string()).collect()
    }

    fn titles(items: &[Item]) -> Vec<String> {
        items.iter().map(|item| item.payload.title.clone()).collect()
    }

    fn failure_log() -> (Arc<Mutex<Vec<TaskFailure>>>, crate::queue::FailureNotice) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (
            log,
            Arc::new(move |failure: &TaskFailure| sink.lock().unwrap().push(failure.clone())),
        )
    }

    async fn loaded_view(backend: &Arc<FakeBackend>) -> CollectionView {
        let view = CollectionView::new(
            key(),
            Services::from_backend(backend.clone()),
            SyncConfig::default(),
        );
        view.load().await.unwrap();
        view
    }

    #[tokio::test]
    async fn test_scenario_a_snapshot_supersedes_placeholder() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1)]);
        let view = loaded_view(&backend).await;

        let temp = view.create(draft("New page"));
        let items = view.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, temp);
        assert!(temp.is_temporary());
        assert_eq!(items[1].order_index, 2);
        assert!(items[1].is_optimistic);

        // the create has not run yet; the server already knows the row under p9
        let client_id = items[1].client_id.clone().unwrap();
        let snapshot = vec![row("p1", 1), row("p9", 2).with_client_id(client_id)];
        view.on_snapshot_received(snapshot.clone());

        assert_eq!(ids(&view.items()), vec!["p1", "p9"]);
        assert!(view.items().iter().all(|item| !item.is_optimistic));

        view.on_snapshot_received(snapshot);
        assert_eq!(ids(&view.items()), vec!["p1", "p9"]);
        view.wait_idle().await;
    }

    #[tokio::test]
    async fn test_scenario_b_stale_snapshot_cannot_resurrect() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1), row("p9", 2)]);
        let view = loaded_view(&backend).await;

        assert!(view.delete(&ItemId::from("p1")));
        assert_eq!(ids(&view.items()), vec!["p9"]);
        assert!(view.store().deletion_mask().contains(&ItemId::from("p1")));

        view.on_snapshot_received(vec![row("p1", 1), row("p9", 2)]);
        assert_eq!(ids(&view.items()), vec!["p9"]);

        view.wait_idle().await;
        view.load().await.unwrap();
        assert_eq!(ids(&view.items()), vec!["p9"]);
        assert!(view.store().deletion_mask().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scenario_c_back_to_back_creates_run_in_order() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1)]);
        let view = loaded_view(&backend).await;

        view.create(draft("first"));
        view.create(draft("second"));

        let orders: Vec<i64> = view.items().iter().map(|item| item.order_index).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(titles(&view.items()), vec!["p1", "first", "second"]);

        view.wait_idle().await;
        assert_eq!(backend.max_depth.load(Ordering::SeqCst), 1);
        let creates: Vec<String> = backend
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("create"))
            .collect();
        assert_eq!(creates, vec!["create first", "create second"]);
    }

    #[tokio::test]
    async fn test_scenario_d_drain_repairs_order_and_count() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1)]);
        backend.set_count(&key(), 7);
        backend.fail_title("broken");
        let (failures, notice) = failure_log();
        let view = CollectionView::with_failure_notice(
            key(),
            Services::from_backend(backend.clone()),
            SyncConfig::default(),
            notice,
        );
        view.load().await.unwrap();

        view.create(draft("kept"));
        view.create(draft("broken"));
        view.wait_idle().await;

        assert_eq!(titles(&view.items()), vec!["p1", "kept"]);
        let persisted = backend.snapshot_of(&key());
        let orders: Vec<(String, i64)> = persisted
            .iter()
            .map(|item| (item.payload.title.clone(), item.order_index))
            .collect();
        assert_eq!(orders, vec![("p1".to_string(), 0), ("kept".to_string(), 1)]);
        assert_eq!(backend.count_of(&key()), 2);

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, SyncError::Persist(_)));

        let calls = backend.calls();
        let last_two = &calls[calls.len() - 2..];
        assert_eq!(last_two, ["reindex pages/u1", "count pages/u1"]);
    }

    #[tokio::test]
    async fn test_pushed_snapshots_never_duplicate() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1)]);
        backend.push_snapshots.store(true, Ordering::SeqCst);
        let view = loaded_view(&backend).await;
        assert!(view.attach());

        for title in ["a", "b", "c"] {
            view.create(draft(title));
        }
        view.wait_idle().await;

        let items = view.items();
        assert_eq!(titles(&items), vec!["p1", "a", "b", "c"]);
        assert!(items.iter().all(|item| !item.id.is_temporary()));
        assert!(items.iter().all(|item| !item.is_optimistic));
        let client_ids: HashSet<_> = items.iter().filter_map(|item| item.client_id.clone()).collect();
        assert_eq!(client_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_create_restores_previous_list() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1), row("p2", 2)]);
        backend.fail_title("nope");
        let view = loaded_view(&backend).await;
        let before = view.items();

        view.create(draft("nope"));
        assert_eq!(view.items().len(), 3);
        view.wait_idle().await;

        assert_eq!(view.items(), before);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_item() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1), row("p2", 2)]);
        backend.fail_deletes.store(true, Ordering::SeqCst);
        let (failures, notice) = failure_log();
        let view = CollectionView::with_failure_notice(
            key(),
            Services::from_backend(backend.clone()),
            SyncConfig::default(),
            notice,
        );
        view.load().await.unwrap();

        view.delete(&ItemId::from("p1"));
        assert_eq!(ids(&view.items()), vec!["p2"]);
        view.wait_idle().await;

        assert_eq!(ids(&view.items()), vec!["p1", "p2"]);
        assert!(view.store().deletion_mask().is_empty());
        assert_eq!(failures.lock().unwrap()[0].task, "delete p1");
    }

    #[tokio::test]
    async fn test_delete_before_create_lands() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1)]);
        backend.push_snapshots.store(true, Ordering::SeqCst);
        let view = loaded_view(&backend).await;
        assert!(view.attach());

        let temp = view.create(draft("short lived"));
        assert!(view.delete(&temp));
        assert_eq!(ids(&view.items()), vec!["p1"]);

        view.wait_idle().await;
        assert_eq!(ids(&view.items()), vec!["p1"]);
        assert_eq!(titles(&backend.snapshot_of(&key())), vec!["p1"]);
        assert!(backend.calls().iter().any(|call| call == "create short lived"));

        view.load().await.unwrap();
        assert_eq!(ids(&view.items()), vec!["p1"]);
        assert!(view.store().deletion_mask().is_empty());
    }

    #[tokio::test]
    async fn test_delete_of_failed_create_is_noop() {
        let backend = FakeBackend::seeded(&key(), vec![]);
        backend.fail_title("doomed");
        let view = loaded_view(&backend).await;

        let temp = view.create(draft("doomed"));
        view.delete(&temp);
        view.wait_idle().await;

        assert!(view.items().is_empty());
        assert!(!backend.calls().iter().any(|call| call.starts_with("delete")));
    }

    #[tokio::test]
    async fn test_failed_edit_restores_row() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1), row("p2", 2)]);
        backend.fail_title("forbidden");
        let view = loaded_view(&backend).await;
        let before = view.items();

        assert!(view.edit(&ItemId::from("p2"), draft("forbidden")));
        assert_eq!(titles(&view.items()), vec!["p1", "forbidden"]);
        view.wait_idle().await;

        assert_eq!(view.items(), before);
        assert!(!view.edit(&ItemId::from("missing"), draft("x")));
    }

    #[tokio::test]
    async fn test_failed_edit_keeps_later_delete_and_create() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1), row("p2", 2)]);
        backend.fail_title("forbidden");
        let view = loaded_view(&backend).await;

        assert!(view.edit(&ItemId::from("p1"), draft("forbidden")));
        assert!(view.delete(&ItemId::from("p2")));
        view.create(draft("fresh"));
        view.wait_idle().await;

        let items = view.items();
        assert_eq!(titles(&items), vec!["p1", "fresh"]);
        assert_eq!(ids(&items), ids(&backend.snapshot_of(&key())));
        assert!(items.iter().all(|item| !item.id.is_temporary()));
        assert!(view.store().get(&ItemId::from("p2")).is_none());
    }

    #[tokio::test]
    async fn test_edit_keeps_confirmed_state() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1)]);
        let view = loaded_view(&backend).await;

        view.edit(&ItemId::from("p1"), draft("renamed"));
        let item = view.store().get(&ItemId::from("p1")).unwrap();
        assert!(!item.is_optimistic);
        view.wait_idle().await;

        assert_eq!(titles(&backend.snapshot_of(&key())), vec!["renamed"]);
    }

    #[tokio::test]
    async fn test_reorder_persists_dense_positions() {
        let backend = FakeBackend::seeded(&key(), vec![row("a", 0), row("b", 1), row("c", 2)]);
        let view = loaded_view(&backend).await;

        assert!(view.reorder(&ItemId::from("c"), 0));
        assert_eq!(ids(&view.items()), vec!["c", "a", "b"]);
        view.wait_idle().await;

        assert_eq!(ids(&backend.snapshot_of(&key())), vec!["c", "a", "b"]);
        assert!(!view.reorder(&ItemId::from("zzz"), 1));
    }

    #[tokio::test]
    async fn test_failed_reorder_keeps_later_create() {
        let backend = FakeBackend::seeded(&key(), vec![row("a", 0), row("b", 1), row("c", 2)]);
        backend.fail_reindex.store(true, Ordering::SeqCst);
        let (failures, notice) = failure_log();
        let view = CollectionView::with_failure_notice(
            key(),
            Services::from_backend(backend.clone()),
            SyncConfig::default(),
            notice,
        );
        view.load().await.unwrap();

        assert!(view.reorder(&ItemId::from("c"), 0));
        view.create(draft("d"));
        assert_eq!(titles(&view.items()), vec!["c", "a", "b", "d"]);
        view.wait_idle().await;

        assert_eq!(titles(&view.items()), vec!["a", "b", "c", "d"]);
        assert_eq!(ids(&view.items()), ids(&backend.snapshot_of(&key())));
        assert_eq!(failures.lock().unwrap()[0].task, "reorder c");
    }

    #[tokio::test]
    async fn test_video_create_uploads_then_derives_preview() {
        let backend = FakeBackend::seeded(&key(), vec![]);
        let view = loaded_view(&backend).await;

        let asset = PendingAsset {
            file_name: "clip.mp4".to_string(),
            kind: AssetKind::Video,
            bytes: vec![0, 1, 2],
            client_placeholder: Some("blur".to_string()),
        };
        let temp = view.create(draft("Clip").with_asset(asset));
        let placeholder = view.store().get(&temp).unwrap();
        assert_eq!(placeholder.payload.placeholder.as_deref(), Some("blur"));
        let client_id = placeholder.client_id.unwrap();

        view.wait_idle().await;

        let expected_path = format!("uploads/pages/u1/{}/clip.mp4", client_id);
        let calls = backend.calls();
        assert_eq!(calls[0], format!("upload {}", expected_path));
        assert_eq!(calls[1], format!("derive asset://{}", expected_path));
        assert_eq!(calls[2], "create Clip");

        let persisted = backend.snapshot_of(&key());
        assert_eq!(
            persisted[0].payload.asset_url.as_deref(),
            Some(format!("asset://{}", expected_path).as_str())
        );
        assert_eq!(
            persisted[0].payload.placeholder.as_deref(),
            Some(format!("preview:asset://{}", expected_path).as_str())
        );
    }

    #[tokio::test]
    async fn test_image_create_keeps_client_placeholder() {
        let backend = FakeBackend::seeded(&key(), vec![]);
        let view = loaded_view(&backend).await;

        let asset = PendingAsset {
            file_name: "photo.png".to_string(),
            kind: AssetKind::Image,
            bytes: vec![9],
            client_placeholder: Some("tiny".to_string()),
        };
        view.create(draft("Photo").with_asset(asset));
        view.wait_idle().await;

        assert!(!backend.calls().iter().any(|call| call.starts_with("derive")));
        let persisted = backend.snapshot_of(&key());
        assert_eq!(persisted[0].payload.placeholder.as_deref(), Some("tiny"));
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_create() {
        let backend = FakeBackend::seeded(&key(), vec![]);
        backend.fail_uploads.store(true, Ordering::SeqCst);
        let (failures, notice) = failure_log();
        let view = CollectionView::with_failure_notice(
            key(),
            Services::from_backend(backend.clone()),
            SyncConfig::default(),
            notice,
        );

        let asset = PendingAsset {
            file_name: "huge.mov".to_string(),
            kind: AssetKind::Video,
            bytes: vec![],
            client_placeholder: None,
        };
        view.create(draft("Huge").with_asset(asset));
        view.wait_idle().await;

        assert!(view.items().is_empty());
        assert!(!backend.calls().iter().any(|call| call.starts_with("create")));
        assert!(matches!(failures.lock().unwrap()[0].error, SyncError::Upload(_)));
    }

    #[tokio::test]
    async fn test_detach_stops_pushed_snapshots() {
        let backend = FakeBackend::seeded(&key(), vec![row("p1", 1)]);
        backend.push_snapshots.store(true, Ordering::SeqCst);
        let view = loaded_view(&backend).await;
        assert!(view.attach());
        view.detach();

        backend.rows.lock().unwrap().push((key(), row("p2", 2)));
        backend.notify(&key());
        assert_eq!(ids(&view.items()), vec!["p1"]);

        assert!(view.attach());
        backend.notify(&key());
        assert_eq!(ids(&view.items()), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_busy_until_drain_finishes() {
        let backend = FakeBackend::seeded(&key(), vec![]);
        let view = loaded_view(&backend).await;
        assert!(!view.busy());

        view.create(draft("x"));
        assert!(view.busy());
        view.wait_idle().await;
        assert!(!view.busy());
        assert_eq!(backend.count_of(&key()), 1);
    }
}
