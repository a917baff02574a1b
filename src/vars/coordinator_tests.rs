use std::sync::Arc;
use std::time::Duration;

use crate::config::WatchConfig;
use crate::source::SourceKind;
use crate::test_utils::MemorySourceProvider;
use crate::vars::coordinator::*;
use crate::vars::events::{DispatchOutcome, SourceEvent};

fn coordinator(files: &[(&str, &str)]) -> (Arc<MemorySourceProvider>, Arc<InvalidationCoordinator<MemorySourceProvider>>) {
    let provider = Arc::new(MemorySourceProvider::with_files(files));
    let coordinator = Arc::new(InvalidationCoordinator::new(provider.clone(), WatchConfig::default()));
    (provider, coordinator)
}

fn values(coordinator: &InvalidationCoordinator<MemorySourceProvider>, name: &str) -> Option<Vec<(String, String)>> {
    let index = coordinator.read_index()?;
    index.lookup(name).map(|definitions| {
        definitions
            .iter()
            .map(|d| (d.source.clone(), d.value.clone()))
            .collect()
    })
}

#[tokio::test]
async fn test_open_builds_index_in_enumeration_order() {
    let (_, coordinator) = coordinator(&[
        ("b.css", ":root { --x: blue; }"),
        ("a.css", ":root { --x: red; }"),
        ("notes.txt", "--x: ignored;"),
    ]);

    assert_eq!(coordinator.open().await, DispatchOutcome::Rebuilt);
    assert_eq!(
        values(&coordinator, "--x"),
        Some(vec![
            ("a.css".to_string(), "red".to_string()),
            ("b.css".to_string(), "blue".to_string())
        ])
    );
}

#[tokio::test]
async fn test_closed_coordinator_ignores_events() {
    let (_, coordinator) = coordinator(&[("a.css", ":root { --a: 1; }")]);
    assert_eq!(
        coordinator.dispatch(SourceEvent::Changed("a.css".to_string())).await,
        DispatchOutcome::Ignored
    );

    coordinator.open().await;
    assert!(values(&coordinator, "--a").is_some());

    coordinator.close().await;
    assert!(!coordinator.is_open());
    assert!(coordinator.read_index().unwrap().is_empty());
    assert_eq!(coordinator.dispatch(SourceEvent::Refresh).await, DispatchOutcome::Ignored);
}

#[tokio::test]
async fn test_changed_source_is_replaced_not_appended() {
    let (provider, coordinator) = coordinator(&[("a.css", ":root { --a: 1; --b: 2; }")]);
    coordinator.open().await;

    provider.set("a.css", ":root { --a: 10; }");
    let event = SourceEvent::Changed("a.css".to_string());
    assert_eq!(coordinator.dispatch(event.clone()).await, DispatchOutcome::Updated);
    assert_eq!(coordinator.dispatch(event).await, DispatchOutcome::Updated);

    assert_eq!(values(&coordinator, "--a"), Some(vec![("a.css".to_string(), "10".to_string())]));
    assert_eq!(values(&coordinator, "--b"), None);
}

#[tokio::test]
async fn test_created_source_is_added() {
    let (provider, coordinator) = coordinator(&[("a.css", ":root { --x: 1; }")]);
    coordinator.open().await;

    provider.set("b.css", ":root { --x: 2; --y: 3; }");
    assert_eq!(
        coordinator.dispatch(SourceEvent::Created("b.css".to_string())).await,
        DispatchOutcome::Updated
    );
    assert_eq!(values(&coordinator, "--x").unwrap().len(), 2);
    assert!(values(&coordinator, "--y").is_some());
}

#[tokio::test]
async fn test_unwatched_sources_are_ignored() {
    let (provider, coordinator) = coordinator(&[]);
    coordinator.open().await;

    provider.set("src/App.vue", "<style>:root { --v: 1; }</style>");
    assert_eq!(
        coordinator.dispatch(SourceEvent::Changed("src/App.vue".to_string())).await,
        DispatchOutcome::Ignored
    );
    assert_eq!(
        coordinator.dispatch(SourceEvent::Changed("node_modules/x/x.css".to_string())).await,
        DispatchOutcome::Ignored
    );
    assert!(values(&coordinator, "--v").is_none());
}

#[tokio::test]
async fn test_deleted_source_triggers_rebuild() {
    let (provider, coordinator) = coordinator(&[
        ("a.css", ":root { --only-a: 1; --shared: a; }"),
        ("b.css", ":root { --shared: b; }"),
    ]);
    coordinator.open().await;

    provider.remove("a.css");
    assert_eq!(
        coordinator.dispatch(SourceEvent::Deleted("a.css".to_string())).await,
        DispatchOutcome::Rebuilt
    );

    assert_eq!(values(&coordinator, "--only-a"), None);
    assert_eq!(values(&coordinator, "--shared"), Some(vec![("b.css".to_string(), "b".to_string())]));
}

#[tokio::test]
async fn test_removed_directory_triggers_rebuild() {
    let (provider, coordinator) = coordinator(&[
        ("styles/a.css", ":root { --only-a: 1; }"),
        ("b.css", ":root { --b: 1; }"),
    ]);
    coordinator.open().await;

    // moving a folder out is reported once, for the folder
    provider.remove("styles/a.css");
    assert_eq!(
        coordinator.dispatch(SourceEvent::Deleted("styles".to_string())).await,
        DispatchOutcome::Rebuilt
    );
    assert!(values(&coordinator, "--only-a").is_none());
    assert!(values(&coordinator, "--b").is_some());

    assert_eq!(
        coordinator.dispatch(SourceEvent::Deleted("scripts".to_string())).await,
        DispatchOutcome::Ignored
    );
}

#[tokio::test]
async fn test_created_directory_triggers_rebuild() {
    let (provider, coordinator) = coordinator(&[("a.css", ":root { --a: 1; }")]);
    coordinator.open().await;

    provider.set("themes/t.css", ":root { --moved-in: 1; }");
    assert_eq!(
        coordinator.dispatch(SourceEvent::Created("themes".to_string())).await,
        DispatchOutcome::Rebuilt
    );
    assert_eq!(
        values(&coordinator, "--moved-in"),
        Some(vec![("themes/t.css".to_string(), "1".to_string())])
    );

    assert_eq!(
        coordinator.dispatch(SourceEvent::Created("node_modules".to_string())).await,
        DispatchOutcome::Ignored
    );
    assert_eq!(
        coordinator.dispatch(SourceEvent::Created("src/main.ts".to_string())).await,
        DispatchOutcome::Ignored
    );
}

#[tokio::test]
async fn test_failed_listing_keeps_current_index() {
    let (provider, coordinator) = coordinator(&[
        ("a.css", ":root { --a: 1; }"),
        ("b.css", ":root { --b: 1; }"),
    ]);
    coordinator.open().await;

    provider.fail_listing(true);
    assert_eq!(coordinator.dispatch(SourceEvent::Refresh).await, DispatchOutcome::Discarded);
    assert!(values(&coordinator, "--a").is_some());
    assert!(values(&coordinator, "--b").is_some());

    provider.fail_listing(false);
    provider.set("b.css", ":root { --b: 2; }");
    assert_eq!(coordinator.dispatch(SourceEvent::Refresh).await, DispatchOutcome::Rebuilt);
    assert_eq!(values(&coordinator, "--b"), Some(vec![("b.css".to_string(), "2".to_string())]));
}

#[tokio::test]
async fn test_unreadable_source_contributes_nothing() {
    let (provider, coordinator) = coordinator(&[
        ("a.css", ":root { --a: 1; }"),
        ("b.css", ":root { --b: 1; }"),
    ]);
    coordinator.open().await;

    // the change event arrives but the file is already gone
    provider.remove("a.css");
    assert_eq!(
        coordinator.dispatch(SourceEvent::Changed("a.css".to_string())).await,
        DispatchOutcome::Updated
    );
    assert!(values(&coordinator, "--a").is_none());
    assert!(values(&coordinator, "--b").is_some());
}

#[tokio::test]
async fn test_register_component_source() {
    let (_, coordinator) = coordinator(&[("src/App.vue", "<template/>\n<style>:root { --app: 1; }</style>")]);
    coordinator.open().await;
    assert!(values(&coordinator, "--app").is_none());

    assert_eq!(coordinator.register_source("src/App.vue").await, DispatchOutcome::Rebuilt);
    assert_eq!(coordinator.register_source("src/App.vue").await, DispatchOutcome::Ignored);
    assert_eq!(values(&coordinator, "--app"), Some(vec![("src/App.vue".to_string(), "1".to_string())]));

    assert_eq!(coordinator.unregister_source("src/App.vue").await, DispatchOutcome::Rebuilt);
    assert!(values(&coordinator, "--app").is_none());
}

#[tokio::test]
async fn test_watch_set_changed_rebuilds() {
    let (_, coordinator) = coordinator(&[("index.html", "<div style=\"--inline: 2px;\"></div>")]);
    coordinator.open().await;

    let outcome = coordinator
        .dispatch(SourceEvent::WatchSetChanged(vec!["index.html".to_string()]))
        .await;
    assert_eq!(outcome, DispatchOutcome::Rebuilt);
    assert!(coordinator.config().is_registered("index.html"));
    assert!(values(&coordinator, "--inline").is_some());
}

#[tokio::test]
async fn test_theme_config_updates_class_mappings() {
    let (provider, coordinator) = coordinator(&[(
        "tailwind.config.js",
        "module.exports = { theme: { backgroundColor: { primary: 'var(--primary)', old: 'var(--old)' } } }",
    )]);
    coordinator.open().await;
    {
        let index = coordinator.read_index().unwrap();
        assert_eq!(index.lookup_class("bg-primary").unwrap().variable, "--primary");
        assert!(index.lookup_class("bg-old").is_some());
    }

    provider.set(
        "tailwind.config.js",
        "module.exports = { theme: { backgroundColor: { primary: 'var(--primary-2)' } } }",
    );
    coordinator
        .dispatch(SourceEvent::Changed("tailwind.config.js".to_string()))
        .await;

    let index = coordinator.read_index().unwrap();
    assert_eq!(index.lookup_class("bg-primary").unwrap().variable, "--primary-2");
    assert!(index.lookup_class("bg-old").is_none());
}

#[tokio::test]
async fn test_extraction_for_deleted_source_is_discarded() {
    let (provider, coordinator) = coordinator(&[
        ("a.css", ":root { --a: 1; }"),
        ("b.css", ":root { --b: 1; }"),
    ]);
    coordinator.open().await;

    provider.set("a.css", ":root { --a: 2; --stale: 1; }");
    let gate = provider.hold("a.css");
    let update = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.dispatch(SourceEvent::Changed("a.css".to_string())).await })
    };
    gate.started.notified().await;

    provider.remove("a.css");
    let delete = coordinator.dispatch(SourceEvent::Deleted("a.css".to_string()));
    tokio::pin!(delete);
    // the delete registers itself, then waits for the in-flight update
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut delete).await.is_err());

    gate.release.notify_one();
    assert_eq!(update.await.unwrap(), DispatchOutcome::Discarded);
    assert_eq!(delete.await, DispatchOutcome::Rebuilt);

    assert!(values(&coordinator, "--a").is_none());
    assert!(values(&coordinator, "--stale").is_none());
    assert!(values(&coordinator, "--b").is_some());
}

#[tokio::test]
async fn test_stale_update_does_not_overwrite_rebuild() {
    let (provider, coordinator) = coordinator(&[("a.css", ":root { --a: 1; }")]);
    coordinator.open().await;

    provider.set("a.css", ":root { --a: 2; }");
    let gate = provider.hold("a.css");
    let update = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.dispatch(SourceEvent::Changed("a.css".to_string())).await })
    };
    gate.started.notified().await;

    let refresh = coordinator.dispatch(SourceEvent::Refresh);
    tokio::pin!(refresh);
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut refresh).await.is_err());

    provider.set("a.css", ":root { --a: 3; }");
    gate.release.notify_one();

    assert_eq!(update.await.unwrap(), DispatchOutcome::Discarded);
    assert_eq!(refresh.await, DispatchOutcome::Rebuilt);
    assert_eq!(values(&coordinator, "--a"), Some(vec![("a.css".to_string(), "3".to_string())]));
}

#[tokio::test]
async fn test_queued_rebuild_yields_to_newer_one() {
    let (provider, coordinator) = coordinator(&[("a.css", ":root { --a: 1; }")]);
    coordinator.open().await;

    let gate = provider.hold("a.css");
    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.dispatch(SourceEvent::Refresh).await })
    };
    gate.started.notified().await;

    let second = coordinator.dispatch(SourceEvent::Refresh);
    tokio::pin!(second);
    assert!(tokio::time::timeout(Duration::from_millis(20), &mut second).await.is_err());

    gate.release.notify_one();
    assert_eq!(first.await.unwrap(), DispatchOutcome::Discarded);
    assert_eq!(second.await, DispatchOutcome::Rebuilt);
    assert!(values(&coordinator, "--a").is_some());
}

#[test]
fn test_build_contribution_per_kind() {
    let theme = "module.exports = { theme: { spacing: { '4': 'var(--spacing-4)' } } }";
    let contribution = build_contribution(theme, "tailwind.config.js", SourceKind::ThemeConfig);
    assert_eq!(contribution.class_mappings.len(), 1);
    assert!(contribution.variables.is_empty());

    let contribution = build_contribution(theme, "theme.js", SourceKind::Registered);
    assert!(contribution.class_mappings.is_empty());

    let component = "<template>--no: 1;</template><style>:root { --yes: 1; }</style>";
    let contribution = build_contribution(component, "App.vue", SourceKind::Component);
    assert_eq!(contribution.variables.len(), 1);
    assert_eq!(contribution.variables[0].name, "--yes");
}
