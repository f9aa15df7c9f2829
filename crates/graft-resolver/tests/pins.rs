mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::{config, id, root, v, MockRepo};
use graft_core::pinfile::{PinEntry, PinFile};
use graft_core::version::Version;
use graft_resolver::pins::{self, PinMode};
use graft_resolver::{ResolveError, Resolver};

/// a, c and d at their first releases; a depends on d.
fn initial_repo() -> MockRepo {
    let mut repo = MockRepo::new();
    repo.publish("a", "1.0.0", &[("d", ">=1.0.0")])
        .publish("a", "1.5.0", &[("d", ">=1.0.0")]);
    repo.publish("c", "1.0.0", &[]);
    repo.publish("d", "1.0.0", &[]);
    repo
}

/// The same repository after new releases of every package.
fn later_repo() -> MockRepo {
    let mut repo = initial_repo();
    repo.publish("a", "1.6.0", &[("d", ">=1.0.0")])
        .publish("a", "1.7.0", &[("d", ">=1.0.0")]);
    repo.publish("c", "1.1.0", &[]);
    repo.publish("d", "1.2.0", &[]);
    repo
}

fn resolver(repo: MockRepo) -> (Arc<MockRepo>, Resolver<MockRepo, MockRepo>) {
    let repo = Arc::new(repo);
    let resolver = Resolver::new(Arc::clone(&repo), Arc::clone(&repo), config());
    (repo, resolver)
}

async fn initial_pins() -> PinFile {
    let (_, resolver) = resolver(initial_repo());
    let resolution = resolver
        .resolve(
            &root(&[("a", "1.0.0..<2.0.0"), ("c", "1.0.0..<2.0.0")]),
            &BTreeMap::new(),
        )
        .await
        .unwrap();
    pins::pin_file(&resolution)
}

#[tokio::test]
async fn pin_file_records_every_package() {
    let file = initial_pins().await;
    let versions: Vec<_> = file
        .pins
        .iter()
        .map(|p| (p.identity.clone(), p.pinned().unwrap()))
        .collect();
    assert_eq!(
        versions,
        vec![
            (id("a"), v("1.5.0")),
            (id("c"), v("1.0.0")),
            (id("d"), v("1.0.0")),
        ]
    );
    assert!(file.pins.iter().all(|p| p.requirement_hash.len() == 64));
    assert_eq!(file.pins[0].location, "https://example.com/a");
}

#[tokio::test]
async fn unchanged_manifests_keep_every_pin() {
    let file = initial_pins().await;
    let (repo, resolver) = resolver(later_repo());
    let root = root(&[("a", "1.0.0..<2.0.0"), ("c", "1.0.0..<2.0.0")]);

    let plan = pins::plan(resolver.cache(), &root, Some(&file), PinMode::Resolve)
        .await
        .unwrap();
    assert_eq!(plan.retained.len(), 3);
    assert!(plan.invalidated.is_empty());
    assert!(plan.missing.is_empty());

    let resolution = resolver.resolve(&root, &plan.retained).await.unwrap();
    assert_eq!(resolution.assignments(), plan.retained);
    for name in ["a", "c", "d"] {
        assert_eq!(repo.list_calls(name), 0);
    }
}

#[tokio::test]
async fn changed_requirement_re_resolves_only_the_affected_subgraph() {
    let file = initial_pins().await;
    let (repo, resolver) = resolver(later_repo());
    let root = root(&[("a", ">=1.6.0"), ("c", "1.0.0..<2.0.0")]);

    let plan = pins::plan(resolver.cache(), &root, Some(&file), PinMode::Resolve)
        .await
        .unwrap();
    assert!(plan.invalidated.contains_key(&id("a")));
    assert_eq!(
        plan.retained,
        BTreeMap::from([(id("c"), v("1.0.0")), (id("d"), v("1.0.0"))])
    );

    let resolution = resolver.resolve(&root, &plan.retained).await.unwrap();
    let assignments = resolution.assignments();
    assert_eq!(assignments[&id("a")], v("1.7.0"));
    assert_eq!(assignments[&id("c")], v("1.0.0"));
    // a 1.7.0 still accepts the d pin, so d keeps its version.
    assert_eq!(assignments[&id("d")], v("1.0.0"));
    assert_eq!(repo.list_calls("c"), 0);
    assert_eq!(repo.list_calls("d"), 0);
    assert!(pins::dropped(Some(&file), &resolution).is_empty());

    let updated = pins::pin_file(&resolution);
    let c_before = file.get(&id("c")).unwrap();
    let c_after = updated.get(&id("c")).unwrap();
    assert_eq!(c_before, c_after);
    assert_ne!(
        file.get(&id("a")).unwrap().requirement_hash,
        updated.get(&id("a")).unwrap().requirement_hash
    );
}

#[tokio::test]
async fn locked_mode_rejects_stale_pins() {
    let file = initial_pins().await;
    let (_, resolver) = resolver(later_repo());
    let root = root(&[("a", ">=1.6.0"), ("c", "1.0.0..<2.0.0")]);

    let err = pins::plan(resolver.cache(), &root, Some(&file), PinMode::Locked)
        .await
        .unwrap_err();
    match err {
        ResolveError::PinInvalidated { identity, reason } => {
            assert_eq!(identity, id("a"));
            assert!(reason.contains(">=1.6.0"), "{reason}");
        }
        other => panic!("expected PinInvalidated, got {other:?}"),
    }
}

#[tokio::test]
async fn locked_mode_rejects_missing_pins() {
    let (_, resolver) = resolver(initial_repo());
    let root = root(&[("c", "1.0.0..<2.0.0")]);

    let err = pins::plan(resolver.cache(), &root, None, PinMode::Locked)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::PinInvalidated { ref identity, .. } if *identity == id("c")));
}

#[tokio::test]
async fn locked_mode_accepts_valid_pins() {
    let file = initial_pins().await;
    let (_, resolver) = resolver(later_repo());
    let root = root(&[("a", "1.0.0..<2.0.0"), ("c", "1.0.0..<2.0.0")]);

    let plan = pins::plan(resolver.cache(), &root, Some(&file), PinMode::Locked)
        .await
        .unwrap();
    assert_eq!(plan.retained.len(), 3);
}

#[tokio::test]
async fn update_mode_ignores_pins() {
    let file = initial_pins().await;
    let (_, resolver) = resolver(later_repo());
    let root = root(&[("a", "1.0.0..<2.0.0"), ("c", "1.0.0..<2.0.0")]);

    let plan = pins::plan(resolver.cache(), &root, Some(&file), PinMode::Update)
        .await
        .unwrap();
    assert!(plan.retained.is_empty());

    let resolution = resolver.resolve(&root, &plan.retained).await.unwrap();
    let assignments = resolution.assignments();
    assert_eq!(assignments[&id("a")], v("1.7.0"));
    assert_eq!(assignments[&id("c")], v("1.1.0"));
    assert_eq!(assignments[&id("d")], v("1.2.0"));
}

#[tokio::test]
async fn pins_for_dropped_dependencies_are_dropped() {
    let file = initial_pins().await;
    let (_, resolver) = resolver(later_repo());
    let root = root(&[("c", "1.0.0..<2.0.0")]);

    let plan = pins::plan(resolver.cache(), &root, Some(&file), PinMode::Resolve)
        .await
        .unwrap();
    assert!(plan.invalidated.is_empty());

    let resolution = resolver.resolve(&root, &plan.retained).await.unwrap();
    assert_eq!(
        resolution.assignments(),
        BTreeMap::from([(id("c"), v("1.0.0"))])
    );
    assert_eq!(
        pins::dropped(Some(&file), &resolution),
        BTreeSet::from([id("a"), id("d")])
    );
    assert!(pins::pin_file(&resolution).get(&id("a")).is_none());
}

#[tokio::test]
async fn pins_below_a_stale_pin_move_when_the_new_parent_rejects_them() {
    let file = initial_pins().await;
    let mut repo = later_repo();
    repo.publish("a", "1.8.0", &[("d", ">=1.2.0")]);
    let (repo, resolver) = resolver(repo);
    let root = root(&[("a", ">=1.6.0"), ("c", "1.0.0..<2.0.0")]);

    let plan = pins::plan(resolver.cache(), &root, Some(&file), PinMode::Resolve)
        .await
        .unwrap();
    assert!(plan.invalidated.contains_key(&id("a")));
    assert_eq!(plan.retained.get(&id("d")), Some(&v("1.0.0")));

    let resolution = resolver.resolve(&root, &plan.retained).await.unwrap();
    let assignments = resolution.assignments();
    assert_eq!(assignments[&id("a")], v("1.8.0"));
    assert_eq!(assignments[&id("d")], v("1.2.0"));
    assert_eq!(repo.list_calls("c"), 0);
}

#[tokio::test]
async fn branch_pins_are_never_reused() {
    let mut repo = MockRepo::new();
    repo.branch("a", "main", "def456", &[]);
    let (_, resolver) = resolver(repo);
    let root = root(&[("a", "branch:main")]);
    let file = PinFile::new(vec![PinEntry::new(
        id("a"),
        "https://example.com/a".to_string(),
        &Version::Branch {
            name: "main".into(),
            revision: "abc123".into(),
        },
        String::new(),
    )]);

    let plan = pins::plan(resolver.cache(), &root, Some(&file), PinMode::Resolve)
        .await
        .unwrap();
    assert!(plan.retained.is_empty());

    let resolution = resolver.resolve(&root, &plan.retained).await.unwrap();
    assert_eq!(
        resolution.get(&id("a")).unwrap().version,
        Version::Branch {
            name: "main".into(),
            revision: "def456".into()
        }
    );
}
