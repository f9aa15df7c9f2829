use graft_core::identity::PackageIdentity;

#[test]
fn equivalent_urls_share_an_identity() {
    let forms = [
        "https://github.com/Example/Lib.git",
        "https://github.com/Example/Lib",
        "https://GitHub.com/Example/Lib/",
        "http://github.com/Example/Lib.git",
        "ssh://git@github.com/Example/Lib.git",
        "git@github.com:Example/Lib.git",
    ];
    let expected = PackageIdentity::from_location(forms[0]);
    for form in forms {
        assert_eq!(PackageIdentity::from_location(form), expected, "{form}");
    }
    assert_eq!(expected.as_str(), "github.com/Example/Lib");
}

#[test]
fn distinct_repositories_do_not_collide() {
    let a = PackageIdentity::from_location("https://github.com/example/lib");
    let b = PackageIdentity::from_location("https://github.com/example/Lib");
    let c = PackageIdentity::from_location("https://gitlab.com/example/lib");
    let d = PackageIdentity::from_location("https://github.com/other/lib");
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, d);
}

#[test]
fn local_paths_are_normalized() {
    let a = PackageIdentity::from_location("/repos/./libs/../lib/");
    let b = PackageIdentity::from_location("file:///repos/lib");
    assert_eq!(a.as_str(), "/repos/lib");
    assert_eq!(a, b);
}

#[test]
fn relative_path_differs_from_url_with_same_text() {
    let path = PackageIdentity::from_location("example.com/a");
    let url = PackageIdentity::from_location("https://example.com/a");
    assert_ne!(path, url);
    assert_eq!(path.as_str(), "./example.com/a");
    assert_eq!(path.name(), "a");
    assert_eq!(PackageIdentity::from_location("./example.com/a/"), path);
}

#[test]
fn name_is_last_component() {
    let id = PackageIdentity::from_location("https://example.com/org/json-kit.git");
    assert_eq!(id.name(), "json-kit");
}

#[test]
fn identities_order_by_canonical_key() {
    let mut ids = vec![
        PackageIdentity::from_location("https://example.com/b"),
        PackageIdentity::from_location("https://example.com/a"),
    ];
    ids.sort();
    assert_eq!(ids[0].name(), "a");
}
