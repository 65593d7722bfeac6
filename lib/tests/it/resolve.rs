use hindsight_lib::{
    resolve::{anchor_tag_for, oldest_tag, require_anchor_tag, resolve_by_name},
    ContentId, Error, ImageName,
};
use simple_test_case::test_case;

use crate::fake::{layer, FakeEngine};

fn engine() -> FakeEngine {
    FakeEngine::default()
        .image("sha256:app", &["myregistry.example.com/base/app:1.0"], vec![])
        .image("sha256:ubuntu", &["ubuntu:focal", "ubuntu:20.04"], vec![])
        .image("sha256:dangling", &["<none>:<none>"], vec![])
}

#[test_case("myregistry.example.com/base", "app:1.0", "sha256:app"; "fully qualified")]
#[test_case("docker.io/library", "ubuntu:focal", "sha256:ubuntu"; "short form")]
#[test_case("docker.io/library", "ubuntu:20.04", "sha256:ubuntu"; "second tag")]
#[test_case("some.other.registry", "ubuntu:focal", "sha256:ubuntu"; "short form ignores repository")]
#[test_log::test(tokio::test)]
async fn resolves(repository: &str, name: &str, expected: &str) {
    let name = ImageName::builder().repository(repository).name(name).build();
    let id = resolve_by_name(&engine(), &name).await.expect("resolve");
    pretty_assertions::assert_eq!(id, ContentId::from(expected));
}

#[test_case("docker.io/library", "ubuntu:jammy"; "unknown tag")]
#[test_case("docker.io/library", "ubuntu"; "missing tag")]
#[test_case("myregistry.example.com/other", "app:1.0"; "wrong repository")]
#[test_case("docker.io/library", "base/app:1.0"; "partial path")]
#[test_log::test(tokio::test)]
async fn not_found(repository: &str, name: &str) {
    let name = ImageName::builder().repository(repository).name(name).build();
    let err = resolve_by_name(&engine(), &name).await.expect_err("must error");
    assert!(matches!(err, Error::NotFound { reference } if reference == name));
}

#[test_log::test(tokio::test)]
async fn empty_tags_never_match() {
    let engine = FakeEngine::default().image("sha256:empty", &[""], vec![]);
    let name = ImageName::builder().repository("").name("").build();
    let err = resolve_by_name(&engine, &name).await.expect_err("must error");
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test_log::test(tokio::test)]
async fn first_match_wins() {
    let engine = FakeEngine::default()
        .image("sha256:first", &["app:1.0"], vec![])
        .image("sha256:second", &["docker.io/library/app:1.0"], vec![]);
    let name = ImageName::builder().name("app:1.0").build();
    let id = resolve_by_name(&engine, &name).await.expect("resolve");
    pretty_assertions::assert_eq!(id, ContentId::from("sha256:first"));
}

#[test_log::test(tokio::test)]
async fn listing_failure_is_passed_through() {
    let engine = engine().offline();
    let name = ImageName::builder().name("ubuntu:focal").build();
    let err = resolve_by_name(&engine, &name).await.expect_err("must error");
    pretty_assertions::assert_eq!(err.to_string(), FakeEngine::unavailable().to_string());
    assert!(matches!(
        err,
        Error::Upstream(bollard::errors::Error::DockerResponseServerError { status_code: 500, .. })
    ));
}

#[test_log::test(tokio::test)]
async fn upstream_error_is_the_source() {
    let engine = engine().offline();
    let name = ImageName::builder().name("ubuntu:focal").build();
    let err = resolve_by_name(&engine, &name).await.expect_err("must error");

    let source = std::error::Error::source(&err).expect("upstream error is the source");
    pretty_assertions::assert_eq!(source.to_string(), FakeEngine::unavailable().to_string());
}

#[test]
fn resolution_errors_have_no_source() {
    let name = ImageName::builder().name("ubuntu:focal").build();
    let err = Error::NotFound { reference: name };
    assert!(std::error::Error::source(&err).is_none());

    let err = Error::NoAnchor {
        id: ContentId::from("sha256:app"),
    };
    assert!(std::error::Error::source(&err).is_none());
}

#[test_log::test(tokio::test)]
async fn anchor_is_oldest_tagged_layer() {
    let engine = FakeEngine::default().image(
        "sha256:app",
        &["app:2.0"],
        vec![
            layer(&["app:2.0"], "/bin/sh -c #(nop)  CMD [\"app\"]"),
            layer(&[], "/bin/sh -c make install"),
            layer(&["builder:1", "builder:latest"], "/bin/sh -c apt-get install -y make"),
            layer(&[], "/bin/sh -c #(nop)  CMD [\"bash\"]"),
            layer(&["ubuntu:focal"], "/bin/sh -c #(nop) ADD file:abc in / "),
        ],
    );

    let tag = anchor_tag_for(&engine, &ContentId::from("sha256:app"))
        .await
        .expect("anchor");
    pretty_assertions::assert_eq!(tag.as_deref(), Some("ubuntu:focal"));
}

#[test_log::test(tokio::test)]
async fn anchor_uses_first_tag_of_layer() {
    let engine = FakeEngine::default().image(
        "sha256:app",
        &[],
        vec![
            layer(&[], "/bin/sh -c make"),
            layer(&["base:1", "base:latest"], "/bin/sh -c apt-get update"),
        ],
    );

    let tag = require_anchor_tag(&engine, &ContentId::from("sha256:app"))
        .await
        .expect("anchor");
    pretty_assertions::assert_eq!(tag, "base:1");
}

#[test_log::test(tokio::test)]
async fn no_anchor_without_tags() {
    let engine = FakeEngine::default().image(
        "sha256:pulled",
        &["alpine:latest"],
        vec![layer(&[], "/bin/sh -c #(nop)  CMD [\"sh\"]"), layer(&[], "")],
    );
    let id = ContentId::from("sha256:pulled");

    let tag = anchor_tag_for(&engine, &id).await.expect("anchor");
    pretty_assertions::assert_eq!(tag, None);

    let err = require_anchor_tag(&engine, &id).await.expect_err("must error");
    assert!(matches!(err, Error::NoAnchor { id: missing } if missing == id));
}

#[test_log::test(tokio::test)]
async fn history_failure_is_passed_through() {
    let engine = FakeEngine::default();
    let err = anchor_tag_for(&engine, &ContentId::from("sha256:missing"))
        .await
        .expect_err("must error");
    assert!(matches!(
        err,
        Error::Upstream(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. })
    ));
}

#[test]
fn oldest_tag_skips_empty_tags() {
    let history = vec![layer(&["app:1"], ""), layer(&[""], ""), layer(&[], "")];
    pretty_assertions::assert_eq!(oldest_tag(&history), Some("app:1"));
}

#[test]
fn oldest_tag_empty_history() {
    pretty_assertions::assert_eq!(oldest_tag(&[]), None);
}
