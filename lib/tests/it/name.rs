use hindsight_lib::{ContentId, ImageName};
use simple_test_case::test_case;

#[test_case("docker.io/library/ubuntu:focal", ImageName::builder().repository("docker.io/library").name("ubuntu:focal").build(); "docker.io/library/ubuntu:focal")]
#[test_case("myregistry.example.com/base/app:1.0", ImageName::builder().repository("myregistry.example.com/base").name("app:1.0").build(); "myregistry.example.com/base/app:1.0")]
#[test_case("localhost:5000/app", ImageName::builder().repository("localhost:5000").name("app").build(); "localhost:5000/app")]
#[test]
fn parse(input: &str, expected: ImageName) {
    let name = input.parse::<ImageName>().unwrap();
    pretty_assertions::assert_eq!(name, expected);
}

#[test_case("ubuntu"; "no repository")]
#[test_case("/ubuntu:focal"; "empty repository")]
#[test_case("docker.io/library/"; "empty name")]
#[test]
fn invalid_names(input: &str) {
    let _ = input.parse::<ImageName>().expect_err("must error");
}

#[test]
fn default_repository() {
    let name = ImageName::builder().name("ubuntu:focal").build();
    pretty_assertions::assert_eq!(name.qualified(), "docker.io/library/ubuntu:focal");
    pretty_assertions::assert_eq!(name.host(), "docker.io");
}

#[test_case("ubuntu:focal", Some("focal"), "ubuntu"; "tagged")]
#[test_case("ubuntu", None, "ubuntu"; "untagged")]
#[test_case("nate/dockviz:latest", Some("latest"), "nate/dockviz"; "nested")]
#[test]
fn tag(name: &str, tag: Option<&str>, untagged: &str) {
    let name = ImageName::builder().name(name).build();
    pretty_assertions::assert_eq!(name.tag(), tag);
    pretty_assertions::assert_eq!(name.untagged(), untagged);
}

#[test_case("ubuntu", "ubuntu:latest"; "untagged")]
#[test_case("ubuntu:focal", "ubuntu:focal"; "tagged")]
#[test_case("nate/dockviz", "nate/dockviz:latest"; "nested")]
#[test]
fn or_latest(name: &str, expected: &str) {
    let name = ImageName::builder()
        .repository("ghcr.io/user")
        .name(name)
        .build()
        .or_latest();
    pretty_assertions::assert_eq!(name.name, expected);
    pretty_assertions::assert_eq!(name.repository, "ghcr.io/user");
}

#[test]
fn host_without_namespace() {
    let name = ImageName::builder().repository("quay.io").name("app").build();
    pretty_assertions::assert_eq!(name.host(), "quay.io");
}

#[test]
fn content_id() {
    let id = " sha256:0a1b2c ".parse::<ContentId>().unwrap();
    pretty_assertions::assert_eq!(id.as_str(), "sha256:0a1b2c");
    pretty_assertions::assert_eq!(id.to_string(), "sha256:0a1b2c");

    let _ = "  ".parse::<ContentId>().expect_err("must error");
}
