use press_sync::load_config::{credentials_from_env, load_config, APP_PASSWORD_ENV, USERNAME_ENV};
use press_sync_core::hash::HashAlgorithm;
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

fn clear_credentials() {
    env::remove_var(USERNAME_ENV);
    env::remove_var(APP_PASSWORD_ENV);
}

/// A full config plus credentials from the environment.
#[test]
#[serial]
fn loads_site_content_and_env_credentials() {
    let file = config_file(
        r#"
site:
  host: blog.example.com
  app_name: nightly-publisher
  debug: true
  page_size: 50
  max_pages: 20
  hash_algorithm: sha256
content:
  posts_dir: ./posts
  media_dir: ./media
"#,
    );
    env::set_var(USERNAME_ENV, "editor");
    env::set_var(APP_PASSWORD_ENV, "abcd efgh ijkl mnop");

    let loaded = load_config(file.path()).expect("Config should load");
    clear_credentials();

    let site = &loaded.config.site;
    assert_eq!(site.host, "blog.example.com");
    assert_eq!(site.app_name, "nightly-publisher");
    assert!(site.debug);
    assert_eq!(site.page_size, 50);
    assert_eq!(site.max_pages, 20);
    assert_eq!(site.hash_algorithm, HashAlgorithm::Sha256);
    assert_eq!(loaded.config.content.posts_dir, Some(PathBuf::from("./posts")));
    assert_eq!(loaded.config.content.media_dir, Some(PathBuf::from("./media")));

    let creds = loaded.credentials.expect("credentials from env");
    assert_eq!(creds.username, "editor");
    assert_eq!(creds.app_password, "abcd efgh ijkl mnop");
}

#[test]
#[serial]
fn credentials_are_optional() {
    clear_credentials();
    let file = config_file("site:\n  host: blog.example.com\n");
    let loaded = load_config(file.path()).expect("Config should load");
    assert!(loaded.credentials.is_none());
    assert!(loaded.config.content.posts_dir.is_none());
}

#[test]
#[serial]
fn half_set_credentials_are_ignored() {
    clear_credentials();
    env::set_var(USERNAME_ENV, "editor");
    assert!(credentials_from_env().is_none());
    env::set_var(APP_PASSWORD_ENV, "   ");
    assert!(credentials_from_env().is_none());
    clear_credentials();
}

#[test]
#[serial]
fn missing_site_section_fails() {
    let file = config_file("content:\n  posts_dir: ./posts\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
#[serial]
fn empty_host_fails() {
    let file = config_file("site:\n  host: \"  \"\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("site.host"));
}

#[test]
#[serial]
fn zero_page_size_fails() {
    let file = config_file("site:\n  host: h\n  page_size: 0\n");
    assert!(load_config(file.path()).is_err());
}
