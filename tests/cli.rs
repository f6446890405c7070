use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn fishki(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fishki"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn setup() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config").join("fishki.toml");
    (tmp, config)
}

#[test]
fn test_missing_config_is_created_with_defaults() {
    let (_tmp, config) = setup();

    let out = fishki(&config, &["tree"]);

    assert!(!out.status.success());
    assert!(config.exists());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("wiki path not set"), "{}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config) = setup();
    fs::create_dir_all(config.parent().unwrap()).unwrap();
    fs::write(&config, "[rate_limit]\nmax_requests = 0\n").unwrap();

    let out = fishki(&config, &["tree"]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("max_requests"), "{}", stderr);
}

#[test]
fn test_init_persists_root_and_tree_lists_pages() {
    if !git_available() {
        return;
    }
    let (tmp, config) = setup();
    let wiki = tmp.path().join("mywiki");

    let out = fishki(&config, &["init", wiki.to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(wiki.join(".git").is_dir());
    assert!(fs::read_to_string(&config).unwrap().contains("mywiki"));

    fs::create_dir_all(wiki.join("notes")).unwrap();
    fs::write(wiki.join("notes").join("a.md"), "# A").unwrap();

    let out = fishki(&config, &["tree"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let tree: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(tree["name"], "mywiki");
    assert_eq!(tree["children"][0]["name"], "notes");
    assert_eq!(tree["children"][0]["children"][0]["path"], "notes/a.md");
}

#[test]
fn test_pull_without_remote_fails() {
    if !git_available() {
        return;
    }
    let (tmp, config) = setup();
    let wiki = tmp.path().join("w");
    assert!(fishki(&config, &["init", wiki.to_str().unwrap()]).status.success());

    let out = fishki(&config, &["pull"]);

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("no remote configured"));
}
