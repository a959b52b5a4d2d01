// The binary's command tree, exercised without touching a cache

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("phase-migrate").unwrap();

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("cancel"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_run_requires_owner_and_repo() {
    let mut cmd = Command::cargo_bin("phase-migrate").unwrap();

    cmd.arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--owner"));
}

#[test]
fn test_status_of_unknown_project() {
    let dir = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("phase-migrate").unwrap();

    cmd.current_dir(dir.path())
        .env("PHASE_MIGRATE_CACHE__DIRECTORY", dir.path().join("cache"))
        .args(["status", "--owner", "acme", "--repo", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No phase plan cached"));
}

#[test]
fn test_plan_import_then_status() {
    let dir = TempDir::new().unwrap();
    let plan = dir.path().join("plan.json");
    std::fs::write(
        &plan,
        r#"[{"number": 1, "name": "helpers", "fileList": ["a.js"]},
            {"number": 2, "name": "views", "fileList": ["b.js", "c.js"]}]"#,
    )
    .unwrap();

    Command::cargo_bin("phase-migrate")
        .unwrap()
        .current_dir(dir.path())
        .env("PHASE_MIGRATE_IDENTITY__USER", "tester")
        .args(["plan", "import", "--owner", "acme", "--repo", "web"])
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 phases for acme/web"));

    Command::cargo_bin("phase-migrate")
        .unwrap()
        .current_dir(dir.path())
        .args(["status", "--owner", "acme", "--repo", "web", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"planPhases\": 2"))
        .stdout(predicate::str::contains("\"active\": true"));
}

#[test]
fn test_cache_clear_needs_confirmation() {
    let dir = TempDir::new().unwrap();

    Command::cargo_bin("phase-migrate")
        .unwrap()
        .current_dir(dir.path())
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));
}

#[test]
fn test_export_refuses_unfinished_migration() {
    let dir = TempDir::new().unwrap();
    let plan = dir.path().join("plan.json");
    std::fs::write(&plan, r#"[{"number": 1, "name": "helpers", "fileList": ["a.js"]}]"#).unwrap();

    Command::cargo_bin("phase-migrate")
        .unwrap()
        .current_dir(dir.path())
        .env("PHASE_MIGRATE_IDENTITY__USER", "tester")
        .args(["plan", "import", "--owner", "acme", "--repo", "web"])
        .arg(&plan)
        .assert()
        .success();

    Command::cargo_bin("phase-migrate")
        .unwrap()
        .current_dir(dir.path())
        .env("PHASE_MIGRATE_IDENTITY__USER", "tester")
        .args(["export", "--owner", "acme", "--repo", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("has not finished migrating"));

    Command::cargo_bin("phase-migrate")
        .unwrap()
        .current_dir(dir.path())
        .args(["status", "--owner", "acme", "--repo", "web", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"active\": true"));
}
