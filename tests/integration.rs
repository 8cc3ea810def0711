use std::path::Path;
use std::process::Command;

fn docweave_cmd(root: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_docweave"));
    cmd.arg("--root").arg(root);
    cmd
}

fn copy_fixture(fixture: &str, into: &Path) {
    for entry in std::fs::read_dir(Path::new("tests/fixtures").join(fixture)).unwrap() {
        let entry = entry.unwrap();
        std::fs::copy(entry.path(), into.join(entry.file_name())).unwrap();
    }
}

#[test]
fn check_passes_on_valid_fixture() {
    let output = docweave_cmd(Path::new("tests/fixtures/valid"))
        .arg("check")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "check failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("1 documents checked"));
}

#[test]
fn check_reports_missing_reference_with_suggestion() {
    let output = docweave_cmd(Path::new("tests/fixtures/broken"))
        .arg("check")
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("section:sec:strat"), "stderr was: {stderr}");
    assert!(
        stderr.contains("did you mean \"section:sec:start\""),
        "stderr was: {stderr}"
    );
}

#[test]
fn files_lists_kinds() {
    let output = docweave_cmd(Path::new("tests/fixtures/valid"))
        .arg("files")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("document\tdoc.tex"));
    assert!(stdout.contains("markdown\tintro.md"));
    assert!(stdout.contains("bibliography\trefs.bib"));
    assert!(stdout.contains("metadata\tmetadata.yml"));
}

#[test]
fn files_filters_by_kind() {
    let output = docweave_cmd(Path::new("tests/fixtures/valid"))
        .args(["files", "--kind", "bibliography"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("refs.bib"));
    assert!(!stdout.contains("intro.md"));
}

#[test]
fn build_substitutes_compiles_and_restores() {
    let dir = tempfile::tempdir().unwrap();
    copy_fixture("valid", dir.path());

    // "Compile" by copying the markdown fragment over the document path, so
    // the test can observe the content that existed while the compiler ran.
    let intro = dir.path().join("intro.md");
    std::fs::write(
        dir.path().join(".docweave.toml"),
        format!("[compile]\ncommand = \"cp\"\nargs = [\"{}\"]\n", intro.display()),
    )
    .unwrap();
    let original = std::fs::read_to_string(&intro).unwrap();

    let output = docweave_cmd(dir.path()).arg("build").output().unwrap();
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // The compiler saw the substituted text.
    let compiled = std::fs::read_to_string(dir.path().join("doc.tex")).unwrap();
    assert!(compiled.contains("version 1.0"), "compiled was: {compiled}");
    assert!(!compiled.contains("${metadata.version}"));

    // The fragment itself was restored to its authored bytes.
    assert_eq!(std::fs::read_to_string(&intro).unwrap(), original);
}

#[test]
fn build_keep_leaves_substituted_sources() {
    let dir = tempfile::tempdir().unwrap();
    copy_fixture("valid", dir.path());
    std::fs::write(
        dir.path().join(".docweave.toml"),
        "[compile]\ncommand = \"true\"\n",
    )
    .unwrap();

    let output = docweave_cmd(dir.path()).args(["build", "--keep"]).output().unwrap();
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let intro = std::fs::read_to_string(dir.path().join("intro.md")).unwrap();
    assert!(intro.contains("version 1.0"), "intro was: {intro}");
    assert!(!intro.contains("${metadata.version}"));
}

#[test]
fn build_fails_cleanly_when_compiler_fails() {
    let dir = tempfile::tempdir().unwrap();
    copy_fixture("valid", dir.path());
    std::fs::write(
        dir.path().join(".docweave.toml"),
        "[compile]\ncommand = \"false\"\n",
    )
    .unwrap();
    let intro = dir.path().join("intro.md");
    let original = std::fs::read_to_string(&intro).unwrap();

    let output = docweave_cmd(dir.path()).arg("build").output().unwrap();
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("failed to compile"),
        "stderr was: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // Restoration happens even when compilation fails.
    assert_eq!(std::fs::read_to_string(&intro).unwrap(), original);
}

#[test]
fn build_without_compile_command_is_an_error() {
    let output = docweave_cmd(Path::new("tests/fixtures/valid"))
        .arg("build")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("no [compile] command"),
        "stderr was: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
