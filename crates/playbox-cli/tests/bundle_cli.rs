//! Integration tests for `playbox bundle`.
//!
//! These tests verify:
//! - the document is printed or written with the bundle inlined
//! - `--json` output is valid JSON with `schema_version` and `ok`
//! - build errors carry SCREAMING_SNAKE_CASE codes and the offending module

use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn playbox() -> Command {
    Command::new(env!("CARGO_BIN_EXE_playbox"))
}

fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn test_bundle_prints_document() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.ts", "let x: number = 1; console.log(x)");

    let output = playbox().arg("bundle").arg(dir.path()).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("<script type=\"module\">"));
    assert!(stdout.contains("console.log(x)"));
    assert!(!stdout.contains(": number"));
    assert!(!stdout.contains("<!-- __script__ -->"));
}

#[test]
fn test_bundle_json_summary() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/app.ts", "import './style.css';\nexport const n: number = 2;");
    write(dir.path(), "src/style.css", "body{color:red}");
    write(dir.path(), "playbox.json", r#"{"entry": "/src/app.ts"}"#);

    let output = playbox()
        .args(["--json", "bundle", "--cwd"])
        .arg(dir.path())
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");

    assert_eq!(json["ok"], true);
    assert_eq!(json["schema_version"], 1);
    assert_eq!(json["entry"], "/src/app.ts");
    assert_eq!(json["files"], 3);
    let document = json["document"].as_str().unwrap();
    assert!(document.contains("style.textContent = `body{color:red}`;"));
}

#[test]
fn test_bundle_writes_outfile() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.ts", "console.log('out')");
    write(dir.path(), "index.html", "<main><!-- __script__ --></main>");
    let out = dir.path().join("dist/preview.html");

    let output = playbox()
        .arg("bundle")
        .arg(dir.path())
        .arg("-o")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let document = std::fs::read_to_string(&out).unwrap();
    assert!(document.starts_with("<main><script type=\"module\">"));
    assert!(document.contains("console.log('out')"));
}

#[test]
fn test_bundle_error_codes() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.ts", "import { a } from './missing';");

    let output = playbox()
        .args(["--json", "bundle"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["ok"], false);
    let code = json["error"]["code"].as_str().unwrap();
    assert_eq!(code, "RESOLUTION_ERROR");
    assert!(code.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
    assert_eq!(json["error"]["module_id"], "/main.ts");
}

#[test]
fn test_bundle_data_uri() {
    let dir = tempdir().unwrap();
    write(dir.path(), "main.ts", "1+1");

    let output = playbox()
        .arg("bundle")
        .arg(dir.path())
        .arg("--data-uri")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("data:text/html;charset=utf-8;base64,"));
}

#[test]
fn test_version_json() {
    let output = playbox().args(["--json", "version"]).output().unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["name"], "playbox");
    assert!(json["version"].is_string());
}
