use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn adrest() -> Command {
    Command::new(env!("CARGO_BIN_EXE_adrest"))
}

#[test]
fn test_cli_help() {
    let output = adrest().arg("--help").output().expect("Failed to execute process");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("A REST/JSON facade over Active Directory"));
    for flag in ["--port", "--bind-address", "--profiles", "--schema", "--sandbox", "--settings"] {
        assert!(stdout.contains(flag), "missing {} in help", flag);
    }
}

#[test]
fn test_cli_version() {
    let output = adrest().arg("--version").output().expect("Failed to execute process");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("adrest"));
}

#[test]
fn test_cli_invalid_port() {
    let output = adrest()
        .args(["--port", "99999"])
        .output()
        .expect("Failed to execute process");

    assert!(!output.status.success());
}

#[test]
fn test_cli_invalid_bind_address() {
    let output = adrest()
        .args(["--bind-address", "not an address"])
        .output()
        .expect("Failed to execute process");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid bind address"));
}

#[test]
fn test_cli_missing_sandbox_file() {
    let output = adrest()
        .args(["--port", "0", "--sandbox", "/nonexistent/directory.yaml"])
        .output()
        .expect("Failed to execute process");

    assert!(!output.status.success());
}

#[test]
fn test_cli_invalid_schema_file() {
    let temp_dir = TempDir::new().unwrap();
    let schema_path = temp_dir.path().join("schema.yaml");
    fs::write(&schema_path, "attributes:\n  - { oid: \"\", names: [x], syntax: \"1.1\" }\n").unwrap();

    let output = adrest()
        .args(["--port", "0", "--schema", schema_path.to_str().unwrap()])
        .output()
        .expect("Failed to execute process");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("OID cannot be empty"));
}
