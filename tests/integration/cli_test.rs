use anyhow::Result;
use serde_json::json;
use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

fn qtree(args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_qtree")).args(args).output()?)
}

// Two joined tables, selected with a filter on one of them
fn write_document() -> Result<NamedTempFile> {
    let document = json!({
        "tables": [
            {"name": "a", "columns": [
                {"name": "id", "data_type": "Integer"},
                {"name": "x", "data_type": "Integer"}
            ]},
            {"name": "b", "columns": [
                {"name": "id", "data_type": "Integer"},
                {"name": "a_id", "data_type": "Integer"}
            ]}
        ],
        "statement": {
            "columns": [{"Column": {"table": "a", "name": "x"}}],
            "from": [{"Table": {"name": "a"}}, {"Table": {"name": "b"}}],
            "where_clause": {"BinaryOp": {
                "left": {"BinaryOp": {
                    "left": {"Column": {"table": "a", "name": "id"}},
                    "op": "Equals",
                    "right": {"Column": {"table": "b", "name": "a_id"}}
                }},
                "op": "And",
                "right": {"BinaryOp": {
                    "left": {"Column": {"name": "x"}},
                    "op": "Equals",
                    "right": {"Literal": {"Integer": 5}}
                }}
            }}
        }
    });

    let mut file = NamedTempFile::new()?;
    write!(file, "{}", document)?;
    Ok(file)
}

#[test]
fn test_cli_optimize() -> Result<()> {
    let file = write_document()?;
    let path = file.path().to_str().expect("utf-8 path");

    let output = qtree(&["optimize", path])?;
    assert!(output.status.success(), "optimize failed: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.trim(), "SELECT a.x FROM a INNER JOIN b ON a.id = b.a_id WHERE a.x = 5");
    Ok(())
}

#[test]
fn test_cli_flags_override_optimizer() -> Result<()> {
    let file = write_document()?;
    let path = file.path().to_str().expect("utf-8 path");

    let output = qtree(&["optimize", path, "--no-join-formation", "--plan"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Restrict["), "{}", stdout);
    assert!(stdout.contains("CROSS JOIN"), "{}", stdout);
    Ok(())
}

#[test]
fn test_cli_sql_without_optimizing() -> Result<()> {
    let file = write_document()?;
    let path = file.path().to_str().expect("utf-8 path");

    let output = qtree(&["sql", path])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.trim(), "SELECT a.x FROM a CROSS JOIN b WHERE a.id = b.a_id AND a.x = 5");
    Ok(())
}

#[test]
fn test_cli_reports_errors() -> Result<()> {
    let output = qtree(&["optimize", "/nonexistent/query.json"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Failed to read"), "{}", stderr);
    Ok(())
}
