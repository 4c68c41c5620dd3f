use anyhow::{Context, Result};
use insta::assert_snapshot;
use serde_json::Value;

use crate::{CliTest, run};

/// Validates config file structure and default values.
fn assert_config_content(content: &str) -> Result<()> {
    let parsed: Value = serde_json::from_str(content).context("Config should be valid JSON")?;

    assert_eq!(parsed["sourceDirs"], serde_json::json!(["src"]));
    assert_eq!(parsed["declarationFile"], "include/spgm_auto_strings.h");
    assert_eq!(parsed["outputLanguage"], serde_json::json!(["default"]));
    assert!(parsed.get("sourceExcludes").is_some());

    // 2-space indentation, trailing newline
    assert!(content.contains("\n  \"sourceDirs\""));
    assert!(content.ends_with("}\n"));

    Ok(())
}

#[test]
fn test_init_creates_config() -> Result<()> {
    let test = CliTest::new()?;

    let (code, stdout, stderr) = run(test.command().arg("init"))?;
    assert_eq!(code, 0);
    assert_snapshot!(stdout, @"✓ Created .spgmrc.json");
    assert!(stderr.is_empty());

    let content = test.read_file(".spgmrc.json")?;
    assert_config_content(&content)?;

    Ok(())
}

#[test]
fn test_init_fails_when_config_exists() -> Result<()> {
    let test = CliTest::with_file(".spgmrc.json", "{}")?;

    let (code, stdout, stderr) = run(test.command().arg("init"))?;
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert_snapshot!(stderr, @"error: .spgmrc.json already exists");

    // Verify original content is preserved
    assert_eq!(test.read_file(".spgmrc.json")?, "{}");

    Ok(())
}

#[test]
fn test_generate_uses_initialized_config() -> Result<()> {
    let test = CliTest::with_file("src/main.cpp", "void f() { SPGM(hello); }\n")?;
    run(test.command().arg("init"))?;

    let (code, _, stderr) = run(&mut test.generate_command())?;
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(test.read_file("include/spgm_auto_strings.h")?.contains("PROGMEM_STRING_DECL(hello);"));
    Ok(())
}
