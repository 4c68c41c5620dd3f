use anyhow::Result;

use crate::{run, sample_project};

#[test]
fn test_query_exact_name() -> Result<()> {
    let test = sample_project()?;
    run(&mut test.generate_command())?;

    let (code, stdout, _) = run(&mut test.query_command("hello"))?;
    assert_eq!(code, 0);
    assert!(stdout.starts_with("hello = \"Hello World\"  (static, used 1x)\n"));
    assert!(stdout.contains("  --> src/main.cpp:4 (SPGM)\n"));
    assert!(stdout.contains("  --> src/strings.cpp:1 (PROGMEM_STRING_DEF)\n"));
    Ok(())
}

#[test]
fn test_query_wildcard() -> Result<()> {
    let test = sample_project()?;
    run(&mut test.generate_command())?;

    let (code, stdout, _) = run(&mut test.query_command("*s*"))?;
    assert_eq!(code, 0);
    assert!(stdout.contains("msg = \"Message\"  (used 1x)\n  de: \"Nachricht\"\n"));
    assert!(stdout.contains("wifi_ssid = \"wifi ssid\"  (auto, used 1x)\n"));
    assert!(!stdout.contains("hello ="));
    Ok(())
}

#[test]
fn test_query_without_match() -> Result<()> {
    let test = sample_project()?;
    run(&mut test.generate_command())?;

    let (code, stdout, stderr) = run(&mut test.query_command("nothing*"))?;
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(stderr.contains("No strings match 'nothing*'"));
    Ok(())
}
