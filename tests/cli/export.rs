use anyhow::Result;

use crate::{run, sample_project};

#[test]
fn test_export_auto() -> Result<()> {
    let test = sample_project()?;
    run(&mut test.generate_command())?;

    let (code, stdout, _) = run(&mut test.export_command("auto"))?;
    assert_eq!(code, 0);
    assert!(stdout.starts_with("FLASH_STRING_GENERATOR_AUTO_INIT(\n"));
    assert!(stdout.contains("    // src/main.cpp:5 (SPGM)\n    AUTO_STRING_DEF(wifi_ssid, \"wifi ssid\")\n"));
    assert!(!stdout.contains("AUTO_STRING_DEF(hello"));
    assert!(stdout.ends_with(");\n"));
    Ok(())
}

#[test]
fn test_export_all_includes_translations() -> Result<()> {
    let test = sample_project()?;
    run(&mut test.generate_command())?;

    let (code, stdout, _) = run(&mut test.export_command("all"))?;
    assert_eq!(code, 0);
    assert!(stdout.contains("AUTO_STRING_DEF(hello, \"Hello World\")"));
    assert!(stdout.contains("AUTO_STRING_DEF(msg, \"Message\", de: \"Nachricht\", fr: \"Message\")"));
    Ok(())
}

#[test]
fn test_export_config() -> Result<()> {
    let test = sample_project()?;
    test.write_file(
        "spgm_strings.json",
        r#"{ "wifi_ssid": { "default": "WiFi SSID" } }"#,
    )?;

    let (code, stdout, stderr) = run(&mut test.export_command("config"))?;
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("AUTO_STRING_DEF(wifi_ssid, \"WiFi SSID\")"));
    assert!(!stdout.contains("hello"));
    Ok(())
}

#[test]
fn test_export_one_location_per_line() -> Result<()> {
    let test = sample_project()?;
    run(&mut test.generate_command())?;

    let (code, stdout, _) = run(test.export_command("source").arg("--locations-one-per-line"))?;
    assert_eq!(code, 0);
    assert!(stdout.contains(
        "    // src/main.cpp:4 (SPGM)\n    // src/strings.cpp:1 (PROGMEM_STRING_DEF)\n    AUTO_STRING_DEF(hello, \"Hello World\")\n"
    ));
    Ok(())
}
