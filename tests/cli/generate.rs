use anyhow::Result;

use crate::{CliTest, run, sample_project};

#[test]
fn test_generate_writes_outputs() -> Result<()> {
    let test = sample_project()?;

    let (code, stdout, stderr) = run(&mut test.generate_command())?;
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("Generated 3 strings from 2 source files"));
    assert!(stdout.contains("3 declared, 2 defined, 1 static, 1 auto"));

    let header = test.read_file("include/spgm_auto_strings.h")?;
    assert!(header.starts_with("// AUTO GENERATED FILE - DO NOT MODIFY\n#pragma once\n"));
    assert!(header.contains("#include <spgm_string_generator.h>\n"));
    assert!(header.contains("// src/main.cpp:4 (SPGM), src/strings.cpp:1 (PROGMEM_STRING_DEF)\nPROGMEM_STRING_DECL(hello);\n"));
    assert!(header.contains("PROGMEM_STRING_DECL(wifi_ssid);\n"));
    assert!(header.contains("PROGMEM_STRING_DECL(msg);\n"));

    let definitions = test.read_file("src/spgm_auto_strings.cpp")?;
    assert!(definitions.contains("#include \"spgm_auto_strings.h\"\n"));
    assert!(definitions.contains("PROGMEM_STRING_DEF(wifi_ssid, \"wifi ssid\");"));
    assert!(definitions.contains("PROGMEM_STRING_DEF(msg, \"Message\");"));
    // defined in code
    assert!(!definitions.contains("PROGMEM_STRING_DEF(hello"));

    let statics = test.read_file("include/spgm_static_strings.h")?;
    assert!(statics.contains("\nPROGMEM_STRING_DEF(hello, \"Hello World\");\n"));
    assert!(!statics.contains("// PROGMEM_STRING_DEF"));

    let auto = test.read_file("include/spgm_auto_defined.h")?;
    assert!(auto.contains("AUTO_STRING_DEF(wifi_ssid, \"wifi ssid\")\n"));

    let config = test.read_file("spgm_strings.json")?;
    assert!(config.contains("\"Nachricht\""));

    assert!(test.root().join(".spgm").is_dir());
    Ok(())
}

#[test]
fn test_second_run_detects_no_changes() -> Result<()> {
    let test = sample_project()?;
    let (code, _, _) = run(&mut test.generate_command())?;
    assert_eq!(code, 0);

    let (code, stdout, _) = run(&mut test.generate_command())?;
    assert_eq!(code, 0);
    assert!(stdout.contains("No changes detected (use --force to regenerate)"));

    let (code, stdout, _) = run(test.generate_command().arg("--force"))?;
    assert_eq!(code, 0);
    assert!(stdout.contains("Generated 3 strings"));
    Ok(())
}

#[test]
fn test_repeated_runs_produce_identical_outputs() -> Result<()> {
    let test = sample_project()?;
    let outputs = [
        "include/spgm_auto_strings.h",
        "src/spgm_auto_strings.cpp",
        "include/spgm_static_strings.h",
        "include/spgm_auto_defined.h",
        "spgm_strings.json",
    ];
    let (code, _, stderr) = run(&mut test.generate_command())?;
    assert_eq!(code, 0, "stderr: {stderr}");
    let first: Vec<String> = outputs.iter().map(|path| test.read_file(path)).collect::<Result<_>>()?;

    for _ in 0..2 {
        let (code, stdout, stderr) = run(test.generate_command().arg("--force"))?;
        assert_eq!(code, 0, "stderr: {stderr}");
        assert!(stdout.contains("from 2 source files"));
    }
    let last: Vec<String> = outputs.iter().map(|path| test.read_file(path)).collect::<Result<_>>()?;
    assert_eq!(first, last);
    assert!(!last[0].contains("src/spgm_auto_strings.cpp"));
    Ok(())
}

#[test]
fn test_new_string_is_picked_up() -> Result<()> {
    let test = sample_project()?;
    run(&mut test.generate_command())?;

    test.write_file("src/extra.cpp", "void f() { SPGM(goodbye); }\n")?;
    let (code, stdout, _) = run(&mut test.generate_command())?;
    assert_eq!(code, 0);
    assert!(stdout.contains("Generated 4 strings from 3 source files"));
    assert!(test.read_file("include/spgm_auto_strings.h")?.contains("PROGMEM_STRING_DECL(goodbye);"));
    Ok(())
}

#[test]
fn test_output_language() -> Result<()> {
    let test = sample_project()?;
    let (code, _, _) = run(test.generate_command().args(["--output-language", "de,default"]))?;
    assert_eq!(code, 0);

    let definitions = test.read_file("src/spgm_auto_strings.cpp")?;
    let line = definitions
        .lines()
        .find(|line| line.contains("(msg,"))
        .unwrap_or_default();
    assert!(line.starts_with("PROGMEM_STRING_DEF(msg, \"Nachricht\");"));
    assert!(line.ends_with(" // de"));
    Ok(())
}

#[test]
fn test_defines_select_branches() -> Result<()> {
    let test = CliTest::with_file(
        "src/main.c",
        "#if HAVE_WIFI\nvoid w() { SPGM(wifi); }\n#else\nvoid n() { SPGM(no_wifi); }\n#endif\n",
    )?;

    let (code, _, _) = run(test.generate_command().args(["-D", "HAVE_WIFI"]))?;
    assert_eq!(code, 0);
    let header = test.read_file("include/spgm_auto_strings.h")?;
    assert!(header.contains("PROGMEM_STRING_DECL(wifi);"));
    assert!(!header.contains("no_wifi"));
    Ok(())
}

#[test]
fn test_source_excludes_from_config() -> Result<()> {
    let test = sample_project()?;
    test.write_file("src/vendor/lib.c", "void v() { SPGM(vendor_string); }\n")?;
    test.write_file(".spgmrc.json", r#"{ "sourceExcludes": ["src/vendor"] }"#)?;

    let (code, _, stderr) = run(&mut test.generate_command())?;
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(!test.read_file("include/spgm_auto_strings.h")?.contains("vendor_string"));
    Ok(())
}

#[test]
fn test_conflicting_definitions_fail() -> Result<()> {
    let test = CliTest::with_file("src/a.c", "PROGMEM_STRING_DEF(hello, \"Hello\");\n")?;
    test.write_file("src/b.c", "// other\nPROGMEM_STRING_DEF(hello, \"Hi\");\n")?;

    let (code, stdout, stderr) = run(&mut test.generate_command())?;
    assert_eq!(code, 2);
    assert!(stdout.is_empty());
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("hello"));
    assert!(stderr.contains("-->"));
    assert!(!test.root().join("include/spgm_auto_strings.h").exists());
    Ok(())
}

#[test]
fn test_missing_value_fails() -> Result<()> {
    let test = CliTest::with_file("src/a.c", "AUTO_INIT_SPGM(hello);\n")?;

    let (code, _, stderr) = run(&mut test.generate_command())?;
    assert_eq!(code, 2);
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("src/a.c:1"));
    Ok(())
}
