use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use anyhow::{Context, Ok, Result};
use insta_cmd::get_cargo_bin;
use tempfile::TempDir;

mod export;
mod generate;
mod init;
mod query;

const BIN_NAME: &str = "spgm";

pub struct CliTest {
    _temp_dir: TempDir,
    project_dir: PathBuf,
}

impl CliTest {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let project_dir = temp_dir.path().canonicalize()?;
        // stop the config file search at the project
        fs::create_dir(project_dir.join(".git"))?;
        Ok(Self {
            _temp_dir: temp_dir,
            project_dir,
        })
    }

    pub fn with_file(path: &str, content: &str) -> Result<Self> {
        let test = Self::new()?;
        test.write_file(path, content)?;
        Ok(test)
    }

    pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let file_path = self.project_dir.join(path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory:{}", parent.display()))?;
        }

        fs::write(&file_path, content)
            .with_context(|| format!("Failed to write file: {}", file_path.display()))?;

        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.project_dir
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(get_cargo_bin(BIN_NAME));
        cmd.current_dir(&self.project_dir);
        cmd.env_clear();
        cmd.env("NO_COLOR", "1"); // Disable colors for consistent test output
        cmd
    }

    pub fn generate_command(&self) -> Command {
        let mut cmd = self.command();
        cmd.arg("generate");
        cmd
    }

    pub fn export_command(&self, kind: &str) -> Command {
        let mut cmd = self.command();
        cmd.arg("export").arg(kind);
        cmd
    }

    pub fn query_command(&self, pattern: &str) -> Command {
        let mut cmd = self.command();
        cmd.arg("query").arg(pattern);
        cmd
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        let file_path = self.project_dir.join(path);
        fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read file: {}", file_path.display()))
    }
}

/// Run `cmd`, returning exit code, stdout and stderr.
pub fn run(cmd: &mut Command) -> Result<(i32, String, String)> {
    let Output { status, stdout, stderr } = cmd.output()?;
    Ok((
        status.code().unwrap_or(-1),
        String::from_utf8(stdout)?,
        String::from_utf8(stderr)?,
    ))
}

/// A small project: one used string with a static definition, one auto
/// string and one translated string.
pub fn sample_project() -> Result<CliTest> {
    let test = CliTest::with_file(
        "src/main.cpp",
        r#"#include "spgm_auto_strings.h"

void setup() {
    Serial.println(SPGM(hello));
    Serial.println(SPGM(wifi_ssid));
    Serial.println(FSPGM(msg, "Message", de: "Nachricht", fr: "Message"));
}
"#,
    )?;
    test.write_file("src/strings.cpp", "PROGMEM_STRING_DEF(hello, \"Hello World\");\n")?;
    Ok(test)
}
