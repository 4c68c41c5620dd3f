use crate::core::context::GenerateSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Generate,
    Export,
    Query,
    Init,
}

#[derive(Debug)]
pub enum CommandSummary {
    Generate(GenerateSummary),
    Export(ExportSummary),
    Query(QuerySummary),
    Init(InitSummary),
}

#[derive(Debug)]
pub struct ExportSummary {
    /// The `FLASH_STRING_GENERATOR_AUTO_INIT(...)` block.
    pub block: String,
    pub count: usize,
}

/// One name found by `query`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch {
    pub name: String,
    pub value: String,
    pub is_auto: bool,
    pub is_static: bool,
    pub use_counter: usize,
    /// `(tags, value)`, e.g. `("at;de", "Hallo")`.
    pub translations: Vec<(String, String)>,
    pub locations: Vec<String>,
}

#[derive(Debug)]
pub struct QuerySummary {
    pub pattern: String,
    pub matches: Vec<QueryMatch>,
}

#[derive(Debug)]
pub struct InitSummary {
    pub created: bool,
    pub error: Option<String>,
}

/// Result of running spgm commands
pub struct CommandResult {
    pub kind: CommandKind,
    pub summary: CommandSummary,
    pub error_count: usize,
}

impl CommandResult {
    pub fn new(kind: CommandKind, summary: CommandSummary) -> Self {
        let error_count = match &summary {
            CommandSummary::Query(query) if query.matches.is_empty() => 1,
            CommandSummary::Init(init) if init.error.is_some() => 1,
            _ => 0,
        };
        Self {
            kind,
            summary,
            error_count,
        }
    }
}
