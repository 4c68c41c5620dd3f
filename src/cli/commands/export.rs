use anyhow::Result;

use super::super::args::{ExportCommand, ExportKind, OutputArgs};
use super::{CommandKind, CommandResult, CommandSummary, ExportSummary};
use crate::core::{
    ItemOrigin,
    context::GenerateContext,
    item::Item,
    output::render_auto_init,
};

pub fn export(cmd: ExportCommand) -> Result<CommandResult> {
    let args = &cmd.args;
    let output = OutputArgs {
        locations_one_per_line: args.locations_one_per_line,
        ..OutputArgs::default()
    };
    let mut ctx = GenerateContext::new(&args.common, &output, None)?;
    ctx.read_database()?;
    let one_per_line = ctx.config.locations_one_per_line;

    let summary = match cmd.kind {
        ExportKind::Config => {
            let items = ctx.config_items()?;
            summarize(&items, one_per_line)
        }
        kind => {
            let table = ctx.merged_table()?;
            let items: Vec<&Item> = match kind {
                ExportKind::Auto => table.auto_defined(ctx.config.add_unused),
                ExportKind::Source => table
                    .iter()
                    .filter(|item| item.origin == ItemOrigin::FromSource)
                    .collect(),
                _ => table.iter().collect(),
            };
            summarize(items, one_per_line)
        }
    };

    Ok(CommandResult::new(CommandKind::Export, CommandSummary::Export(summary)))
}

fn summarize<'a>(items: impl IntoIterator<Item = &'a Item>, one_per_line: bool) -> ExportSummary {
    let items: Vec<&Item> = items.into_iter().collect();
    ExportSummary {
        count: items.len(),
        block: render_auto_init(items, one_per_line),
    }
}
