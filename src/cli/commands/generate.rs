use anyhow::Result;

use super::super::args::GenerateCommand;
use super::{CommandKind, CommandResult, CommandSummary};
use crate::core::context::GenerateContext;

pub fn generate(cmd: GenerateCommand) -> Result<CommandResult> {
    let args = &cmd.args;
    let mut ctx = GenerateContext::new(&args.common, &args.output, args.target.as_deref())?;
    let summary = ctx.generate(args.force)?;
    Ok(CommandResult::new(CommandKind::Generate, CommandSummary::Generate(summary)))
}
