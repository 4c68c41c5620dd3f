use anyhow::Result;

use super::super::args::{OutputArgs, QueryCommand};
use super::{CommandKind, CommandResult, CommandSummary, QueryMatch, QuerySummary};
use crate::core::{context::GenerateContext, item::Item, utils::expand_glob_pattern};

pub fn query(cmd: QueryCommand) -> Result<CommandResult> {
    let args = &cmd.args;
    let mut ctx = GenerateContext::new(&args.common, &OutputArgs::default(), None)?;
    ctx.read_database()?;
    let table = ctx.merged_table()?;

    let names = expand_glob_pattern(&cmd.pattern, table.iter().map(|item| &item.name));
    let matches = names
        .iter()
        .filter_map(|name| table.get(name))
        .map(to_match)
        .collect();

    Ok(CommandResult::new(
        CommandKind::Query,
        CommandSummary::Query(QuerySummary {
            pattern: cmd.pattern,
            matches,
        }),
    ))
}

fn to_match(item: &Item) -> QueryMatch {
    QueryMatch {
        name: item.name.clone(),
        value: item.default_value(),
        is_auto: item.value.is_none(),
        is_static: item.is_static(),
        use_counter: item.use_counter(),
        translations: item
            .translations
            .entries()
            .into_iter()
            .map(|entry| (entry.tag_expr(), entry.value))
            .collect(),
        locations: item.locations.iter().map(|location| location.describe()).collect(),
    }
}
