//! `sonicdesk tools`: print the built-in tool catalog.

use anyhow::Result;
use sonicdesk_core::ToolSpec;
use sonicdesk_tools::default_registry;

use crate::terminal_output::{render_table, Column};

pub fn run(json: bool) -> Result<()> {
    let specs = default_registry().describe_all();
    if json {
        println!("{}", serde_json::to_string_pretty(&specs)?);
    } else {
        print!("{}", catalog_table(&specs));
    }
    Ok(())
}

fn catalog_table(specs: &[ToolSpec]) -> String {
    let columns = vec![
        Column::left("Tool"),
        Column::left("Status text"),
        Column::left("Description").max_width(60),
    ];
    let rows: Vec<Vec<String>> = specs
        .iter()
        .map(|s| vec![s.name.clone(), s.short_description.clone(), s.description.clone()])
        .collect();
    render_table(&columns, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_every_tool() {
        let specs = default_registry().describe_all();
        let table = catalog_table(&specs);
        for spec in &specs {
            assert!(table.contains(&spec.name));
        }
        assert!(table.contains("Status text"));
    }
}
