use framebridge_frame::CorrelationId;
use serde::Serialize;

use crate::cmd::NewIdArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{new_table, print_json, OutputFormat};

#[derive(Serialize)]
struct IdsOutput {
    schema_id: &'static str,
    ids: Vec<String>,
}

pub fn run(args: NewIdArgs, format: OutputFormat) -> CliResult<i32> {
    let ids: Vec<String> = (0..args.count)
        .map(|_| CorrelationId::generate().to_string())
        .collect();

    match format {
        OutputFormat::Json => print_json(&IdsOutput {
            schema_id: "https://schemas.3leaps.dev/framebridge/cli/v1/correlation-ids.schema.json",
            ids,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "ID"]);
            for (index, id) in ids.iter().enumerate() {
                table.add_row(vec![index.to_string(), id.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for id in ids {
                println!("{id}");
            }
        }
    }
    Ok(SUCCESS)
}
