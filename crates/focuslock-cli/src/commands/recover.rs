use crate::common::{open_engine, print_json, CliResult};

pub fn run() -> CliResult {
    let engine = open_engine()?;
    let report = engine.recover()?;
    print_json(&report)
}
