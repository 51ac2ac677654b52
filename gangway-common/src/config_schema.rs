use gangway_common::GangwayConfig;
use schemars::schema_for;

#[allow(clippy::unwrap_used)]
pub fn main() {
    let schema = schema_for!(GangwayConfig);
    println!("{}", serde_json::to_string_pretty(&schema).unwrap());
}
