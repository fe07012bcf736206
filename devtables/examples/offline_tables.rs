//! Offline tables example
//!
//! This example runs the whole engine against canned device replies: an
//! operational table over XML, a CLI text table and a writable
//! configuration resource whose change document is printed instead of sent.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example offline_tables
//! ```
//!
//! With your own catalog (tables named as below must exist in it):
//! ```bash
//! RUST_LOG=debug cargo run --example offline_tables -- --catalog tables.yml
//! ```

use std::env;
use std::sync::Arc;

use devtables::{
    ChangeDocument, CollaboratorError, ConfigResource, Document, DocumentSink, FetchRequest,
    FetchResult, GetArgs, SchemaCatalog, TableSchema, WriteOptions, WriteResult,
};

const CATALOG: &str = r#"
PhyPortTable:
  rpc: get-interface-information
  args: { extensive: true }
  args_key: interface_name
  item: physical-interface
  view: PhyPortView

PhyPortView:
  groups:
    mac_stats: ethernet-mac-statistics
  fields:
    oper: oper-status
    mtu: { mtu: int }
    running: { if-device-flags/ifdf-running: flag }
    units: logical-interface/name
  fields_mac_stats:
    rx_bytes: { input-bytes: int }

LinkStatsTable:
  command: show ppp statistics
  title: PPP LINK STATISTICS
  key: Name
  columns:
    name: Name
    status: Status
    errors: Errors

UserTable:
  get: system/login/user
  set: system/login/user
  view: UserView

UserView:
  fields:
    name: name
    class: { class: { enum: [super-user, read-only, operator] } }
    tags: tag
"#;

const INTERFACES: &str = r#"
<interface-information>
  <physical-interface>
    <name>ge-0/0/0</name>
    <oper-status>up</oper-status>
    <mtu>1514</mtu>
    <if-device-flags><ifdf-running/></if-device-flags>
    <ethernet-mac-statistics><input-bytes>48213</input-bytes></ethernet-mac-statistics>
    <logical-interface><name>ge-0/0/0.0</name></logical-interface>
  </physical-interface>
  <physical-interface>
    <name>ge-0/0/1</name>
    <oper-status>down</oper-status>
    <mtu>9192</mtu>
  </physical-interface>
</interface-information>
"#;

const PPP_STATS: &str = "\
PPP LINK STATISTICS
Name        Status      Errors
----------  ----------  ------
pp0.1       up          0
pp0.2       down        14
Total       2 links     n/a
";

const USERS: &str = r#"
<configuration><system><login>
  <user><name>ops</name><class>operator</class><tag>noc</tag><tag>lab</tag></user>
</login></system></configuration>
"#;

/// Answers every request from the canned replies above.
fn canned(request: &FetchRequest) -> Result<FetchResult, CollaboratorError> {
    let reply = match request.command.as_str() {
        "get-interface-information" => INTERFACES,
        "show ppp statistics" => return Ok(FetchResult::Text(PPP_STATS.to_string())),
        "system/login/user" => USERS,
        other => {
            return Err(CollaboratorError::Rpc {
                command: other.to_string(),
                message: "no canned reply".to_string(),
            });
        }
    };
    let doc = Document::parse(reply).map_err(|e| CollaboratorError::Other(Box::new(e)))?;
    Ok(FetchResult::Document(doc))
}

/// Prints change documents instead of committing them.
struct PrintSink;

impl DocumentSink for PrintSink {
    fn write(
        &self,
        change: &ChangeDocument,
        options: &WriteOptions,
    ) -> Result<WriteResult, CollaboratorError> {
        println!("  [{:?}] {}", options.action, change.to_xml());
        Ok(WriteResult {
            committed: true,
            message: None,
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let catalog = match catalog_path() {
        Some(path) => SchemaCatalog::from_path(path)?,
        None => SchemaCatalog::from_yaml_str(CATALOG)?,
    };
    println!("=== devtables offline example ===\n");
    println!("Tables: {:?}", catalog.table_names().collect::<Vec<_>>());
    println!("Views:  {:?}\n", catalog.view_names().collect::<Vec<_>>());

    let source = Arc::new(canned);

    // --- Operational table ---
    println!("--- PhyPortTable ---");
    let mut ports = catalog.table("PhyPortTable", source.clone())?;
    ports.get(GetArgs::new())?;
    for entry in ports.iter()? {
        let (key, port) = entry?;
        println!(
            "  {:<10} oper={:?} mtu={:?} running={:?} rx_bytes={:?}",
            key.to_string(),
            port.get("oper")?,
            port.get("mtu")?,
            port.get("running")?,
            port.get("rx_bytes")?,
        );
    }
    println!("  JSON: {}\n", serde_json::to_string_pretty(&ports.to_json()?)?);

    // --- CLI text table ---
    println!("--- LinkStatsTable ---");
    let mut links = catalog.table("LinkStatsTable", source.clone())?;
    links.get(GetArgs::new())?;
    for entry in links.iter()? {
        let (key, link) = entry?;
        println!("  {} -> {:?}", key, link.items()?);
    }
    println!();

    // --- Writable resource ---
    println!("--- UserTable ---");
    let schema: Arc<TableSchema> = catalog.table_schema("UserTable")?;
    let mut user = ConfigResource::new(schema, "ops", source, Arc::new(PrintSink))?;
    user.read()?;
    println!("  current tags: {:?}", user.current("tags"));

    println!("  write with no changes: {}", user.write()?);
    user.set("class", "read-only")?;
    user.set("tags", vec!["noc", "oncall"])?;
    println!("  write:");
    println!("  committed: {}", user.write()?);

    Ok(())
}

fn catalog_path() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--catalog" {
            return args.next();
        }
    }
    None
}
