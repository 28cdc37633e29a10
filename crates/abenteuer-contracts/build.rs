use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

const SCHEMA_SUFFIX: &str = ".schema.json";
const DRAFT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";

struct SchemaEntry {
    name: String,
    sha256: String,
    body: String,
}

fn main() {
    let crate_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let workspace_root = crate_dir
        .ancestors()
        .nth(2)
        .expect("workspace root above crates/")
        .to_path_buf();
    let schema_dir = workspace_root.join("contracts/v1");
    println!("cargo:rerun-if-changed={}", schema_dir.display());

    let entries: Vec<SchemaEntry> = schema_files(&schema_dir)
        .into_iter()
        .map(|path| load_schema(&workspace_root, &path))
        .collect();
    if entries.is_empty() {
        panic!("no {SCHEMA_SUFFIX} files under {}", schema_dir.display());
    }

    let set_sha = set_digest(&entries);
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR"));
    fs::write(
        out_dir.join("generated_contracts.rs"),
        render(&entries, &set_sha, &generated_at),
    )
    .expect("write generated_contracts.rs");
}

fn schema_files(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("read {}: {e}", dir.display()))
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(SCHEMA_SUFFIX))
        })
        .collect();
    paths.sort();
    paths
}

fn load_schema(workspace_root: &Path, path: &Path) -> SchemaEntry {
    println!("cargo:rerun-if-changed={}", path.display());
    let body = fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
    let name = path
        .strip_prefix(workspace_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    let schema: Value =
        serde_json::from_str(&body).unwrap_or_else(|e| panic!("{name} is not valid JSON: {e}"));
    if let Err(problem) = check_contract(&name, &schema) {
        panic!("{name}: {problem}");
    }

    SchemaEntry {
        sha256: hex(&Sha256::digest(body.as_bytes())),
        name,
        body,
    }
}

/// Every payload contract is a closed 2020-12 object schema whose `$id` names its file.
fn check_contract(name: &str, schema: &Value) -> Result<(), String> {
    if schema["$schema"] != DRAFT_2020_12 {
        return Err(format!("$schema must be {DRAFT_2020_12}"));
    }
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let id = schema["$id"].as_str().unwrap_or_default();
    if !id.ends_with(&format!("/contracts/v1/{file_name}")) {
        return Err(format!("$id {id:?} does not end with /contracts/v1/{file_name}"));
    }
    if schema["type"] != "object" || schema["additionalProperties"] != false {
        return Err("root must be an object with additionalProperties: false".to_string());
    }
    let properties = schema["properties"]
        .as_object()
        .ok_or_else(|| "root properties missing".to_string())?;
    for required in schema["required"].as_array().into_iter().flatten() {
        let key = required.as_str().unwrap_or_default();
        if !properties.contains_key(key) {
            return Err(format!("required field {key:?} has no property definition"));
        }
    }
    Ok(())
}

fn set_digest(entries: &[SchemaEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.name.as_bytes());
        hasher.update([0]);
        hasher.update(entry.body.as_bytes());
        hasher.update([0]);
    }
    hex(&hasher.finalize())
}

fn render(entries: &[SchemaEntry], set_sha: &str, generated_at: &str) -> String {
    let mut out = format!(
        "pub const GENERATED_CONTRACTS_SET_SHA256: &str = {set_sha:?};\n\
         pub const GENERATED_AT_RFC3339: &str = {generated_at:?};\n\
         pub const GENERATED_CONTRACT_SCHEMAS: &[(&str, &str, &str)] = &[\n"
    );
    for entry in entries {
        out.push_str(&format!(
            "    ({:?}, {:?}, {:?}),\n",
            entry.name, entry.sha256, entry.body
        ));
    }
    out.push_str("];\n");
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
