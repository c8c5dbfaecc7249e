pub mod config;
pub mod ddl;
pub mod error;
pub mod ident;
pub mod model;
pub mod query;
pub mod schema;
pub mod service;
pub mod store;

use wasm_bindgen::prelude::*;

use config::{CompilerOptions, StorageLayout};
use ddl::{SchemaCompiler, StorageDefinition};
use error::CompileError;
use query::{CompiledQuery, QueryBuilderValue, QueryCompiler};
use schema::SchemaDefinition;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Compile a schema definition given as JSON.
pub fn compile_table_json(
    name: &str,
    definition_json: &str,
    options: CompilerOptions,
) -> Result<StorageDefinition, CompileError> {
    let definition = SchemaDefinition::from_json(definition_json)?;
    SchemaCompiler::new(options, StorageLayout::default()).compile_table(name, &definition)
}

/// Compile a rule tree given as JSON.
pub fn compile_query_json(query_json: &str, options: CompilerOptions) -> Result<CompiledQuery, CompileError> {
    let query = QueryBuilderValue::from_json(query_json)?;
    QueryCompiler::new(options).compile_query(&query)
}

fn options(strict: Option<bool>) -> CompilerOptions {
    CompilerOptions {
        strict: strict.unwrap_or(false),
        ..CompilerOptions::default()
    }
}

/// Compile a schema to `{ tableName, sqlDefinition }`
#[wasm_bindgen(js_name = "compileTable")]
pub fn compile_table_js(name: &str, definition_json: &str, strict: Option<bool>) -> Result<js_sys::Object, String> {
    let storage = compile_table_json(name, definition_json, options(strict)).map_err(|e| e.to_string())?;

    let result = js_sys::Object::new();
    set_property(&result, "tableName", &JsValue::from_str(&storage.table_name))?;
    set_property(&result, "sqlDefinition", &JsValue::from_str(&storage.to_sql()))?;
    Ok(result)
}

/// Compile a report filter to a SQL predicate
#[wasm_bindgen(js_name = "compileQuery")]
pub fn compile_query_js(query_json: &str, strict: Option<bool>) -> Result<String, String> {
    compile_query_json(query_json, options(strict))
        .map(|compiled| compiled.to_sql())
        .map_err(|e| e.to_string())
}

fn set_property(target: &js_sys::Object, key: &str, value: &JsValue) -> Result<(), String> {
    js_sys::Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|e| format!("Failed to set {key}: {e:?}"))
}
