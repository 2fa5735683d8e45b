//! Protocol document loading, validation, and method compilation.
//!
//! The loader accepts a file path, a JSON string, or a base64-wrapped
//! JSON string (a pass-through transport with no extra semantics). Every
//! method body and return expression is compiled at load time, so syntax
//! errors, writes to undeclared state, and emits of undeclared events are
//! load failures rather than runtime surprises.

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::abi::Abi;
use super::{
    Cpl, EventDecl, LoadError, MethodDecl, Protocol, SchemaError, VarDecl, DEPLOY_OP, NAMESPACE,
};
use crate::engine::ast::{Expr, Stmt, VarRef};
use crate::engine::parser::{parse_body, parse_expression};

/// A method compiled to its AST, ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    /// Ordered parameter names.
    pub params: Vec<String>,
    /// Compiled body statements.
    pub body: Vec<Stmt>,
    /// Compiled return expression, when declared.
    pub returns: Option<Expr>,
}

impl Protocol {
    /// Load a protocol document from a file.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Load a protocol document from a JSON string.
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        from_value(&value)
    }

    /// Load a protocol document from a base64-wrapped JSON string.
    pub fn from_base64(text: &str) -> Result<Self, LoadError> {
        let bytes = BASE64
            .decode(text.trim())
            .map_err(|e| LoadError::Base64(e.to_string()))?;
        let json = String::from_utf8(bytes).map_err(|e| LoadError::Base64(e.to_string()))?;
        Self::from_json(&json)
    }

    /// Export the document back to its JSON envelope.
    pub fn export_to_json(&self) -> serde_json::Value {
        let mut state = serde_json::Map::new();
        for (name, var) in &self.cpl.state {
            state.insert(
                name.clone(),
                serde_json::json!({"type": var.type_name, "default": var.default}),
            );
        }

        let mut methods = serde_json::Map::new();
        for (name, method) in &self.cpl.methods {
            let mut entry = serde_json::Map::new();
            entry.insert("params".to_string(), serde_json::json!(method.params));
            if !method.body.is_empty() {
                entry.insert("logic".to_string(), serde_json::json!(method.body));
            }
            if let Some(returns) = &method.returns {
                entry.insert("returns".to_string(), serde_json::json!(returns));
            }
            methods.insert(name.clone(), serde_json::Value::Object(entry));
        }

        let mut events = serde_json::Map::new();
        for (name, event) in &self.cpl.events {
            events.insert(name.clone(), serde_json::json!({"params": event.params}));
        }

        serde_json::json!({
            "p": NAMESPACE,
            "op": DEPLOY_OP,
            "protocol": self.name,
            "version": self.version,
            "cpl": {
                "state": state,
                "methods": methods,
                "events": events,
                "owner": self.cpl.owner,
            },
            "abi": self.abi.to_json(),
            "hash": self.hash,
            "signature": self.signature,
        })
    }
}

fn from_value(value: &serde_json::Value) -> Result<Protocol, LoadError> {
    let p = str_field(value, "p");
    if p != NAMESPACE {
        return Err(SchemaError::InvalidNamespace(p).into());
    }
    let op = str_field(value, "op");
    if op != DEPLOY_OP {
        return Err(SchemaError::InvalidOperation(op).into());
    }

    let name = str_field(value, "protocol");
    if name.is_empty() {
        return Err(SchemaError::MissingProtocolName.into());
    }
    let version = str_field(value, "version");
    if version.is_empty() {
        return Err(SchemaError::MissingVersion.into());
    }

    let cpl = match value.get("cpl") {
        Some(cpl_json) => parse_cpl(cpl_json)?,
        None => Cpl {
            state: BTreeMap::new(),
            methods: BTreeMap::new(),
            events: BTreeMap::new(),
            owner: String::new(),
        },
    };
    if cpl.owner.is_empty() {
        return Err(SchemaError::MissingOwner.into());
    }

    // Static checks: compile every body and return expression against the
    // declared state and events.
    compile_methods(&cpl)?;

    let abi = Abi::derive(&cpl, &name, &version);

    let supplied_hash = str_field(value, "hash");
    let hash = if supplied_hash.is_empty() {
        content_hash(value)
    } else {
        supplied_hash
    };

    Ok(Protocol {
        name,
        version,
        cpl,
        abi,
        hash,
        signature: str_field(value, "signature"),
    })
}

/// Blake3 hex digest of the canonical JSON encoding. `serde_json` object
/// keys are sorted, so the encoding is canonical for any key order in the
/// source document.
fn content_hash(value: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(value).expect("document re-serialization is infallible");
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

fn str_field(value: &serde_json::Value, field: &str) -> String {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_cpl(cpl_json: &serde_json::Value) -> Result<Cpl, SchemaError> {
    let mut state = BTreeMap::new();
    if let Some(state_json) = cpl_json.get("state").and_then(|v| v.as_object()) {
        for (name, var_json) in state_json {
            let type_name = var_json
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("string")
                .to_string();
            if type_name.is_empty() {
                return Err(SchemaError::EmptyVarType(name.clone()));
            }
            let default = var_json
                .get("default")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            state.insert(name.clone(), VarDecl { type_name, default });
        }
    }

    let mut methods = BTreeMap::new();
    if let Some(methods_json) = cpl_json.get("methods").and_then(|v| v.as_object()) {
        for (name, method_json) in methods_json {
            methods.insert(name.clone(), parse_method(name, method_json)?);
        }
    }

    let mut events = BTreeMap::new();
    if let Some(events_json) = cpl_json.get("events").and_then(|v| v.as_object()) {
        for (name, event_json) in events_json {
            events.insert(name.clone(), parse_event(name, event_json)?);
        }
    }

    let owner = str_field(cpl_json, "owner");

    Ok(Cpl {
        state,
        methods,
        events,
        owner,
    })
}

fn parse_method(name: &str, method_json: &serde_json::Value) -> Result<MethodDecl, SchemaError> {
    let mut params = Vec::new();
    if let Some(params_json) = method_json.get("params").and_then(|v| v.as_array()) {
        for param in params_json {
            if let Some(param) = param.as_str() {
                if params.iter().any(|existing| existing == param) {
                    return Err(SchemaError::DuplicateParam {
                        method: name.to_string(),
                        param: param.to_string(),
                    });
                }
                params.push(param.to_string());
            }
        }
    }

    // A body is either a single string or a list of statements joined
    // with "; " on load; both forms have identical semantics. The wire
    // field is "logic", with "body" accepted as an alias.
    let body_json = method_json.get("logic").or_else(|| method_json.get("body"));
    let body = match body_json {
        Some(serde_json::Value::Array(lines)) => lines
            .iter()
            .filter_map(|line| line.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        Some(serde_json::Value::String(body)) => body.clone(),
        _ => String::new(),
    };

    let returns = match method_json.get("returns") {
        Some(serde_json::Value::Object(obj)) => obj
            .get("expr")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        Some(serde_json::Value::String(expr)) => Some(expr.clone()),
        _ => None,
    }
    .filter(|expr| !expr.is_empty());

    if body.is_empty() && returns.is_none() {
        return Err(SchemaError::EmptyMethod(name.to_string()));
    }

    Ok(MethodDecl {
        params,
        body,
        returns,
    })
}

fn parse_event(name: &str, event_json: &serde_json::Value) -> Result<EventDecl, SchemaError> {
    let mut params = Vec::new();
    if let Some(params_json) = event_json.get("params") {
        let entries = params_json
            .as_array()
            .ok_or_else(|| SchemaError::BadEventParams(name.to_string()))?;
        for entry in entries {
            // Parameter lists accept bare strings or objects with a name.
            match entry {
                serde_json::Value::String(param) => params.push(param.clone()),
                serde_json::Value::Object(obj) => match obj.get("name").and_then(|v| v.as_str()) {
                    Some(param) => params.push(param.to_string()),
                    None => return Err(SchemaError::BadEventParams(name.to_string())),
                },
                _ => return Err(SchemaError::BadEventParams(name.to_string())),
            }
        }
    }
    Ok(EventDecl { params })
}

/// Compile every method in the protocol logic, enforcing the static
/// rules: bodies and return expressions must parse, state writes must
/// target declared variables, and emits must match declared events.
pub fn compile_methods(cpl: &Cpl) -> Result<BTreeMap<String, CompiledMethod>, SchemaError> {
    let mut compiled = BTreeMap::new();
    for (name, method) in &cpl.methods {
        let body = if method.body.is_empty() {
            Vec::new()
        } else {
            parse_body(&method.body).map_err(|e| SchemaError::BodySyntax {
                method: name.clone(),
                detail: e.to_string(),
            })?
        };

        let returns = match &method.returns {
            Some(expr) => Some(parse_expression(expr).map_err(|e| SchemaError::ReturnSyntax {
                method: name.clone(),
                detail: e.to_string(),
            })?),
            None => None,
        };

        check_stmts(name, &body, cpl)?;

        compiled.insert(
            name.clone(),
            CompiledMethod {
                params: method.params.clone(),
                body,
                returns,
            },
        );
    }
    Ok(compiled)
}

fn check_stmts(method: &str, stmts: &[Stmt], cpl: &Cpl) -> Result<(), SchemaError> {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } => match target {
                // Bare names write the store, so they need a declaration too.
                VarRef::State(variable) | VarRef::Bare(variable) => {
                    if !cpl.state.contains_key(variable) {
                        return Err(SchemaError::UndeclaredStateWrite {
                            method: method.to_string(),
                            variable: variable.clone(),
                        });
                    }
                }
                VarRef::Params(_) => {}
            },
            Stmt::If { body, .. } => check_stmts(method, body, cpl)?,
            Stmt::Emit { event, args } => match cpl.events.get(event) {
                None => {
                    return Err(SchemaError::UnknownEvent {
                        method: method.to_string(),
                        event: event.clone(),
                    });
                }
                Some(decl) if decl.params.len() != args.len() => {
                    return Err(SchemaError::EventArityMismatch {
                        method: method.to_string(),
                        event: event.clone(),
                        expected: decl.params.len(),
                        got: args.len(),
                    });
                }
                Some(_) => {}
            },
            Stmt::Expr(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_doc() -> serde_json::Value {
        serde_json::json!({
            "p": "cardinals",
            "op": "deploy",
            "protocol": "counter",
            "version": "1.0",
            "cpl": {
                "state": {
                    "count": {"type": "int", "default": "0"}
                },
                "methods": {
                    "increment": {"params": [], "logic": "state.count = state.count + 1"},
                    "get_count": {"params": [], "returns": "state.count"}
                },
                "events": {
                    "Overflow": {"params": ["limit"]}
                },
                "owner": "doge1owner"
            }
        })
    }

    fn load(value: serde_json::Value) -> Result<Protocol, LoadError> {
        Protocol::from_json(&value.to_string())
    }

    #[test]
    fn loads_a_well_formed_document() {
        let protocol = load(counter_doc()).unwrap();
        assert_eq!(protocol.name, "counter");
        assert_eq!(protocol.version, "1.0");
        assert_eq!(protocol.cpl.state["count"].default, "0");
        assert_eq!(protocol.cpl.methods["increment"].params.len(), 0);
        assert_eq!(
            protocol.cpl.methods["get_count"].returns.as_deref(),
            Some("state.count")
        );
        assert!(!protocol.hash.is_empty());
    }

    #[test]
    fn rejects_wrong_namespace_and_op() {
        let mut doc = counter_doc();
        doc["p"] = serde_json::json!("ordinals");
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::InvalidNamespace(_)))
        ));

        let mut doc = counter_doc();
        doc["op"] = serde_json::json!("mint");
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::InvalidOperation(_)))
        ));
    }

    #[test]
    fn rejects_missing_identity_fields() {
        let mut doc = counter_doc();
        doc["protocol"] = serde_json::json!("");
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::MissingProtocolName))
        ));

        let mut doc = counter_doc();
        doc.as_object_mut().unwrap().remove("version");
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::MissingVersion))
        ));

        let mut doc = counter_doc();
        doc["cpl"]["owner"] = serde_json::json!("");
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::MissingOwner))
        ));
    }

    #[test]
    fn rejects_empty_var_type_and_empty_method() {
        let mut doc = counter_doc();
        doc["cpl"]["state"]["count"]["type"] = serde_json::json!("");
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::EmptyVarType(_)))
        ));

        let mut doc = counter_doc();
        doc["cpl"]["methods"]["noop"] = serde_json::json!({"params": []});
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::EmptyMethod(_)))
        ));
    }

    #[test]
    fn rejects_duplicate_params() {
        let mut doc = counter_doc();
        doc["cpl"]["methods"]["twice"] = serde_json::json!({
            "params": ["x", "x"],
            "logic": "state.count = params.x"
        });
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::DuplicateParam { .. }))
        ));
    }

    #[test]
    fn normalizes_list_bodies_and_object_returns() {
        let mut doc = counter_doc();
        doc["cpl"]["methods"]["bump"] = serde_json::json!({
            "params": [],
            "logic": ["state.count = state.count + 1", "state.count = state.count + 1"],
            "returns": {"expr": "state.count"}
        });
        let protocol = load(doc).unwrap();
        let bump = &protocol.cpl.methods["bump"];
        assert_eq!(
            bump.body,
            "state.count = state.count + 1; state.count = state.count + 1"
        );
        assert_eq!(bump.returns.as_deref(), Some("state.count"));
    }

    #[test]
    fn event_params_accept_strings_and_name_objects() {
        let mut doc = counter_doc();
        doc["cpl"]["events"]["Mixed"] = serde_json::json!({
            "params": ["a", {"name": "b"}]
        });
        let protocol = load(doc).unwrap();
        assert_eq!(protocol.cpl.events["Mixed"].params, vec!["a", "b"]);

        let mut doc = counter_doc();
        doc["cpl"]["events"]["Bad"] = serde_json::json!({"params": [7]});
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::BadEventParams(_)))
        ));
    }

    #[test]
    fn rejects_undeclared_state_writes_at_load() {
        let mut doc = counter_doc();
        doc["cpl"]["methods"]["rogue"] = serde_json::json!({
            "params": [],
            "logic": "state.ghost = 1"
        });
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::UndeclaredStateWrite { .. }))
        ));

        // Bare writes go to the store, so they need a declaration too.
        let mut doc = counter_doc();
        doc["cpl"]["methods"]["rogue"] = serde_json::json!({
            "params": [],
            "logic": "ghost = 1"
        });
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::UndeclaredStateWrite { .. }))
        ));
    }

    #[test]
    fn rejects_unknown_or_wrong_arity_emits() {
        let mut doc = counter_doc();
        doc["cpl"]["methods"]["rogue"] = serde_json::json!({
            "params": [],
            "logic": "emit Ghost(\"1\")"
        });
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::UnknownEvent { .. }))
        ));

        let mut doc = counter_doc();
        doc["cpl"]["methods"]["rogue"] = serde_json::json!({
            "params": [],
            "logic": "emit Overflow(\"1\", \"2\")"
        });
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::EventArityMismatch { .. }))
        ));
    }

    #[test]
    fn rejects_malformed_bodies_and_returns() {
        let mut doc = counter_doc();
        doc["cpl"]["methods"]["broken"] = serde_json::json!({
            "params": [],
            "logic": "if (state.count { }"
        });
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::BodySyntax { .. }))
        ));

        // Side effects cannot appear in return position.
        let mut doc = counter_doc();
        doc["cpl"]["methods"]["sneaky"] = serde_json::json!({
            "params": [],
            "returns": "state.count = 9"
        });
        assert!(matches!(
            load(doc),
            Err(LoadError::Schema(SchemaError::ReturnSyntax { .. }))
        ));
    }

    #[test]
    fn supplied_hash_is_preserved_otherwise_computed() {
        let mut doc = counter_doc();
        doc["hash"] = serde_json::json!("deadbeef");
        let protocol = load(doc).unwrap();
        assert_eq!(protocol.hash, "deadbeef");

        let a = load(counter_doc()).unwrap();
        let b = load(counter_doc()).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn base64_wrapper_is_a_pass_through() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let encoded = STANDARD.encode(counter_doc().to_string());
        let protocol = Protocol::from_base64(&encoded).unwrap();
        assert_eq!(protocol.name, "counter");

        assert!(matches!(
            Protocol::from_base64("!!! not base64 !!!"),
            Err(LoadError::Base64(_))
        ));
    }

    #[test]
    fn abi_is_byte_identical_across_loads() {
        let a = load(counter_doc()).unwrap().abi.to_string_pretty();
        let b = load(counter_doc()).unwrap().abi.to_string_pretty();
        assert_eq!(a, b);
    }

    #[test]
    fn export_round_trips_through_the_loader() {
        let protocol = load(counter_doc()).unwrap();
        let exported = protocol.export_to_json();
        let reloaded = Protocol::from_json(&exported.to_string()).unwrap();
        assert_eq!(reloaded.cpl, protocol.cpl);
        assert_eq!(reloaded.abi, protocol.abi);
        assert_eq!(reloaded.hash, protocol.hash);
    }
}
