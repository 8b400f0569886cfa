//! Sandbox module synthesis.
//!
//! The gateway never evaluates user script text directly. Each request's raw
//! script becomes the body of `main(args)` inside a fixed wrapper module that
//! resolves the builtin import aliases, collects responder snapshots and
//! installs the `__handle` entrypoint the dispatch layer calls.
//!
//! Rendering is deterministic: the same script text and alias list always
//! produce byte-identical module source, which is what makes the rendered
//! source cacheable per pool key.

use funcgate_common::{GatewayError, Result};

/// Slot marker prefix. User scripts containing it are rejected so a request
/// body can never splice itself outside the `main` body.
const RESERVED_TOKEN: &str = "__FUNCGATE_SLOT";

const IMPORTS_SLOT: &str = "__FUNCGATE_SLOT_IMPORTS__";
const BODY_SLOT: &str = "__FUNCGATE_SLOT_BODY__";

/// Wrapper the user script is spliced into. The `__handle` function is the
/// single entrypoint the host calls; it resets the snapshot accumulator per
/// invocation while the rest of the context's global state persists across
/// reuse.
const MODULE_TEMPLATE: &str = r#"const res = __import("gateway/responder");
const utils = __import("gateway/kit");
__FUNCGATE_SLOT_IMPORTS__
const __results = [];

function respond() {
    return res.create((snapshot) => {
        __results.push(snapshot);
    });
}

async function main(args) {
__FUNCGATE_SLOT_BODY__
}

globalThis.__handle = async function (payload) {
    __results.length = 0;
    const args = (payload && payload.args) || {};
    try {
        await main(args);
        return { results: __results.slice(), status: "ok" };
    } catch (err) {
        return { results: __results.slice(), status: "error", msg: String(err) };
    }
};
"#;

/// A rendered sandbox module, ready for context evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedModule {
    source: String,
}

impl SynthesizedModule {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn into_source(self) -> String {
        self.source
    }
}

/// Splices `script` into the wrapper template and emits one `const {alias} =
/// __import("{alias}")` line per extra alias.
///
/// `script` is treated as opaque text; syntax errors surface later, at
/// context creation. Only the reserved slot marker is rejected here.
pub fn render_module(script: &str, extra_aliases: &[String]) -> Result<SynthesizedModule> {
    if script.contains(RESERVED_TOKEN) {
        return Err(GatewayError::Validation(
            "script contains a reserved synthesis token".into(),
        ));
    }

    let mut imports = String::new();
    for alias in extra_aliases {
        if !is_valid_binding(alias) {
            return Err(GatewayError::Validation(format!(
                "import alias '{}' is not a valid identifier",
                alias
            )));
        }
        imports.push_str(&format!("const {alias} = __import(\"{alias}\");\n"));
    }

    let source = MODULE_TEMPLATE
        .replace(IMPORTS_SLOT, imports.trim_end())
        .replace(BODY_SLOT, script);

    Ok(SynthesizedModule { source })
}

/// Extra aliases double as `const` binding names, so they must be plain
/// identifiers. The builtin `gateway/...` aliases are bound explicitly in the
/// template and never pass through here.
fn is_valid_binding(alias: &str) -> bool {
    let mut chars = alias.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
