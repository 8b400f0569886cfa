//! Native bindings installed into every sandbox context.
//!
//! This is the single place where host functionality is exposed to the
//! synthesized module. A context gets a module table (`__gateway_modules`)
//! holding the builtin `gateway/responder` and `gateway/kit` modules, the
//! outbound `gateway/net` module unless disabled, and any configured extra
//! aliases; `__import(alias)` is the only way script code reaches them.
//!
//! Every native function here is capture-free: it reads what it needs from
//! the context's global scope, so nothing host-side has to satisfy the
//! engine's tracing requirements.

use boa_engine::{
    js_string,
    native_function::NativeFunction,
    object::{FunctionObjectBuilder, JsObject},
    property::Attribute,
    value::JsValue,
    Context, JsNativeError, Source,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use std::sync::{Mutex, OnceLock};

use crate::worker::WorkerSpec;
use funcgate_common::{GatewayError, Result};

const MODULE_TABLE: &str = "__gateway_modules";

/// Builtin responder module, kept as plain JavaScript. `create(send)` hands
/// out a per-call response builder whose `send()` pushes a status/body
/// snapshot through the callback wired in by the synthesized wrapper.
const RESPONDER_MODULE_SRC: &str = r#"({
    create(send) {
        return {
            _status: 200,
            _body: null,
            status(code) { this._status = code; return this; },
            json(body) { this._body = body; return this; },
            send() { send({ status: this._status, body: this._body }); return this; },
        };
    }
})"#;

/// Shared runtime for blocking outbound calls. Created once; each fetch
/// locks it, runs the request to completion and releases it. Fetches run on
/// blocking threads, never on the server's async executor.
static BLOCKING_RUNTIME: OnceLock<Mutex<tokio::runtime::Runtime>> = OnceLock::new();

fn blocking_runtime() -> std::io::Result<&'static Mutex<tokio::runtime::Runtime>> {
    if let Some(runtime) = BLOCKING_RUNTIME.get() {
        return Ok(runtime);
    }

    let runtime = tokio::runtime::Runtime::new().map(Mutex::new)?;
    Ok(BLOCKING_RUNTIME.get_or_init(|| runtime))
}

/// Installs the module table and the `__import` resolver into `ctx`.
pub(crate) fn install_gateway_bindings(ctx: &mut Context, spec: &WorkerSpec) -> Result<()> {
    let modules = JsObject::with_object_proto(ctx.intrinsics());

    let responder = ctx
        .eval(Source::from_bytes(RESPONDER_MODULE_SRC))
        .map_err(|e| {
            GatewayError::WorkerCreation(format!("responder module failed to evaluate: {}", e))
        })?;
    modules
        .set(js_string!("gateway/responder"), responder, false, ctx)
        .map_err(creation_err)?;

    let kit = build_kit_module(ctx, spec)?;
    modules
        .set(js_string!("gateway/kit"), kit, false, ctx)
        .map_err(creation_err)?;

    if !spec.net_access_disabled {
        let net = build_net_module(ctx)?;
        modules
            .set(js_string!("gateway/net"), net, false, ctx)
            .map_err(creation_err)?;
    }

    // Configured extras are arbitrary module source expressions, evaluated
    // once per context.
    for (alias, source) in &spec.import_alias_table {
        let value = ctx.eval(Source::from_bytes(source)).map_err(|e| {
            GatewayError::WorkerCreation(format!(
                "import alias '{}' failed to evaluate: {}",
                alias, e
            ))
        })?;
        modules
            .set(js_string!(alias.clone()), value, false, ctx)
            .map_err(creation_err)?;
    }

    ctx.register_global_property(js_string!(MODULE_TABLE), modules, Attribute::all())
        .map_err(creation_err)?;

    let import_fn = FunctionObjectBuilder::new(
        ctx.realm(),
        NativeFunction::from_copy_closure(import_alias),
    )
    .build();
    ctx.register_global_property(js_string!("__import"), import_fn, Attribute::all())
        .map_err(creation_err)?;

    Ok(())
}

fn creation_err(e: boa_engine::JsError) -> GatewayError {
    GatewayError::WorkerCreation(e.to_string())
}

/// `__import(alias)`: resolves a module from the context's table. Unknown
/// aliases (including `gateway/net` when outbound access is disabled) throw
/// a ReferenceError into the script.
fn import_alias(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> boa_engine::JsResult<JsValue> {
    let alias = args
        .get(0)
        .and_then(|v| v.as_string())
        .ok_or_else(|| JsNativeError::typ().with_message("import alias must be a string"))?;

    let table = context
        .global_object()
        .get(js_string!(MODULE_TABLE), context)?;
    let table = table
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("module table is missing"))?;

    let module = table.get(alias.clone(), context)?;
    if module.is_undefined() {
        let name = alias.to_std_string_escaped();
        return Err(JsNativeError::reference()
            .with_message(format!("unknown import alias '{}'", name))
            .into());
    }

    Ok(module)
}

/// `gateway/kit`: the environment snapshot plus small host utilities.
fn build_kit_module(ctx: &mut Context, spec: &WorkerSpec) -> Result<JsObject> {
    let kit = JsObject::with_object_proto(ctx.intrinsics());

    // Environment pairs become plain string properties; the script reads
    // data, not the host process.
    let env = JsObject::with_object_proto(ctx.intrinsics());
    for (key, value) in &spec.environment {
        env.create_data_property_or_throw(js_string!(key.clone()), js_string!(value.clone()), ctx)
            .map_err(creation_err)?;
    }
    kit.set(js_string!("env"), env, false, ctx)
        .map_err(creation_err)?;

    let log_fn =
        FunctionObjectBuilder::new(ctx.realm(), NativeFunction::from_copy_closure(kit_log)).build();
    kit.set(js_string!("log"), log_fn, false, ctx)
        .map_err(creation_err)?;

    let now_fn = FunctionObjectBuilder::new(
        ctx.realm(),
        NativeFunction::from_copy_closure(|_this, _args, _ctx| {
            let millis = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as f64)
                .unwrap_or(0.0);
            Ok(JsValue::new(millis))
        }),
    )
    .build();
    kit.set(js_string!("now"), now_fn, false, ctx)
        .map_err(creation_err)?;

    Ok(kit)
}

fn kit_log(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> boa_engine::JsResult<JsValue> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        let s = arg.to_string(context)?;
        parts.push(s.to_std_string_escaped());
    }
    tracing::info!(target: "sandbox", "{}", parts.join(" "));
    Ok(JsValue::undefined())
}

/// `gateway/net`: blocking outbound HTTP, installed only when the spec
/// allows it.
fn build_net_module(ctx: &mut Context) -> Result<JsObject> {
    let net = JsObject::with_object_proto(ctx.intrinsics());
    let fetch_fn =
        FunctionObjectBuilder::new(ctx.realm(), NativeFunction::from_copy_closure(net_fetch))
            .build();
    net.set(js_string!("fetch"), fetch_fn, false, ctx)
        .map_err(creation_err)?;
    Ok(net)
}

/// `net.fetch(url)`: a blocking GET returning `{ status, body }`.
fn net_fetch(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> boa_engine::JsResult<JsValue> {
    let url = args
        .get(0)
        .and_then(|v| v.as_string())
        .ok_or_else(|| JsNativeError::typ().with_message("fetch expects a url string"))?
        .to_std_string()
        .map_err(|e| JsNativeError::typ().with_message(format!("invalid url string: {:?}", e)))?;

    let uri: hyper::Uri = url
        .parse()
        .map_err(|e| JsNativeError::typ().with_message(format!("invalid url '{}': {}", url, e)))?;

    let rt_mutex = blocking_runtime().map_err(|e| {
        JsNativeError::typ().with_message(format!("failed to start network runtime: {}", e))
    })?;
    let rt = rt_mutex
        .lock()
        .map_err(|_| JsNativeError::typ().with_message("network runtime lock poisoned"))?;

    tracing::debug!(target: "sandbox", url = %url, "outbound fetch");

    let (status, body) = rt
        .block_on(async move {
            let client = hyper_util::client::legacy::Client::builder(
                hyper_util::rt::TokioExecutor::new(),
            )
            .build_http::<Full<Bytes>>();

            let request = hyper::Request::builder()
                .uri(uri)
                .body(Full::new(Bytes::new()))
                .map_err(|e| e.to_string())?;

            let response = client.request(request).await.map_err(|e| e.to_string())?;
            let status = response.status().as_u16();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| e.to_string())?
                .to_bytes();

            Ok::<_, String>((status, String::from_utf8_lossy(&bytes).into_owned()))
        })
        .map_err(|e| JsNativeError::typ().with_message(format!("fetch failed: {}", e)))?;

    let reply = JsObject::with_object_proto(context.intrinsics());
    reply.create_data_property_or_throw(js_string!("status"), JsValue::new(status as i32), context)?;
    reply.create_data_property_or_throw(js_string!("body"), js_string!(body), context)?;
    Ok(reply.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::ModuleSource;

    fn spec() -> WorkerSpec {
        WorkerSpec {
            function_identity: "services/test".into(),
            memory_limit_mb: 128,
            wall_clock_timeout_ms: 60_000,
            cpu_time_soft_limit_ms: 1_000,
            cpu_time_hard_limit_ms: 2_000,
            module_cache_enabled: true,
            net_access_disabled: false,
            import_alias_table: Vec::new(),
            environment: vec![("REGION".into(), "eu-west-1".into())],
            force_create: false,
            module_source: ModuleSource::Inline(String::new()),
        }
    }

    #[test]
    fn kit_env_is_visible_to_scripts() {
        let mut ctx = Context::default();
        install_gateway_bindings(&mut ctx, &spec()).unwrap();

        let value = ctx
            .eval(Source::from_bytes(r#"__import("gateway/kit").env.REGION"#))
            .unwrap();
        assert_eq!(
            value.as_string().map(|s| s.to_std_string_escaped()),
            Some("eu-west-1".to_string())
        );
    }

    #[test]
    fn responder_builder_snapshots_on_send() {
        let mut ctx = Context::default();
        install_gateway_bindings(&mut ctx, &spec()).unwrap();

        let value = ctx
            .eval(Source::from_bytes(
                r#"
                let snapshot = null;
                const res = __import("gateway/responder").create((s) => { snapshot = s; });
                res.status(201).json({ ok: true }).send();
                snapshot.status
                "#,
            ))
            .unwrap();
        assert_eq!(value.as_i32(), Some(201));
    }

    #[test]
    fn unknown_alias_throws_reference_error() {
        let mut ctx = Context::default();
        install_gateway_bindings(&mut ctx, &spec()).unwrap();

        let err = ctx.eval(Source::from_bytes(r#"__import("no/such/module")"#));
        assert!(err.is_err());
    }

    #[test]
    fn net_module_is_absent_when_disabled() {
        let mut spec = spec();
        spec.net_access_disabled = true;

        let mut ctx = Context::default();
        install_gateway_bindings(&mut ctx, &spec).unwrap();

        let err = ctx.eval(Source::from_bytes(r#"__import("gateway/net")"#));
        assert!(err.is_err());
    }

    #[test]
    fn extra_alias_is_resolvable() {
        let mut spec = spec();
        spec.import_alias_table
            .push(("mathx".into(), "({ double(n) { return n * 2; } })".into()));

        let mut ctx = Context::default();
        install_gateway_bindings(&mut ctx, &spec).unwrap();

        let value = ctx
            .eval(Source::from_bytes(r#"__import("mathx").double(21)"#))
            .unwrap();
        assert_eq!(value.as_i32(), Some(42));
    }
}
