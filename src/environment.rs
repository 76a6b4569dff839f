//! Execution Scope
//!
//! One `ExecutionScope` per run. It owns the script engine context that every
//! bootstrap script and test file is evaluated into, so each script sees the
//! globals left behind by the ones before it. The scope is passed by `&mut`
//! to whoever evaluates into it; nothing else holds the context.
//!
//! Host functions installed here are the only bridge between scripts and the
//! process: stdout/stderr printing, module resolution and module compilation.
//!
//! Scripts read from disk are evaluated with statement line markers (see
//! [`crate::lines`]) so runtime errors can name the line that threw.

use crate::lines::{mark_statement_lines, LINE_GLOBAL};
use crate::resolver::ModuleResolver;
use boa_engine::property::Attribute;
use boa_engine::{
    js_string, Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction,
    Script, Source,
};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A named unit of script text
#[derive(Debug, Clone)]
pub struct ScriptSource {
    /// Label used in diagnostics (`boot.js`, `users/users.test.js`, ...)
    pub label: String,
    pub text: String,
    /// Location on disk, when the script came from a file
    pub path: Option<PathBuf>,
}

impl ScriptSource {
    pub fn bundled(label: &str, text: &str) -> Self {
        Self {
            label: label.to_string(),
            text: text.to_string(),
            path: None,
        }
    }

    pub fn from_file(label: impl Into<String>, path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            label: label.into(),
            text: std::fs::read_to_string(path)?,
            path: Some(path.to_path_buf()),
        })
    }
}

/// Syntax or runtime error raised while evaluating a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub script: String,
    pub line: Option<u32>,
    pub message: String,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.script, line, self.message),
            None => write!(f, "{}: {}", self.script, self.message),
        }
    }
}

impl std::error::Error for LoadError {}

impl LoadError {
    fn from_js(script: &str, err: &JsError, context: &mut Context) -> Self {
        // Only engine diagnostics carry a position; thrown values are opaque
        let line = err.as_native().and_then(|native| line_number(native.message()));
        Self {
            script: script.to_string(),
            line,
            message: describe_js_error(err, context),
        }
    }
}

/// Human-readable text for an engine error: `TypeError: x is not a function`.
pub fn describe_js_error(err: &JsError, context: &mut Context) -> String {
    if let Some(value) = err.as_opaque() {
        // Thrown Error objects stringify as "Name: message"; plain values as themselves
        return value
            .to_string(context)
            .map(|s| s.to_std_string_escaped())
            .unwrap_or_else(|_| value.display().to_string());
    }
    match err.try_native(context) {
        Ok(native) => native.to_string(),
        Err(_) => err.to_string(),
    }
}

/// Split the parser's trailing ` at line N, col M` off a diagnostic.
fn split_position(message: &str) -> Option<(&str, u32, u32)> {
    let (rest, col) = message.trim_end().rsplit_once(", col ")?;
    let (head, line) = rest.rsplit_once(" at line ")?;
    Some((head, line.parse().ok()?, col.parse().ok()?))
}

fn line_number(message: &str) -> Option<u32> {
    split_position(message).map(|(_, line, _)| line)
}

/// The shared global environment of one run
pub struct ExecutionScope {
    context: Context,
    resolver: Rc<ModuleResolver>,
}

impl ExecutionScope {
    /// Create a fresh context with the host functions and `process.env` installed.
    pub fn new(resolver: ModuleResolver, env: &BTreeMap<String, String>) -> Result<Self, LoadError> {
        let mut scope = Self {
            context: Context::default(),
            resolver: Rc::new(resolver),
        };
        scope
            .install_host_functions(env)
            .map_err(|e| LoadError::from_js("<host>", &e, &mut scope.context))?;
        Ok(scope)
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    fn install_host_functions(&mut self, env: &BTreeMap<String, String>) -> JsResult<()> {
        let ctx = &mut self.context;

        ctx.register_global_callable(js_string!("__print"), 1, NativeFunction::from_fn_ptr(print_stdout))?;
        ctx.register_global_callable(js_string!("__printErr"), 1, NativeFunction::from_fn_ptr(print_stderr))?;
        ctx.register_global_callable(
            js_string!("__hostDirname"),
            1,
            NativeFunction::from_fn_ptr(dirname),
        )?;
        ctx.register_global_callable(
            js_string!("__compileModule"),
            1,
            NativeFunction::from_fn_ptr(compile_module),
        )?;

        let resolver = Rc::clone(&self.resolver);
        // SAFETY: the closure captures only an `Rc<ModuleResolver>`, which holds
        // no garbage-collected values that would need tracing.
        let resolve = unsafe {
            NativeFunction::from_closure(move |_this, args, ctx| {
                let id = string_arg(args, 0, ctx)?;
                let base = match args.get(1) {
                    Some(v) if !v.is_null_or_undefined() => Some(PathBuf::from(
                        v.to_string(ctx)?.to_std_string_escaped(),
                    )),
                    _ => None,
                };
                match resolver.resolve(&id, base.as_deref()) {
                    Ok(path) => Ok(JsValue::from(JsString::from(
                        path.to_string_lossy().as_ref(),
                    ))),
                    Err(e) => Err(JsNativeError::error().with_message(e.to_string()).into()),
                }
            })
        };
        ctx.register_global_callable(js_string!("__resolveModule"), 2, resolve)?;

        let mut vars: serde_json::Map<String, serde_json::Value> = std::env::vars()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        for (k, v) in env {
            vars.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
        let process = serde_json::json!({ "env": vars });
        let process = JsValue::from_json(&process, ctx)?;
        ctx.register_global_property(js_string!("process"), process, Attribute::all())?;

        Ok(())
    }

    /// Evaluate one script into the shared scope.
    pub fn evaluate(&mut self, script: &ScriptSource) -> Result<JsValue, LoadError> {
        tracing::trace!(script = %script.label, "evaluating");
        let result = match &script.path {
            Some(path) => self.evaluate_marked(&script.text, path),
            None => self.context.eval(Source::from_bytes(script.text.as_bytes())),
        };
        let result = result.map_err(|e| {
            let mut error = LoadError::from_js(&script.label, &e, &mut self.context);
            if error.line.is_none() && script.path.is_some() {
                error.line = self.last_marked_line();
            }
            error
        });
        // Settle any promise jobs queued by top-level code
        self.context.run_jobs();
        result
    }

    /// Run file text with line markers, or unmarked when the marked text
    /// does not parse.
    fn evaluate_marked(&mut self, text: &str, path: &Path) -> JsResult<JsValue> {
        let global = self.context.global_object();
        global.set(JsString::from(LINE_GLOBAL), JsValue::from(0), false, &mut self.context)?;

        let marked = mark_statement_lines(text, LINE_GLOBAL);
        let source = Source::from_bytes(marked.as_bytes()).with_path(path);
        let script = match Script::parse(source, None, &mut self.context) {
            Ok(script) => script,
            Err(_) => {
                tracing::debug!(path = %path.display(), "line markers rejected, evaluating unmarked");
                let source = Source::from_bytes(text.as_bytes()).with_path(path);
                Script::parse(source, None, &mut self.context)?
            }
        };
        script.evaluate(&mut self.context)
    }

    /// Line of the last marked statement that started running
    fn last_marked_line(&mut self) -> Option<u32> {
        let global = self.context.global_object();
        let value = global
            .get(JsString::from(LINE_GLOBAL), &mut self.context)
            .ok()?;
        value
            .as_number()
            .filter(|line| *line >= 1.0)
            .map(|line| line as u32)
    }

    /// Assign a string to a global binding.
    pub fn set_global(&mut self, name: &str, value: &str) -> Result<(), LoadError> {
        let global = self.context.global_object();
        global
            .set(
                JsString::from(name),
                JsValue::from(JsString::from(value)),
                false,
                &mut self.context,
            )
            .map(|_| ())
            .map_err(|e| LoadError::from_js("<host>", &e, &mut self.context))
    }

    /// Call a function stored in a global binding.
    pub fn call_global(&mut self, name: &str, args: &[JsValue]) -> Result<JsValue, LoadError> {
        let global = self.context.global_object();
        let value = global
            .get(JsString::from(name), &mut self.context)
            .map_err(|e| LoadError::from_js(name, &e, &mut self.context))?;

        let Some(function) = value.as_callable() else {
            return Err(LoadError {
                script: name.to_string(),
                line: None,
                message: format!("global '{}' is not a function", name),
            });
        };

        let result = function
            .call(&JsValue::undefined(), args, &mut self.context)
            .map_err(|e| LoadError::from_js(name, &e, &mut self.context));
        self.context.run_jobs();
        result
    }
}

// =============================================================================
// Host functions
// =============================================================================

fn string_arg(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<String> {
    match args.get(index) {
        Some(v) => Ok(v.to_string(ctx)?.to_std_string_escaped()),
        None => Ok(String::new()),
    }
}

fn print_stdout(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let text = string_arg(args, 0, ctx)?;
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(text.as_bytes());
    let _ = out.flush();
    Ok(JsValue::undefined())
}

fn print_stderr(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let text = string_arg(args, 0, ctx)?;
    let mut err = std::io::stderr().lock();
    let _ = err.write_all(text.as_bytes());
    Ok(JsValue::undefined())
}

fn dirname(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, ctx)?;
    let parent = Path::new(&path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(JsValue::from(JsString::from(parent.as_str())))
}

/// Parameters of the CommonJS factory a module body is compiled into
const MODULE_PARAMS: &str = "exports, module, require, __filename, __dirname";

/// Read a resolved module and compile it into a CommonJS factory function.
///
/// Compilation goes through the realm's own `Function` constructor, which
/// parses without running anything, so it is safe from inside a host call.
fn compile_module(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = PathBuf::from(string_arg(args, 0, ctx)?);
    let text = std::fs::read_to_string(&path).map_err(|e| {
        JsNativeError::error().with_message(format!("{}: {}", path.display(), e))
    })?;

    let function = ctx.intrinsics().constructors().function().constructor();
    let factory_args = [
        JsValue::from(JsString::from(MODULE_PARAMS)),
        JsValue::from(JsString::from(text.as_str())),
    ];
    function
        .call(&JsValue::undefined(), &factory_args, ctx)
        .map_err(|e| module_compile_error(&path, &e, ctx))
}

/// Syntax error naming the module file and its own line
fn module_compile_error(path: &Path, err: &JsError, ctx: &mut Context) -> JsError {
    let detail = match err.as_native() {
        Some(native) => native.message().to_string(),
        None => describe_js_error(err, ctx),
    };
    let detail = detail.trim_start_matches("failed to parse function body: ");
    let message = match split_position(detail) {
        // The constructor parses the body after a leading newline
        Some((head, line, col)) => format!(
            "{}:{}:{}: {}",
            path.display(),
            line.saturating_sub(1).max(1),
            col,
            head
        ),
        None => format!("{}: {}", path.display(), detail),
    };
    JsNativeError::syntax().with_message(message).into()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ExecutionScope {
        ExecutionScope::new(ModuleResolver::default(), &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_line_number_extraction() {
        assert_eq!(
            line_number("unexpected token ';', primary expression at line 3, col 7"),
            Some(3)
        );
        assert_eq!(line_number("line 12"), None);
        assert_eq!(line_number("deadline 5 exceeded"), None);
        assert_eq!(line_number("at line 2 in the middle, col x"), None);
        assert_eq!(line_number("ReferenceError: x is not defined"), None);
    }

    #[test]
    fn test_split_position() {
        assert_eq!(
            split_position("expected token ')' at line 4, col 19"),
            Some(("expected token ')'", 4, 19))
        );
        assert_eq!(split_position("no position here"), None);
    }

    fn file_scope(
        temp: &tempfile::TempDir,
        name: &str,
        text: &str,
    ) -> (ExecutionScope, ScriptSource) {
        let path = temp.path().join(name);
        std::fs::write(&path, text).unwrap();
        (scope(), ScriptSource::from_file(name, &path).unwrap())
    }

    #[test]
    fn test_runtime_error_in_file_reports_line() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut scope, script) =
            file_scope(&temp, "lines.js", "var x = 1;\nvar y = 2;\nundefinedFn();\n");
        let err = scope.evaluate(&script).unwrap_err();
        assert_eq!(err.script, "lines.js");
        assert_eq!(err.line, Some(3));
        assert!(err.to_string().starts_with("lines.js:3: "), "{}", err);
    }

    #[test]
    fn test_thrown_message_is_not_mistaken_for_position() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut scope, script) = file_scope(
            &temp,
            "thrown.js",
            "var a = 1;\nthrow new Error('bad input at line 40, col 2');\n",
        );
        let err = scope.evaluate(&script).unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_marked_file_keeps_its_semantics() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut scope, script) = file_scope(
            &temp,
            "ok.js",
            "'use strict';\nvar total = 0;\nfor (var i = 0; i < 4; i++) {\n  total += i;\n}\nvar label = `sum ${total}`;\nlabel",
        );
        let value = scope.evaluate(&script).unwrap();
        assert_eq!(
            value.as_string().map(|s| s.to_std_string_escaped()),
            Some("sum 6".to_string())
        );
    }

    #[test]
    fn test_syntax_error_in_file_reports_parser_line() {
        let temp = tempfile::TempDir::new().unwrap();
        let (mut scope, script) = file_scope(&temp, "bad.js", "var a = 1;\n\nvar = 2;\n");
        let err = scope.evaluate(&script).unwrap_err();
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_host_dirname_is_not_a_script_global() {
        let mut scope = scope();
        let value = scope
            .evaluate(&ScriptSource::bundled(
                "x.js",
                "typeof __dirname + ',' + __hostDirname('/a/b/c.js')",
            ))
            .unwrap();
        assert_eq!(
            value.as_string().map(|s| s.to_std_string_escaped()),
            Some("undefined,/a/b".to_string())
        );
    }

    #[test]
    fn test_globals_persist_between_scripts() {
        let mut scope = scope();
        scope
            .evaluate(&ScriptSource::bundled("a.js", "var shared = 40;"))
            .unwrap();
        let value = scope
            .evaluate(&ScriptSource::bundled("b.js", "shared + 2"))
            .unwrap();
        assert_eq!(value.as_number(), Some(42.0));
    }

    #[test]
    fn test_runtime_error_names_script() {
        let mut scope = scope();
        let err = scope
            .evaluate(&ScriptSource::bundled("broken.js", "notDefined();"))
            .unwrap_err();
        assert_eq!(err.script, "broken.js");
        assert!(err.message.contains("notDefined"), "{}", err.message);
    }

    #[test]
    fn test_syntax_error_is_load_error() {
        let mut scope = scope();
        let err = scope
            .evaluate(&ScriptSource::bundled("syntax.js", "var = ;"))
            .unwrap_err();
        assert_eq!(err.script, "syntax.js");
        assert!(err.to_string().starts_with("syntax.js"));
    }

    #[test]
    fn test_process_env_overlay() {
        let mut env = BTreeMap::new();
        env.insert("JR_TEST_VALUE".to_string(), "configured".to_string());
        let mut scope = ExecutionScope::new(ModuleResolver::default(), &env).unwrap();
        let value = scope
            .evaluate(&ScriptSource::bundled("env.js", "process.env.JR_TEST_VALUE"))
            .unwrap();
        assert_eq!(
            value.as_string().map(|s| s.to_std_string_escaped()),
            Some("configured".to_string())
        );
    }

    #[test]
    fn test_call_global_requires_function() {
        let mut scope = scope();
        scope
            .evaluate(&ScriptSource::bundled("x.js", "var notAFunction = 1;"))
            .unwrap();
        let err = scope.call_global("notAFunction", &[]).unwrap_err();
        assert!(err.message.contains("not a function"));
    }

    #[test]
    fn test_set_global() {
        let mut scope = scope();
        scope.set_global("__specFile", "a/b.test.js").unwrap();
        let value = scope
            .evaluate(&ScriptSource::bundled("x.js", "__specFile"))
            .unwrap();
        assert_eq!(
            value.as_string().map(|s| s.to_std_string_escaped()),
            Some("a/b.test.js".to_string())
        );
    }
}
