//! Python adapter: interpreted, one JSON document per chunk.
//!
//! Memory is the tracemalloc peak during the call, time is `perf_counter`
//! around the call only. Output printed by the solution is redirected into
//! the chunk's `stdout` field; output printed at import time goes to stderr.
//! `sys.exit()` inside a call fails that case only.

use crate::protocol::{Markers, ERROR_RESULT, INPUTS_FILENAME};

pub const IMAGE: &str = "benchbox-python:3.12";
pub const SOLUTION_FILENAME: &str = "solution.py";
pub const DRIVER_FILENAME: &str = "benchbox_driver.py";
pub const CACHE_ENV: &[(&str, &str)] = &[("PIP_CACHE_DIR", "pip")];

pub const DOCKERFILE: &str = "FROM python:3.12-slim
ENV PYTHONDONTWRITEBYTECODE=1 PYTHONUNBUFFERED=1
WORKDIR /workspace
";

pub fn solution_template(function_name: &str) -> String {
    format!(
        r#"class Solution:
    def {function_name}(self, param1, param2):
        """
        Replace the parameter names with the problem's own.
        """
        pass
"#
    )
}

pub fn run_command() -> Vec<String> {
    vec![
        "python".to_string(),
        "-u".to_string(),
        DRIVER_FILENAME.to_string(),
    ]
}

pub fn batch_driver(function_name: &str, markers: &Markers) -> String {
    let module = SOLUTION_FILENAME.trim_end_matches(".py");
    format!(
        r#"import contextlib
import io
import json
import sys
import time
import tracemalloc


def fatal(message):
    print("{fatal} " + message, file=sys.stderr)
    print("{end}", flush=True)
    sys.exit(1)


def one_line(err):
    if isinstance(err, SystemExit):
        text = "SystemExit(%r)" % (err.code,)
    else:
        text = str(err) or type(err).__name__
    return " ".join(text.splitlines())


try:
    with contextlib.redirect_stdout(sys.stderr):
        from {module} import Solution

        func = getattr(Solution(), "{function_name}")
    with open("{inputs}", "r") as f:
        batch = json.load(f)
except (Exception, SystemExit) as e:
    fatal("failed to load batch: " + one_line(e))

for i, args in enumerate(batch):
    captured = io.StringIO()
    try:
        if not isinstance(args, list) or len(args) != 2:
            raise TypeError("expected 2 arguments, got %r" % (args,))
        with contextlib.redirect_stdout(captured):
            tracemalloc.start()
            t0 = time.perf_counter()
            result = func(*args)
            t1 = time.perf_counter()
            _, peak = tracemalloc.get_traced_memory()
            tracemalloc.stop()
        chunk = json.dumps({{
            "result": result,
            "stdout": captured.getvalue(),
            "time_ms": (t1 - t0) * 1000,
            "mem_bytes": peak,
            "error": None,
        }})
    except (Exception, SystemExit) as e:
        if tracemalloc.is_tracing():
            tracemalloc.stop()
        print("{call_error} case %d: %s" % (i, one_line(e)), file=sys.stderr)
        chunk = json.dumps({{
            "result": "{error_result}",
            "stdout": captured.getvalue(),
            "time_ms": None,
            "mem_bytes": None,
            "error": one_line(e),
        }})
    print(chunk)
    print("{separator}", flush=True)

print("{end}", flush=True)
"#,
        fatal = markers.fatal_error,
        end = markers.end_of_batch,
        module = module,
        inputs = INPUTS_FILENAME,
        function_name = function_name,
        call_error = markers.call_error,
        error_result = ERROR_RESULT,
        separator = markers.separator,
    )
}
