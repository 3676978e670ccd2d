//! JavaScript adapter: CommonJS module, result line then metric lines.

use crate::protocol::{Markers, ERROR_RESULT, INPUTS_FILENAME};

pub const IMAGE: &str = "benchbox-javascript:18";
pub const SOLUTION_FILENAME: &str = "solution.js";
pub const DRIVER_FILENAME: &str = "benchbox_driver.js";
pub const CACHE_ENV: &[(&str, &str)] = &[("npm_config_cache", "npm")];

pub const DOCKERFILE: &str = "FROM node:18-alpine
WORKDIR /workspace
";

pub fn solution_template(function_name: &str) -> String {
    format!(
        r#"class Solution {{
    /**
     * @param {{*}} param1
     * @param {{*}} param2
     * @return {{*}}
     */
    {function_name}(param1, param2) {{
        // Your solution here
        return null;
    }}
}}

module.exports = {{ Solution }};
"#
    )
}

pub fn run_command() -> Vec<String> {
    vec!["node".to_string(), DRIVER_FILENAME.to_string()]
}

/// Protocol lines go straight to fd 1 with `writeSync`; anything the
/// solution writes through `process.stdout` during a call is captured, and
/// anything written while the module loads is sent to stderr. A
/// `process.exit()` inside a call fails that case only.
pub fn batch_driver(function_name: &str, markers: &Markers) -> String {
    format!(
        r#""use strict";
const fs = require("fs");

function emit(line) {{
    fs.writeSync(1, line + "\n");
}}

function oneLine(err) {{
    const text = err && err.message ? err.message : String(err);
    return text.split(/\s+/).filter(Boolean).join(" ");
}}

function fatal(message) {{
    fs.writeSync(2, "{fatal} " + message + "\n");
    emit("{end}");
    process.exit(1);
}}

const realWrite = process.stdout.write;
const realExit = process.exit;

let batch;
let solution;
try {{
    process.stdout.write = (chunk, encoding, callback) =>
        process.stderr.write(chunk, encoding, callback);
    const {{ Solution }} = require("./solution");
    solution = new Solution();
    if (typeof solution.{function_name} !== "function") {{
        throw new Error("Solution.{function_name} is not a function");
    }}
    batch = JSON.parse(fs.readFileSync("{inputs}", "utf8"));
}} catch (err) {{
    process.stdout.write = realWrite;
    fatal("failed to load batch: " + oneLine(err));
}} finally {{
    process.stdout.write = realWrite;
}}

batch.forEach((args, i) => {{
    let captured = "";
    let result;
    let timeMs = 0;
    let memBytes = 0;
    let failure = null;

    process.stdout.write = (chunk, encoding, callback) => {{
        captured += typeof chunk === "string" ? chunk : Buffer.from(chunk).toString();
        const done = typeof encoding === "function" ? encoding : callback;
        if (typeof done === "function") done();
        return true;
    }};
    process.exit = (code) => {{
        throw new Error("process.exit(" + (code === undefined ? "" : code) + ")");
    }};
    try {{
        if (!Array.isArray(args) || args.length !== 2) {{
            throw new Error("expected 2 arguments, got " + JSON.stringify(args));
        }}
        const memBefore = process.memoryUsage().heapUsed;
        const start = process.hrtime.bigint();
        result = solution.{function_name}(args[0], args[1]);
        timeMs = Number(process.hrtime.bigint() - start) / 1e6;
        memBytes = process.memoryUsage().heapUsed - memBefore;
    }} catch (err) {{
        failure = err;
    }} finally {{
        process.stdout.write = realWrite;
        process.exit = realExit;
    }}

    let encoded;
    if (failure === null) {{
        try {{
            encoded = JSON.stringify(result === undefined ? null : result);
        }} catch (err) {{
            failure = err;
        }}
    }}

    if (failure === null) {{
        emit(encoded);
        emit("{time} " + timeMs);
        emit("{mem} " + memBytes);
        emit("{stdout} " + JSON.stringify(captured));
    }} else {{
        fs.writeSync(2, "{call_error} case " + i + ": " + oneLine(failure) + "\n");
        emit(JSON.stringify("{error_result}"));
    }}
    emit("{separator}");
}});

emit("{end}");
"#,
        fatal = markers.fatal_error,
        end = markers.end_of_batch,
        function_name = function_name,
        inputs = INPUTS_FILENAME,
        time = markers.time,
        mem = markers.mem,
        stdout = markers.stdout,
        call_error = markers.call_error,
        error_result = ERROR_RESULT,
        separator = markers.separator,
    )
}
