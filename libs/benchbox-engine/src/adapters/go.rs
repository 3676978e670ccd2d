//! Go adapter: built once per batch, metric lines before the result line.
//!
//! The driver and the solution are compiled together as package `main`.
//! Panics are recovered per call and the solution's stdout is captured
//! through a pipe while the call runs.

use crate::protocol::{Markers, ERROR_RESULT, INPUTS_FILENAME};

pub const IMAGE: &str = "benchbox-go:1.22";
pub const SOLUTION_FILENAME: &str = "solution.go";
pub const DRIVER_FILENAME: &str = "benchbox_driver.go";
pub const CACHE_ENV: &[(&str, &str)] = &[("GOCACHE", "go-build"), ("GOMODCACHE", "go-mod")];
pub const BINARY_NAME: &str = "benchbox_bin";

pub const DOCKERFILE: &str = "FROM golang:1.22-alpine
RUN apk add --no-cache bash coreutils
ENV GOFLAGS=-buildvcs=false CGO_ENABLED=0
WORKDIR /workspace
";

pub fn solution_template(function_name: &str) -> String {
    format!(
        r#"package main

// {function_name} receives JSON-decoded arguments: numbers arrive as float64,
// arrays as []interface{{}} and objects as map[string]interface{{}}.
func {function_name}(param1 interface{{}}, param2 interface{{}}) interface{{}} {{
	// Your solution here
	return nil
}}
"#
    )
}

pub fn build_command() -> Vec<String> {
    ["go", "build", "-o", BINARY_NAME, DRIVER_FILENAME, SOLUTION_FILENAME]
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn run_command() -> Vec<String> {
    vec![format!("./{}", BINARY_NAME)]
}

pub fn batch_driver(function_name: &str, markers: &Markers) -> String {
    format!(
        r#"package main

import (
	"bytes"
	"encoding/json"
	"fmt"
	"io"
	"os"
	"runtime"
	"runtime/debug"
	"strings"
	"time"
)

type benchboxCall struct {{
	value   interface{{}}
	elapsed time.Duration
	memUsed int64
	err     error
}}

func benchboxFatal(out *os.File, msg string) {{
	fmt.Fprintf(os.Stderr, "{fatal} %s\n", msg)
	fmt.Fprintln(out, "{end}")
	os.Exit(1)
}}

func benchboxOneLine(s string) string {{
	return strings.Join(strings.Fields(s), " ")
}}

func benchboxInvoke(args []interface{{}}) (call benchboxCall) {{
	defer func() {{
		if r := recover(); r != nil {{
			call.err = fmt.Errorf("panic: %v", r)
		}}
	}}()

	debug.FreeOSMemory()
	var before, after runtime.MemStats
	runtime.ReadMemStats(&before)
	start := time.Now()
	call.value = {function_name}(args[0], args[1])
	call.elapsed = time.Since(start)
	runtime.ReadMemStats(&after)
	call.memUsed = int64(after.Alloc) - int64(before.Alloc)
	return call
}}

// benchboxCapture runs fn with os.Stdout redirected into a pipe.
func benchboxCapture(fn func()) string {{
	r, w, err := os.Pipe()
	if err != nil {{
		fn()
		return ""
	}}
	saved := os.Stdout
	os.Stdout = w
	done := make(chan string)
	go func() {{
		var buf bytes.Buffer
		io.Copy(&buf, r)
		done <- buf.String()
	}}()
	fn()
	w.Close()
	os.Stdout = saved
	captured := <-done
	r.Close()
	return captured
}}

func main() {{
	out := os.Stdout

	data, err := os.ReadFile("{inputs}")
	if err != nil {{
		benchboxFatal(out, fmt.Sprintf("failed to read {inputs}: %v", err))
	}}
	var batch [][]interface{{}}
	if err := json.Unmarshal(data, &batch); err != nil {{
		benchboxFatal(out, fmt.Sprintf("failed to parse {inputs}: %v", err))
	}}

	for i, args := range batch {{
		if len(args) != 2 {{
			fmt.Fprintf(os.Stderr, "{call_error} case %d: expected 2 arguments, got %d\n", i, len(args))
			fmt.Fprintln(out, `"{error_result}"`)
			fmt.Fprintln(out, "{separator}")
			continue
		}}

		var call benchboxCall
		captured := benchboxCapture(func() {{ call = benchboxInvoke(args) }})

		encoded, marshalErr := json.Marshal(call.value)
		if call.err == nil && marshalErr != nil {{
			call.err = fmt.Errorf("result is not JSON serializable: %v", marshalErr)
		}}
		if call.err != nil {{
			fmt.Fprintf(os.Stderr, "{call_error} case %d: %s\n", i, benchboxOneLine(call.err.Error()))
			fmt.Fprintln(out, `"{error_result}"`)
		}} else {{
			stdoutJSON, _ := json.Marshal(captured)
			fmt.Fprintf(out, "{time} %.6f\n", float64(call.elapsed.Nanoseconds())/1e6)
			fmt.Fprintf(out, "{mem} %d\n", call.memUsed)
			fmt.Fprintf(out, "{stdout} %s\n", stdoutJSON)
			fmt.Fprintln(out, string(encoded))
		}}
		fmt.Fprintln(out, "{separator}")
	}}
	fmt.Fprintln(out, "{end}")
}}
"#,
        fatal = markers.fatal_error,
        end = markers.end_of_batch,
        function_name = function_name,
        inputs = INPUTS_FILENAME,
        call_error = markers.call_error,
        error_result = ERROR_RESULT,
        separator = markers.separator,
        time = markers.time,
        mem = markers.mem,
        stdout = markers.stdout,
    )
}
