/// End-to-end tests against a real Docker daemon
///
/// These tests verify the whole path for each language:
/// 1. Image build and warm sandbox start
/// 2. Generated drivers speak the protocol the demultiplexer expects
/// 3. Build failures, runtime errors and timeouts map to the right status
/// 4. Sandboxes are cleaned up afterwards

#[cfg(test)]
mod docker_tests {
    use crate::adapters::{AdapterRegistry, LanguageAdapter};
    use crate::docker::DockerRuntime;
    use crate::executor::{BatchTarget, Orchestrator};
    use benchbox_common::config::EngineConfig;
    use benchbox_common::types::{CallArgs, CaseStatus, Language, TestCase};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Setup {
        orchestrator: Orchestrator,
        target: BatchTarget,
        _workdir: TempDir,
        _state: TempDir,
    }

    fn setup(language: Language, problem: &str, solution: &str, run_timeout_secs: u64) -> Setup {
        let workdir = TempDir::new().expect("workdir");
        let state = TempDir::new().expect("state dir");
        std::fs::write(workdir.path().join(LanguageAdapter::solution_filename(&language)), solution)
            .expect("write solution");

        let config = EngineConfig {
            state_dir: state.path().to_path_buf(),
            run_timeout_secs,
            container_sleep_secs: 120,
            ..EngineConfig::default()
        };
        let runtime = Arc::new(DockerRuntime::connect().expect("Docker daemon"));
        let orchestrator = Orchestrator::new(AdapterRegistry::builtin(), runtime, config);

        Setup {
            orchestrator,
            target: BatchTarget {
                platform: "e2e".to_string(),
                problem: problem.to_string(),
                workdir: workdir.path().to_path_buf(),
                function_name: "twoSum".to_string(),
            },
            _workdir: workdir,
            _state: state,
        }
    }

    async fn teardown(setup: &Setup) {
        setup
            .orchestrator
            .sandboxes()
            .shutdown_all("benchbox-e2e")
            .await
            .expect("cleanup");
    }

    fn two_sum_cases() -> Vec<(usize, TestCase)> {
        vec![
            (1, TestCase { input: CallArgs(json!([2, 7, 11, 15]), json!(9)), output: json!([0, 1]) }),
            (2, TestCase { input: CallArgs(json!([3, 2, 4]), json!(6)), output: json!([1, 2]) }),
            (3, TestCase { input: CallArgs(json!([3, 3]), json!(6)), output: json!([0, 1]) }),
        ]
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_python_two_sum() {
        let solution = r#"
class Solution:
    def twoSum(self, nums, target):
        print("searching", target)
        seen = {}
        for i, n in enumerate(nums):
            if target - n in seen:
                return [seen[target - n], i]
            seen[n] = i
        return []
"#;
        let setup = setup(Language::Python, "py-two-sum", solution, 30);

        let report = setup
            .orchestrator
            .run_tests("python", &setup.target, &two_sum_cases())
            .await
            .expect("run tests");

        assert_eq!(report.passed, 3, "{:#?}", report.results);
        assert_eq!(report.results[0].outcome.stdout, "searching 9\n");
        assert!(report.results[0].outcome.time_ms.is_some());

        teardown(&setup).await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_go_build_failure() {
        let solution = "package main\n\nfunc twoSum(a interface{}, b interface{}) interface{} {\n\treturn foo\n}\n";
        let setup = setup(Language::Go, "go-broken", solution, 30);

        let outcomes = setup
            .orchestrator
            .run_batch("go", &setup.target, &[CallArgs(json!([1]), json!(1)), CallArgs(json!([2]), json!(2))])
            .await
            .expect("run batch");

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == CaseStatus::BuildFailed));
        assert!(outcomes[0].error.as_ref().unwrap().contains("undefined: foo"));

        teardown(&setup).await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_javascript_runtime_error_isolated() {
        let solution = r#"
class Solution {
    twoSum(nums, target) {
        if (target < 0) throw new Error("negative target");
        console.log("ok", target);
        return [0, 1];
    }
}
module.exports = { Solution };
"#;
        let setup = setup(Language::JavaScript, "js-errors", solution, 30);
        let request = vec![
            CallArgs(json!([1, 2]), json!(3)),
            CallArgs(json!([1, 2]), json!(-1)),
            CallArgs(json!([1, 2]), json!(3)),
        ];

        let outcomes = setup
            .orchestrator
            .run_batch("js", &setup.target, &request)
            .await
            .expect("run batch");

        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[0].stdout, "ok 3\n");
        assert_eq!(outcomes[1].status, CaseStatus::RuntimeError);
        assert_eq!(outcomes[1].error.as_deref(), Some("negative target"));
        assert!(outcomes[2].is_ok());

        teardown(&setup).await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_python_timeout() {
        let solution = r#"
class Solution:
    def twoSum(self, nums, target):
        while True:
            pass
"#;
        let setup = setup(Language::Python, "py-timeout", solution, 2);

        let outcomes = setup
            .orchestrator
            .run_batch("python", &setup.target, &vec![CallArgs(json!([1]), json!(1)); 2])
            .await
            .expect("run batch");

        assert!(outcomes.iter().all(|o| o.status == CaseStatus::TimedOut));
        assert_eq!(outcomes[0].error.as_deref(), Some("Command timed out after 2 seconds"));

        teardown(&setup).await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_go_profile() {
        let solution = Language::Go.solution_template("twoSum");
        let setup = setup(Language::Go, "go-profile", &solution, 60);

        let profiles = setup
            .orchestrator
            .profile("go", &setup.target, &[(1, CallArgs(json!([1, 2]), json!(3)))], 10)
            .await
            .expect("profile");

        let stats = profiles[0].stats.as_ref().expect("stats");
        assert_eq!(stats.iterations, 10);
        assert!(stats.min_time_ms.unwrap() <= stats.max_time_ms.unwrap());

        teardown(&setup).await;
    }
}

/// Generated drivers run against local interpreters, without Docker
///
/// Each test is skipped when its interpreter is not on PATH.
#[cfg(test)]
mod local_driver_tests {
    use crate::adapters::LanguageAdapter;
    use crate::demux::demultiplex;
    use crate::protocol::INPUTS_FILENAME;
    use crate::runtime::ProcessOutput;
    use benchbox_common::types::{CallArgs, CaseOutcome, CaseStatus, Language};
    use serde_json::json;
    use std::process::Command;
    use tempfile::TempDir;

    fn available(interpreter: &str) -> bool {
        Command::new(interpreter).arg("--version").output().is_ok()
    }

    fn run_driver(
        language: Language,
        interpreter: &[&str],
        solution: &str,
        request: &[CallArgs],
    ) -> Vec<CaseOutcome> {
        let workdir = TempDir::new().unwrap();
        let dir = workdir.path();
        std::fs::write(dir.join(language.solution_filename()), solution).unwrap();
        std::fs::write(dir.join(language.driver_filename()), language.generate_batch_driver("twoSum")).unwrap();
        std::fs::write(dir.join(INPUTS_FILENAME), serde_json::to_string(request).unwrap()).unwrap();

        let out = Command::new(interpreter[0])
            .args(&interpreter[1..])
            .arg(language.driver_filename())
            .current_dir(dir)
            .output()
            .unwrap();

        let output = ProcessOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            exit_code: out.status.code().unwrap_or(-1) as i64,
            timed_out: false,
        };
        demultiplex(&language, &output, request.len())
    }

    fn request() -> Vec<CallArgs> {
        vec![
            CallArgs(json!(1), json!(2)),
            CallArgs(json!(0), json!(0)),
            CallArgs(json!(3), json!(4)),
        ]
    }

    #[test]
    fn test_python_import_output_and_exit_stay_local() {
        if !available("python3") {
            eprintln!("python3 not found, skipping");
            return;
        }
        let solution = r#"
import sys

print("loading module")


class Solution:
    def twoSum(self, a, b):
        if a == 0:
            sys.exit(3)
        print("adding", a)
        return a + b
"#;
        let outcomes = run_driver(Language::Python, &["python3", "-u"], solution, &request());

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].status, CaseStatus::Ok, "{:?}", outcomes[0]);
        assert_eq!(outcomes[0].result, json!(3));
        assert_eq!(outcomes[0].stdout, "adding 1\n");
        assert_eq!(outcomes[1].status, CaseStatus::RuntimeError);
        assert_eq!(outcomes[1].error.as_deref(), Some("SystemExit(3)"));
        assert_eq!(outcomes[2].status, CaseStatus::Ok);
        assert_eq!(outcomes[2].result, json!(7));
    }

    #[test]
    fn test_javascript_import_output_and_exit_stay_local() {
        if !available("node") {
            eprintln!("node not found, skipping");
            return;
        }
        let solution = r#"
console.log("loading module");

class Solution {
    twoSum(a, b) {
        if (a === 0) process.exit(3);
        console.log("adding", a);
        return a + b;
    }
}

module.exports = { Solution };
"#;
        let outcomes = run_driver(Language::JavaScript, &["node"], solution, &request());

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].status, CaseStatus::Ok, "{:?}", outcomes[0]);
        assert_eq!(outcomes[0].result, json!(3));
        assert_eq!(outcomes[0].stdout, "adding 1\n");
        assert_eq!(outcomes[1].status, CaseStatus::RuntimeError);
        assert_eq!(outcomes[1].error.as_deref(), Some("process.exit(3)"));
        assert_eq!(outcomes[2].result, json!(7));
    }
}
