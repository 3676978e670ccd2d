// CLI commands: thin wrappers that load problems and call the orchestrator

use crate::cache::CacheDir;
use crate::output;
use crate::problem::{Implementation, ProblemStore};
use anyhow::{bail, Context, Result};
use benchbox_common::cases::parse_case_selection;
use benchbox_common::config::EngineConfig;
use benchbox_common::naming::SANDBOX_PREFIX;
use benchbox_common::types::TestCase;
use benchbox_engine::{AdapterRegistry, BatchTarget, DockerRuntime, Orchestrator};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::info;

fn orchestrator(config: &EngineConfig) -> Result<Orchestrator> {
    let runtime = DockerRuntime::connect()?;
    Ok(Orchestrator::new(
        AdapterRegistry::builtin(),
        Arc::new(runtime),
        config.clone(),
    ))
}

/// Resolve `language` to its canonical adapter name
fn canonical_language(language: &str) -> Result<String> {
    let adapter = AdapterRegistry::builtin().resolve(language)?;
    Ok(adapter.name().to_string())
}

/// Numbered test cases picked by `--cases`, in case order
fn select_cases(testcases: &[TestCase], selection: Option<&str>) -> Result<Vec<(usize, TestCase)>> {
    let selected = parse_case_selection(selection, testcases.len());
    if selected.is_empty() {
        bail!("No test cases selected ({} available)", testcases.len());
    }
    Ok(selected
        .into_iter()
        .map(|n| (n, testcases[n - 1].clone()))
        .collect())
}

pub fn init(config: &EngineConfig, platform: &str, problem: &str, language: &str, function: &str) -> Result<()> {
    let registry = AdapterRegistry::builtin();
    let adapter = registry.resolve(language)?;
    let store = ProblemStore::new(&config.problems_dir);

    println!("🚀 Initializing {}/{} ({})", platform, problem, adapter.name());

    let mut file = store.load_or_default(platform, problem)?;
    file.implementations.insert(
        adapter.name().to_string(),
        Implementation {
            function: function.to_string(),
        },
    );
    store.save(platform, problem, &file)?;
    println!("  ✅ Wrote testcases.json");

    let dir = store.solution_dir(platform, problem, adapter.name());
    if store.write_solution(&dir, adapter.solution_filename(), &adapter.solution_template(function))? {
        println!("  ✅ Created {}", dir.join(adapter.solution_filename()).display());
    } else {
        println!("  ⚠ Kept existing {}", dir.join(adapter.solution_filename()).display());
    }

    println!("\n📋 Next steps:");
    println!("  1. Add test cases to {}", store.problem_dir(platform, problem).join("testcases.json").display());
    println!("  2. Implement {} in {}", function, adapter.solution_filename());
    println!("  3. Run: benchbox test {} {} --language {}", platform, problem, adapter.name());
    Ok(())
}

fn target(config: &EngineConfig, platform: &str, problem: &str, language: &str, function: &str) -> BatchTarget {
    let store = ProblemStore::new(&config.problems_dir);
    BatchTarget {
        platform: platform.to_string(),
        problem: problem.to_string(),
        workdir: store.solution_dir(platform, problem, language),
        function_name: function.to_string(),
    }
}

/// Returns whether every selected case passed
pub async fn test(
    config: &EngineConfig,
    platform: &str,
    problem: &str,
    language: &str,
    cases: Option<&str>,
) -> Result<bool> {
    let language = canonical_language(language)?;
    let file = ProblemStore::new(&config.problems_dir).load(platform, problem)?;
    let selected = select_cases(&file.testcases, cases)?;
    let target = target(config, platform, problem, &language, file.function_for(&language)?);

    println!("→ Testing {}/{} ({}) on {} case(s)", platform, problem, language, selected.len());
    let report = orchestrator(config)?
        .run_tests(&language, &target, &selected)
        .await
        .context("Test run failed")?;

    output::print_test_report(&report);
    Ok(report.all_passed())
}

pub async fn profile(
    config: &EngineConfig,
    platform: &str,
    problem: &str,
    language: &str,
    iterations: Option<usize>,
    cases: Option<&str>,
) -> Result<()> {
    let language = canonical_language(language)?;
    let file = ProblemStore::new(&config.problems_dir).load(platform, problem)?;
    let selected = select_cases(&file.testcases, cases)?;
    let target = target(config, platform, problem, &language, file.function_for(&language)?);
    let iterations = iterations.unwrap_or(config.profile_iterations);

    println!(
        "→ Profiling {}/{} ({}) on {} case(s), {} runs each",
        platform,
        problem,
        language,
        selected.len(),
        iterations
    );

    let inputs: Vec<_> = selected
        .into_iter()
        .map(|(n, tc)| (n, tc.input))
        .collect();
    let profiles = orchestrator(config)?
        .profile(&language, &target, &inputs, iterations)
        .await
        .context("Profiling failed")?;

    output::print_profiles(&profiles);
    Ok(())
}

pub async fn cleanup(config: &EngineConfig, idle_secs: Option<u64>) -> Result<()> {
    let orchestrator = orchestrator(config)?;
    let sandboxes = orchestrator.sandboxes();

    let removed = match idle_secs {
        Some(secs) => {
            info!(idle_secs = secs, "Reaping idle sandboxes");
            sandboxes.reap_idle(SANDBOX_PREFIX, Duration::from_secs(secs)).await?
        }
        None => sandboxes.shutdown_all(SANDBOX_PREFIX).await?,
    };

    if removed.is_empty() {
        println!("No sandboxes to clean up");
    } else {
        for name in &removed {
            println!("  ✅ Removed {}", name);
        }
        println!("Removed {} sandbox(es)", removed.len());
    }
    Ok(())
}

fn cache_dir(config: &EngineConfig) -> Result<CacheDir> {
    match &config.cache_dir {
        Some(dir) => Ok(CacheDir::new(dir)),
        None => bail!("No cache_dir configured; set \"cache_dir\" in benchbox.json"),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub fn cache_show(config: &EngineConfig) -> Result<()> {
    let cache = cache_dir(config)?;
    if !cache.exists() {
        println!("⚠ No cache directory found at {}", cache.root().display());
        return Ok(());
    }

    println!("Cache location: {}", cache.root().display());
    println!("Total size:     {}", output::format_memory(cache.total_bytes()? as f64));

    let stats = cache.stats()?;
    if !stats.is_empty() {
        println!("\nUsage by cache:");
        for entry in &stats {
            println!("  {:<12} {}", entry.name, output::format_memory(entry.bytes as f64));
        }
    }
    Ok(())
}

pub fn cache_stats(config: &EngineConfig) -> Result<()> {
    let cache = cache_dir(config)?;
    if !cache.exists() {
        println!("⚠ No cache directory found at {}", cache.root().display());
        return Ok(());
    }
    output::print_cache_stats(&cache.stats()?);
    Ok(())
}

/// Clear the caches of `language`, or every cache for `None` / `"all"`
pub fn cache_clear(config: &EngineConfig, language: Option<&str>, force: bool) -> Result<()> {
    let cache = cache_dir(config)?;
    let language = language.filter(|l| !l.eq_ignore_ascii_case("all"));
    let adapter = language
        .map(|name| AdapterRegistry::builtin().resolve(name))
        .transpose()?;
    let dirs: Option<Vec<&str>> = adapter
        .as_ref()
        .map(|a| a.cache_env().iter().map(|(_, dir)| *dir).collect());

    if !cache.exists() {
        println!("⚠ No cache directory found at {}", cache.root().display());
        return Ok(());
    }

    if !force && !confirm(&format!("Clear {} cache?", language.unwrap_or("all")))? {
        println!("Operation cancelled");
        return Ok(());
    }

    let removed = cache.clear(dirs.as_deref())?;
    if removed.is_empty() {
        println!("⚠ Nothing to clear");
    } else {
        println!("  ✅ Cleared {}", removed.join(", "));
    }
    Ok(())
}

pub fn cache_clean(config: &EngineConfig, days: u64, force: bool) -> Result<()> {
    let cache = cache_dir(config)?;
    if !cache.exists() {
        println!("⚠ No cache directory found at {}", cache.root().display());
        return Ok(());
    }

    if !force && !confirm(&format!("Remove cache files older than {} days?", days))? {
        println!("Operation cancelled");
        return Ok(());
    }

    let max_age = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
    let summary = cache.clean_older_than(max_age, SystemTime::now())?;
    if summary.files_removed == 0 {
        println!("No files older than {} days found", days);
    } else {
        println!(
            "  ✅ Removed {} files older than {} days, freed {}",
            summary.files_removed,
            days,
            output::format_memory(summary.bytes_freed as f64)
        );
    }
    Ok(())
}

pub fn languages() {
    let registry = AdapterRegistry::builtin();
    println!("Supported languages:");
    for adapter in registry.iter() {
        let aliases = adapter.aliases();
        if aliases.is_empty() {
            println!("  {:<12} {}", adapter.name(), adapter.image());
        } else {
            println!(
                "  {:<12} {}  (aliases: {})",
                adapter.name(),
                adapter.image(),
                aliases.join(", ")
            );
        }
    }
}
