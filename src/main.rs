// Main CLI entry point for pocscan
// Uses clap for argument parsing

use clap::{Arg, ArgAction, ArgGroup, Command};
use pocscan::client::HttpClient;
use pocscan::config::ScanConfig;
use pocscan::engine::ScanContext;
use pocscan::expr::CelLite;
use pocscan::loader::{load_plugins, DirectoryStore, Selection};
use pocscan::logging::init_logging;
use pocscan::models::Request;
use pocscan::pool::MessagePool;
use pocscan::reporting::{export_csv, export_json, export_markdown};
use pocscan::scanner::Scanner;
use pocscan::targets::{target_from_raw, target_from_url, targets_from_file};
use pocscan::verdict::ExecutionResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

fn cli() -> Command {
    Command::new("pocscan")
        .version(clap::crate_version!())
        .author("Jake Abendroth")
        .about("Rule-driven HTTP vulnerability scanner")
        .after_help("EXAMPLES:\n  pocscan -u http://target:8080/ \n  pocscan -l multi -o poc-db-001,poc-db-002 -f urls.txt --workers 32\n  pocscan -l affects -o server -r request.txt --proxy http://127.0.0.1:8080 --json-report")
        .arg(Arg::new("load")
            .short('l')
            .long("load")
            .num_args(1)
            .default_value("")
            .help("Rule selection: single, multi, affects, all (default: every enabled rule)"))
        .arg(Arg::new("condition")
            .short('o')
            .long("condition")
            .num_args(1)
            .default_value("")
            .help("Selection argument: a rule id, comma separated ids, or an affects category"))
        .arg(Arg::new("url")
            .short('u')
            .long("url")
            .num_args(1)
            .help("Single URL to scan"))
        .arg(Arg::new("url_file")
            .short('f')
            .long("url-file")
            .num_args(1)
            .help("File with one URL per line"))
        .arg(Arg::new("url_raw")
            .short('r')
            .long("url-raw")
            .num_args(1)
            .help("File holding a raw HTTP request to use as the target"))
        .group(ArgGroup::new("target").args(["url", "url_file", "url_raw"]))
        .arg(Arg::new("plugins")
            .short('p')
            .long("plugins")
            .num_args(1)
            .help("Directory of rule documents (default: plugins)"))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .num_args(1)
            .help("JSON configuration file"))
        .arg(Arg::new("workers")
            .short('w')
            .long("workers")
            .num_args(1)
            .value_parser(clap::value_parser!(usize))
            .help("Rules executed concurrently (default: 10)"))
        .arg(Arg::new("timeout")
            .short('t')
            .long("timeout")
            .num_args(1)
            .value_parser(clap::value_parser!(u64))
            .help("Per-request timeout in seconds (default: 10)"))
        .arg(Arg::new("proxy")
            .long("proxy")
            .num_args(1)
            .help("Upstream proxy URL for every probe"))
        .arg(Arg::new("report_dir")
            .long("report-dir")
            .num_args(1)
            .default_value(".")
            .help("Directory for report files"))
        .arg(Arg::new("csv_report")
            .long("csv-report")
            .action(ArgAction::SetTrue)
            .help("Write a CSV report"))
        .arg(Arg::new("markdown_report")
            .long("markdown-report")
            .action(ArgAction::SetTrue)
            .help("Write a Markdown report"))
        .arg(Arg::new("json_report")
            .long("json-report")
            .action(ArgAction::SetTrue)
            .help("Write a JSON report"))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::SetTrue)
            .help("Debug logging"))
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}

fn print_result(r: &ExecutionResult) {
    println!("{}", r.summary());
    if r.matched() {
        if let Some(raw) = &r.raw_request {
            println!("--- request ---\n{}", raw.trim_end());
        }
        if let Some(raw) = &r.raw_response {
            println!("--- response ---\n{}", raw.trim_end());
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    // File first, flags on top
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::load(Path::new(path)).unwrap_or_else(|e| fail(e)),
        None => ScanConfig::default(),
    };
    if let Some(dir) = matches.get_one::<String>("plugins") {
        config.plugin_dir = PathBuf::from(dir);
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.workers = *workers;
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.timeout = *timeout;
    }
    if let Some(proxy) = matches.get_one::<String>("proxy") {
        config.proxy = Some(proxy.clone());
    }

    init_logging(matches.get_flag("verbose"), config.log_level.as_deref());

    let targets: Vec<Request> = if let Some(url) = matches.get_one::<String>("url") {
        vec![target_from_url(url, &config.user_agent).unwrap_or_else(|e| fail(e))]
    } else if let Some(path) = matches.get_one::<String>("url_file") {
        targets_from_file(Path::new(path), &config.user_agent).unwrap_or_else(|e| fail(e))
    } else if let Some(path) = matches.get_one::<String>("url_raw") {
        let raw = std::fs::read(path).unwrap_or_else(|e| fail(format!("read {}: {}", path, e)));
        vec![target_from_raw(&raw, &config.user_agent).unwrap_or_else(|e| fail(e))]
    } else {
        println!("Use -h for help");
        return;
    };

    let evaluator = Arc::new(CelLite::new());
    let selection = Selection::parse(
        matches.get_one::<String>("load").map(String::as_str).unwrap_or_default(),
        matches.get_one::<String>("condition").map(String::as_str).unwrap_or_default(),
    );
    let store = DirectoryStore::new(&config.plugin_dir);
    let plugins = load_plugins(&store, &selection, evaluator.as_ref()).unwrap_or_else(|e| fail(e));
    info!(rules = plugins.len(), dir = %config.plugin_dir.display(), "plugins loaded");
    if plugins.is_empty() {
        println!("No rules selected.");
        return;
    }

    let pool = MessagePool::new(config.pool_max_idle);
    let client = HttpClient::new(config.client_config(), pool.clone()).unwrap_or_else(|e| fail(e));
    let ctx = Arc::new(ScanContext::new(client, evaluator, pool));
    let scanner = Scanner::new(ctx, config.workers).unwrap_or_else(|e| fail(e));

    let targets: Vec<Arc<Request>> = targets.into_iter().map(Arc::new).collect();
    let results = scanner.run_many(&targets, &plugins).await;
    for r in &results {
        print_result(r);
    }
    let matched = results.iter().filter(|r| r.matched()).count();
    println!("\n{} checks, {} vulnerable.", results.len(), matched);

    let report_dir = PathBuf::from(matches.get_one::<String>("report_dir").map(String::as_str).unwrap_or("."));
    let exports: [(&str, bool, fn(&[ExecutionResult], &Path) -> std::io::Result<PathBuf>); 3] = [
        ("CSV", matches.get_flag("csv_report"), export_csv),
        ("Markdown", matches.get_flag("markdown_report"), export_markdown),
        ("JSON", matches.get_flag("json_report"), export_json),
    ];
    for (kind, wanted, export) in exports {
        if !wanted {
            continue;
        }
        match export(&results, &report_dir) {
            Ok(path) => println!("{} report written to {}", kind, path.display()),
            Err(e) => error!(kind, error = %e, "failed to write report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_scan_flags() {
        let m = cli()
            .try_get_matches_from(["pocscan", "-l", "multi", "-o", "a,b", "-u", "h", "--workers", "4", "--json-report"])
            .unwrap();
        assert_eq!(m.get_one::<String>("load").unwrap(), "multi");
        assert_eq!(*m.get_one::<usize>("workers").unwrap(), 4);
        assert!(m.get_flag("json_report"));
        assert!(!m.get_flag("csv_report"));
    }

    #[test]
    fn target_sources_are_exclusive() {
        assert!(cli().try_get_matches_from(["pocscan", "-u", "h", "-f", "urls.txt"]).is_err());
    }
}
