//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `dossier_core` linkage with a deterministic probe.
//! - `parse <text>`: print the parsed requirement items, one per line.
//!
//! Settings come from `DOSSIER_*` environment variables. With
//! `DOSSIER_PARSE_URL` set, `parse` asks that service first.

use dossier_core::{CoreConfig, HttpAgentClient, RequirementParser};
use std::process::ExitCode;

fn main() -> ExitCode {
    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    match args.first().map(String::as_str) {
        Some("parse") => parse(&config, &args[1..].join(" ")),
        _ => {
            println!("dossier_core ping={}", dossier_core::ping());
            println!("dossier_core version={}", dossier_core::core_version());
            println!(
                "dossier_core candidate_limit={} switch_save_timeout_ms={}",
                config.candidate_limit, config.switch_save_timeout_ms
            );
            ExitCode::SUCCESS
        }
    }
}

fn parser_for(config: &CoreConfig) -> RequirementParser {
    if config.parse_url.is_none() {
        return RequirementParser::rules_only();
    }
    match HttpAgentClient::from_config(config) {
        Ok(client) => RequirementParser::with_service(Box::new(client)),
        Err(err) => {
            eprintln!("warning: parse service unavailable, using rules: {err}");
            RequirementParser::rules_only()
        }
    }
}

fn parse(config: &CoreConfig, text: &str) -> ExitCode {
    match parser_for(config).parse(text) {
        Ok(parsed) => {
            for item in parsed.items {
                println!("{}\t{}", item.category, item.label);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
