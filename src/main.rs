//! CloudLab - DevOps 训练演示栈
//!
//! Usage:
//! - Demo mode (all three services): `cloudlab`
//! - Single role: `cloudlab rds-api`, `cloudlab cache-api`, `cloudlab frontend`
//! - Delivery agent: `cloudlab agent`
//! - One-shot pipeline run: `cloudlab release --commit <sha>`
//! - Publish without rollout: `cloudlab release --skip-rollout`

use cloudlab::{Role, RuntimeConfig};

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "rds-api" => {
                config.role = Role::RdsApi;
                i += 1;
            }
            "cache-api" => {
                config.role = Role::CacheApi;
                i += 1;
            }
            "frontend" => {
                config.role = Role::Frontend;
                i += 1;
            }
            "agent" => {
                config.role = Role::Agent;
                i += 1;
            }
            "release" => {
                config.role = Role::Release;
                i += 1;
            }
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--commit" if i + 1 < args.len() => {
                config.commit_ref = Some(args[i + 1].clone());
                i += 2;
            }
            "--skip-rollout" => {
                config.skip_rollout = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("CloudLab - DevOps training demo stack");
    println!();
    println!("USAGE:");
    println!("    cloudlab [ROLE] [OPTIONS]");
    println!();
    println!("ROLES:");
    println!("    (none)           Demo mode: rds-api + cache-api + frontend");
    println!("    rds-api          Relational health backend (default port 8000)");
    println!("    cache-api        Cache health backend (default port 8001)");
    println!("    frontend         Static probe frontend (default port 8080)");
    println!("    agent            Delivery agent with pipeline API (default port 9000)");
    println!("    release          Run the delivery pipeline once and exit");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>        Override the listening port");
    println!("    --commit <SHA>       Commit ref used to tag images (release/agent)");
    println!("    --skip-rollout       Publish images but skip the remote rollout");
    println!("    -h, --help           Print help information");
    println!();
    println!("EXAMPLES:");
    println!("    cloudlab                          # Local demo stack");
    println!("    cloudlab rds-api --port 18000     # Custom port");
    println!("    cloudlab release --commit $(git rev-parse --short HEAD)");
}

fn main() {
    let config = parse_args();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let code = rt.block_on(cloudlab::init_and_run(config));

    if code != 0 {
        std::process::exit(code);
    }
}
