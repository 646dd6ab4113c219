use std::env;
use std::io;
use std::process::ExitCode;

use tilefall_probe::{run, CommandKind, ProbeOptions};

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let mut options = ProbeOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--addr" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --addr".to_string())?;
                options.addr = value.clone();
                index += 2;
            }
            "--timeout-ms" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --timeout-ms".to_string())?;
                options.timeout_ms = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --timeout-ms value '{value}' (expected u64)"))?;
                index += 2;
            }
            "--hero-id" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --hero-id".to_string())?;
                options.hero_id = value
                    .parse::<i64>()
                    .map_err(|_| format!("invalid --hero-id value '{value}' (expected i64)"))?;
                index += 2;
            }
            "--map" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --map".to_string())?;
                options.map = value.clone();
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "poll" => {
            if !command_args.is_empty() {
                return Err("poll takes no arguments".to_string());
            }
            CommandKind::Poll
        }
        "tail" => {
            let mut polls = 10u32;
            let mut interval_ms = 2000u64;
            let mut tail_index = 0usize;
            if let Some(value) = command_args.first() {
                if !value.starts_with("--") {
                    polls = value
                        .parse::<u32>()
                        .map_err(|_| format!("invalid poll count '{value}' (expected u32)"))?;
                    tail_index = 1;
                }
            }
            while tail_index < command_args.len() {
                match command_args[tail_index].as_str() {
                    "--interval-ms" => {
                        let value = command_args.get(tail_index + 1).ok_or_else(|| {
                            "missing value for --interval-ms".to_string()
                        })?;
                        interval_ms = value.parse::<u64>().map_err(|_| {
                            format!("invalid --interval-ms value '{value}' (expected u64)")
                        })?;
                        tail_index += 2;
                    }
                    other => return Err(format!("unknown tail argument '{other}'")),
                }
            }
            CommandKind::Tail { polls, interval_ms }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, options, &mut io::stdout())
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "tilefall_probe - authority poll inspector",
        "",
        "Usage:",
        "  tilefall_probe [--addr <host:port>] [--timeout-ms <u64>] [--hero-id <i64>] [--map <name>] poll",
        "  tilefall_probe [--addr <host:port>] [--timeout-ms <u64>] [--hero-id <i64>] [--map <name>] tail [polls] [--interval-ms <u64>]",
        "",
        "Defaults:",
        "  --addr 127.0.0.1:46801",
        "  --timeout-ms 5000",
        "  --hero-id -1",
        "  --map outskirts",
    ]
    .join("\n")
}
