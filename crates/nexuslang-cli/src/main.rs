//! The `nexus` command-line driver.
//!
//! Subcommands: `run`, `compile`, `repl`, plus the `tokens` and `ast` debug
//! dumps. Program output goes to stdout, diagnostics to stderr. Exit codes:
//! 0 success, 1 usage error, 2 lex/parse error, 3 runtime error, 4 I/O
//! error, 5 module-format error.

use std::{
    env, fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};

use nexuslang::{
    CompileReport, DefaultHost, ErrorKind, Exception, HostCapabilities as _, ReplSession, Runner, StdPrint,
    Value, dump_ast, dump_tokens, needs_more_input,
};

const USAGE: &str = "usage: nexus <command> [args]

commands:
  run <path>                       interpret a .nx source file
  compile <path> [-o <out>] [--benchmark]
                                   compile to a .nxb module
  repl                             interactive session
  tokens <path>                    dump the token stream (debug)
  ast <path>                       dump the parsed AST (debug)";

const EXIT_USAGE: u8 = 1;
const EXIT_SOURCE: u8 = 2;
const EXIT_RUNTIME: u8 = 3;
const EXIT_IO: u8 = 4;
const EXIT_MODULE: u8 = 5;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        return ExitCode::from(EXIT_USAGE);
    };
    match command.as_str() {
        "run" => cmd_run(&args[1..]),
        "compile" => cmd_compile(&args[1..]),
        "repl" => cmd_repl(),
        "tokens" => cmd_dump(&args[1..], dump_tokens),
        "ast" => cmd_dump(&args[1..], dump_ast),
        other => {
            eprintln!("error: unknown command '{other}'\n{USAGE}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Maps an exception to the documented exit code.
fn exit_code(err: &Exception) -> u8 {
    match err.kind() {
        ErrorKind::LexError | ErrorKind::ParseError => EXIT_SOURCE,
        ErrorKind::ModuleVersionError => EXIT_MODULE,
        ErrorKind::IoError => EXIT_IO,
        _ => EXIT_RUNTIME,
    }
}

fn fail(err: &Exception) -> ExitCode {
    eprintln!("{err}");
    ExitCode::from(exit_code(err))
}

fn read_file(path: &str) -> Result<String, ExitCode> {
    match fs::metadata(path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                eprintln!("error: {path} is not a file");
                return Err(ExitCode::from(EXIT_IO));
            }
        }
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return Err(ExitCode::from(EXIT_IO));
        }
    }
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            Err(ExitCode::from(EXIT_IO))
        }
    }
}

fn single_path(args: &[String]) -> Result<&str, ExitCode> {
    match args {
        [path] => Ok(path),
        _ => {
            eprintln!("{USAGE}");
            Err(ExitCode::from(EXIT_USAGE))
        }
    }
}

fn cmd_run(args: &[String]) -> ExitCode {
    let path = match single_path(args) {
        Ok(path) => path,
        Err(code) => return code,
    };
    let source = match read_file(path) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let runner = match Runner::new(source, path) {
        Ok(runner) => runner,
        Err(err) => return fail(&err),
    };
    match runner.run_default() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => fail(&err),
    }
}

fn cmd_compile(args: &[String]) -> ExitCode {
    let mut path: Option<&str> = None;
    let mut out: Option<PathBuf> = None;
    let mut benchmark = false;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" => match iter.next() {
                Some(value) => out = Some(PathBuf::from(value)),
                None => {
                    eprintln!("error: -o requires a path\n{USAGE}");
                    return ExitCode::from(EXIT_USAGE);
                }
            },
            "--benchmark" => benchmark = true,
            other if path.is_none() && !other.starts_with('-') => path = Some(other),
            other => {
                eprintln!("error: unexpected argument '{other}'\n{USAGE}");
                return ExitCode::from(EXIT_USAGE);
            }
        }
    }
    let Some(path) = path else {
        eprintln!("{USAGE}");
        return ExitCode::from(EXIT_USAGE);
    };
    let source = match read_file(path) {
        Ok(source) => source,
        Err(code) => return code,
    };

    let runner = match Runner::new(source.clone(), path) {
        Ok(runner) => runner,
        Err(err) => return fail(&err),
    };
    // The wall clock is a host capability like any other.
    let timestamp_ms = u64::try_from(DefaultHost.now_ms()).unwrap_or(0);
    let module = match runner.compile(timestamp_ms) {
        Ok(module) => module,
        Err(err) => return fail(&err),
    };
    let bytes = module.to_bytes();

    let out = out.unwrap_or_else(|| Path::new(path).with_extension("nxb"));
    if let Err(err) = fs::write(&out, &bytes) {
        eprintln!("error writing {}: {err}", out.display());
        return ExitCode::from(EXIT_IO);
    }

    let report = CompileReport {
        source_bytes: source.len(),
        module_bytes: bytes.len(),
    };
    eprintln!("compiled {path} -> {}", out.display());
    eprintln!(
        "  source {} bytes, module {} bytes, ratio {:.2}x, estimated speedup {:.2}x (advisory)",
        report.source_bytes,
        report.module_bytes,
        report.compression_ratio(),
        report.estimated_speedup()
    );

    if benchmark {
        const ITERATIONS: u32 = 100;
        let start = Instant::now();
        for _ in 0..ITERATIONS {
            if let Err(err) = Runner::new(source.clone(), path) {
                return fail(&err);
            }
        }
        let elapsed = start.elapsed();
        eprintln!(
            "  parse benchmark: {ITERATIONS} iterations, {:.3} ms/iter",
            elapsed.as_secs_f64() * 1000.0 / f64::from(ITERATIONS)
        );
    }

    ExitCode::SUCCESS
}

fn cmd_repl() -> ExitCode {
    let mut session = ReplSession::new(Box::new(DefaultHost), "<repl>");
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { ">>> " } else { "... " };
        let Some(line) = read_line(prompt) else {
            println!();
            break;
        };

        if pending.is_empty() && line.trim().is_empty() {
            continue;
        }
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);

        if needs_more_input(&pending) {
            continue;
        }

        match session.execute(&pending, &mut StdPrint) {
            Ok(Some(value)) if !matches!(value, Value::Null) => println!("{value}"),
            Ok(_) => {}
            Err(err) => eprintln!("{err}"),
        }
        pending.clear();
    }

    ExitCode::SUCCESS
}

fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    io::stdout().flush().ok()?;
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_owned()),
        Err(_) => None,
    }
}

fn cmd_dump(args: &[String], dump: fn(&str) -> Result<String, Exception>) -> ExitCode {
    let path = match single_path(args) {
        Ok(path) => path,
        Err(code) => return code,
    };
    let source = match read_file(path) {
        Ok(source) => source,
        Err(code) => return code,
    };
    match dump(&source) {
        Ok(text) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => fail(&err.with_script(path)),
    }
}
