use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use qlisp::ast::{Expr, Lambda, sym};
use qlisp::builtinops::get_builtin_ops;
use qlisp::host::StdHost;
use qlisp::{Environment, create_global_env, eval, parse};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Interactive interpreter for a small Lisp with Q-expressions
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source files to load before the prompt starts
    files: Vec<PathBuf>,

    /// Exit after loading the files instead of starting the prompt
    #[arg(long)]
    batch: bool,

    /// Prompt shown for each input line
    #[arg(long, default_value = "qlisp> ")]
    prompt: String,

    /// Log filter used when QLISP_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let env = create_global_env(Rc::new(StdHost));

    let mut all_loaded = true;
    for file in &cli.files {
        all_loaded &= load_file(&env, file);
    }

    if cli.batch {
        return if all_loaded {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    match run_repl(&env, &cli.prompt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("qlisp: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Install the stderr subscriber; `QLISP_LOG` takes precedence over `default_level`
fn init_tracing(default_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_env("QLISP_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

/// Load a file through the `load` builtin; returns whether the file could be read
fn load_file(env: &Environment, file: &std::path::Path) -> bool {
    let path = file.to_string_lossy().into_owned();
    tracing::info!(path = %path, "loading file");

    let result = eval(env, Expr::SExpr(vec![sym("load"), Expr::Str(path)]));
    if result.is_error() {
        println!("{result}");
        return false;
    }
    true
}

fn run_repl(env: &Environment, prompt: &str) -> Result<(), ReadlineError> {
    println!("qlisp {}", env!("CARGO_PKG_VERSION"));
    println!("Enter expressions like: (+ 1 2) or head {{1 2 3}}");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Add the line to history
                let _ = rl.add_history_entry(line);

                // Handle special commands
                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                println!("{}", eval(env, parse(line)));
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Builtins:");
    for op in get_builtin_ops() {
        println!("  {:<8} {}", op.id, op.arity);
    }
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (def {{add}} (\\ {{x y}} {{+ x y}}))");
    println!("  (def {{add5}} (add 5))");
    println!("  (eval (head {{(+ 1 2) (+ 10 20)}}))");
    println!("  (load \"prelude.ql\")");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Expr::Lambda(Lambda::Builtin(_)) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    // Print built-in functions
    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    // Print user-defined values
    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
