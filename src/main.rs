use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use dynalox::VM;

/// Run a script, or start a REPL when no script is given.
#[derive(Parser, Debug)]
#[command(name = "dynalox", version)]
struct Cli {
    /// Script file to run.
    script: Option<PathBuf>,

    /// Print the compiled bytecode instead of running the script.
    #[arg(long, requires = "script")]
    disassemble: bool,
}

fn repl() {
    let mut vm = VM::new();
    let mut line = String::new();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        line.clear();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            // Errors are already reported; the session keeps its globals and carries on.
            Ok(_) => {
                let _ = vm.interpret(&line);
            }
            Err(error) => {
                eprintln!("Error reading line: {}", error);
                process::exit(74);
            }
        }
    }
}

fn read_source(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            eprintln!("Could not read file \"{}\": {}", path.display(), error);
            process::exit(74);
        }
    }
}

fn run_file(path: &Path) {
    let source = read_source(path);

    let mut vm = VM::new();
    if let Err(error) = vm.interpret(&source) {
        process::exit(error.exit_code());
    }
}

fn disassemble_file(path: &Path) {
    let source = read_source(path);

    let mut vm = VM::new();
    match vm.disassemble(&source) {
        Ok(listing) => print!("{}", listing),
        Err(error) => process::exit(error.exit_code()),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => error.exit(),
        Err(error) => {
            let _ = error.print();
            process::exit(64);
        }
    };

    match (cli.script, cli.disassemble) {
        (Some(path), true) => disassemble_file(&path),
        (Some(path), false) => run_file(&path),
        (None, _) => repl(),
    }
}
