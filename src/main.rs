use std::cell::RefCell;
use std::io::{IsTerminal, Read};
use std::os::fd::AsFd;
use std::rc::Rc;

use clap::Parser;

use rush::config::{Config, ConfigLoader};
use rush::history::HistoryManager;
use rush::io::StdinInput;
use rush::shell::{self, ShellContext};
use rush::{repl, signals, SHELL_NAME};

/// A small POSIX-flavored shell: pipelines, job control, globbing,
/// command substitution, and enough control flow to be useful.
#[derive(Parser, Debug)]
#[command(name = "rush", version, about)]
struct Args {
    /// Execute a single command line and exit
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,

    /// Script file to run, followed by its positional parameters
    #[arg(trailing_var_arg = true)]
    script: Vec<String>,
}

fn main() {
    let args = Args::parse();
    init_logging();

    let stdin_is_tty = std::io::stdin().is_terminal();
    let interactive = args.command.is_none() && args.script.is_empty() && stdin_is_tty;

    signals::install_shell_handlers();
    let mut ctx = ShellContext::new(interactive);

    if interactive {
        // Make the shell its own process-group leader and give it the
        // terminal; foreground jobs borrow it from here on.
        let pid = nix::unistd::getpid();
        let _ = nix::unistd::setpgid(pid, pid);
        ctx.shell_pgid = pid;
        let _ = nix::unistd::tcsetpgrp(std::io::stdin().as_fd(), pid);
    }

    let config = match ConfigLoader::load_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{SHELL_NAME}: ~/.rushrc: {e}");
            Config::default()
        }
    };
    for (k, v) in &config.env_vars {
        ctx.env.set(k, v);
        ctx.env.export(k);
    }
    ctx.aliases = config.aliases.clone();

    let exit_code = if let Some(command) = args.command {
        run_source(&mut ctx, &command)
    } else if let Some(path) = args.script.first().cloned() {
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                ctx.shell_name = path;
                ctx.push_positionals(args.script[1..].to_vec());
                run_source(&mut ctx, &source)
            }
            Err(e) => {
                eprintln!("{SHELL_NAME}: {path}: {e}");
                127
            }
        }
    } else if !stdin_is_tty {
        // Piped input runs as a script.
        let mut source = String::new();
        match std::io::stdin().read_to_string(&mut source) {
            Ok(_) => run_source(&mut ctx, &source),
            Err(e) => {
                eprintln!("{SHELL_NAME}: {e}");
                1
            }
        }
    } else {
        let history = Rc::new(RefCell::new(HistoryManager::load(
            &config.history_path(),
            config.history_max,
        )));
        ctx.history = history.clone();
        let mut input = StdinInput;
        let code = repl::run(&mut ctx, &config, &mut input);
        if let Err(e) = history.borrow().save() {
            eprintln!("{SHELL_NAME}: could not save history: {e}");
        }
        code
    };
    std::process::exit(exit_code);
}

fn run_source(ctx: &mut ShellContext, source: &str) -> i32 {
    match shell::execute_line(ctx, source) {
        Ok(status) => ctx.pending_exit.unwrap_or(status),
        Err(e) if e.needs_more_input() => {
            eprintln!("{SHELL_NAME}: syntax error: unexpected end of input");
            2
        }
        Err(e) => {
            eprintln!("{SHELL_NAME}: {e}");
            e.status()
        }
    }
}

fn init_logging() {
    let level = std::env::var("RUSH_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(log::LevelFilter::Off);
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
}
