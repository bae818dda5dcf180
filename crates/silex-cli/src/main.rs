use std::{env, fs, io, process::ExitCode, time::Instant};

use silex::{Context, ParseFlags, dump};

const USAGE: &str = "usage: silex [options] <file.js>
options:
  --module          compile as an ES module
  --strict          force strict mode
  --html-comments   accept Annex-B HTML comments
  --dump-tokens     dump the token stream instead of compiling
  --no-resolve      stop after parsing (placeholder opcodes visible)";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut flags = ParseFlags::empty();
    let mut dump_tokens = false;
    let mut resolve = true;
    let mut file_path = None;
    for arg in &args {
        match arg.as_str() {
            "--module" => flags |= ParseFlags::MODULE,
            "--strict" => flags |= ParseFlags::STRICT,
            "--html-comments" => flags |= ParseFlags::ALLOW_HTML_COMMENTS,
            "--dump-tokens" => dump_tokens = true,
            "--no-resolve" => resolve = false,
            "--help" | "-h" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            _ => {
                if file_path.replace(arg.as_str()).is_some() {
                    eprintln!("{USAGE}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }
    let Some(file_path) = file_path else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let source = match read_file(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {file_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut ctx = Context::new();

    if dump_tokens {
        return match dump::dump_tokens(&mut ctx, &source, file_path, flags) {
            Ok(out) => {
                print!("{out}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{err}");
                ExitCode::FAILURE
            }
        };
    }

    let start = Instant::now();
    let result = if resolve {
        ctx.compile(&source, file_path, flags)
    } else {
        ctx.parse_script(&source, file_path, flags)
    };
    match result {
        Ok(tree) => {
            let elapsed = start.elapsed();
            eprintln!("compiled {} function(s) in {elapsed:?}", tree.len());
            print!("{}", dump::dump_tree(&ctx, &tree));
            ctx.free_tree(tree);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn read_file(path: &str) -> io::Result<String> {
    fs::read_to_string(path)
}
