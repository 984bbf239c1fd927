use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;
use fern::colors::{Color, ColoredLevelConfig};
use ssac::{
    error::CodegenError,
    middle::lir::{
        interpret::{run_cfg, run_linear},
        parse::parse_module,
        pretty_print::pretty_print_linear,
    },
    options::{AllocatorKind, BlockOrder, CodegenOptions},
    pipeline::compile_function,
};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Files of textual IR
    source_files: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = AllocatorKind::GraphColoring)]
    allocator: AllocatorKind,

    /// Registers available to the graph coloring allocator
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u8).range(1..=15))]
    registers: u8,

    /// Allocate straight from the input CFG without entering SSA form
    #[arg(long)]
    no_ssa: bool,

    #[arg(long, value_enum, default_value_t = BlockOrder::Declaration)]
    order: BlockOrder,

    /// Drop jumps to the block laid out right after
    #[arg(long)]
    elide_jumps: bool,

    /// Run every function on these arguments, before and after compilation
    #[arg(long, num_args = 0.., allow_negative_numbers = true)]
    run: Option<Vec<i64>>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbosity: u8) -> Result<(), fern::InitError> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        3.. => log::LevelFilter::Trace,
    };
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Magenta)
        .trace(Color::Cyan);
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}: {}",
                format!("{}", colors.color(record.level()))
                    .to_lowercase()
                    .bold(),
                message
            ));
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn compile_file(
    source: &str,
    options: &CodegenOptions,
    run: Option<&[i64]>,
) -> Result<(), CodegenError> {
    for (cfg, function) in parse_module(source)? {
        let expected = run.map(|arguments| run_cfg(&cfg, &function, arguments));
        let compiled = compile_function(cfg, function, options)?;

        pretty_print_linear(&compiled.code);

        if let (Some(arguments), Some(expected)) = (run, expected) {
            let actual = run_linear(&compiled.code, &compiled.function, arguments);
            match (&expected, &actual) {
                (Ok(before), Ok(after)) => println!(
                    "{} {:?} before, {:?} after",
                    "result:".green().bold(),
                    before,
                    after
                ),
                _ => println!(
                    "{} {:?} before, {:?} after",
                    "result:".red().bold(),
                    expected,
                    actual
                ),
            }
        }
        println!();
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = init_logger(args.verbose) {
        eprintln!("failed to set up logging: {error}");
    }

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    let options = CodegenOptions {
        allocator: args.allocator,
        registers: args.registers.into(),
        ssa: !args.no_ssa,
        block_order: args.order,
        elide_jumps: args.elide_jumps,
    };

    let mut failed = false;
    for source_file in &args.source_files {
        let source = match std::fs::read_to_string(source_file) {
            Ok(source) => source,
            Err(error) => {
                eprintln!(
                    "{} {}: {error}",
                    "error:".red().bold(),
                    source_file.display()
                );
                failed = true;
                continue;
            }
        };

        if let Err(error) = compile_file(&source, &options, args.run.as_deref()) {
            eprintln!(
                "{} {}: {error}",
                "error:".red().bold(),
                source_file.display()
            );
            failed = true;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
