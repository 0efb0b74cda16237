mod disassembler;
mod output;

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Arg, ArgAction, ArgMatches, Command};
use shroud_core::{
    ShroudResult, ast,
    bytecode::disasm,
    chunk::{CancellationToken, FailurePolicy},
    error::IoError,
    ir,
    options::ObfuscationOptions,
    pipeline::{self, ObfuscationResult},
    progress::Progress,
    script::{self, Script},
    vm::Vm,
};

use crate::{
    disassembler::DisasmOptions,
    output::{FormatStyle, metrics_table, print_table, progress_bar, update_bar},
};

fn main() -> ExitCode {
    let cli = Command::new("shroud")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Obfuscating compiler from Lua source to a self-contained Lua VM")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .help("Log pipeline phases to stderr")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue),
        );

    let matches = setup_cli(cli).get_matches();
    init_logging(matches.get_flag("verbose"));

    let style = FormatStyle::default();
    match dispatch_commands(&matches, &style) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            style.error(error.as_ref());
            ExitCode::FAILURE
        }
    }
}

/// Warnings only by default, debug with `--verbose`. `RUST_LOG` overrides both.
fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_module("shroud_core", level)
        .filter_module("shroud", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Registers the `build`, `run` and `disasm` subcommands.
fn setup_cli(cli: Command) -> Command {
    cli.subcommand(
        option_args(
            Command::new("build")
                .about("Obfuscate Lua scripts")
                .arg(
                    Arg::new("files")
                        .help("Script files or glob patterns")
                        .required(true)
                        .num_args(1..)
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    Arg::new("output")
                        .help("Output file, or a directory when several scripts are built")
                        .short('o')
                        .long("output")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_name("OUT"),
                )
                .arg(
                    Arg::new("dump")
                        .help("Print an intermediate stage instead of building")
                        .short('d')
                        .long("dump")
                        .value_parser(["ast", "ir", "bytecode"])
                        .value_name("STAGE"),
                )
                .arg(
                    Arg::new("metrics")
                        .help("Report build metrics on stderr")
                        .long("metrics")
                        .value_parser(["json", "table"])
                        .value_name("FORMAT"),
                ),
        ),
    )
    .subcommand(
        option_args(
            Command::new("run")
                .about("Compile a script and execute it on the reference VM")
                .arg(Arg::new("file").help("The script to run").required(true).index(1))
                .arg(
                    Arg::new("step-limit")
                        .help("Abort after this many VM instructions")
                        .long("step-limit")
                        .value_parser(clap::value_parser!(usize))
                        .value_name("N"),
                ),
        ),
    )
    .subcommand(
        option_args(
            Command::new("disasm")
                .about("Print the bytecode listing of a script")
                .arg(Arg::new("file").help("The script to disassemble").required(true).index(1))
                .arg(
                    Arg::new("bytes")
                        .help("Show the encoded opcode byte")
                        .long("bytes")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("raw")
                        .help("Plain listing without table layout")
                        .long("raw")
                        .action(ArgAction::SetTrue),
                ),
        ),
    )
}

/// Flags shared by every subcommand that compiles: a preset or config file
/// as the base, then per-setting overrides.
fn option_args(cmd: Command) -> Command {
    let flag = |name: &'static str, help: &'static str| Arg::new(name).help(help).long(name).action(ArgAction::SetTrue);
    cmd.arg(
        Arg::new("preset")
            .help("Starting point for the options")
            .long("preset")
            .value_parser(["minimal", "default", "maximum"])
            .value_name("NAME"),
    )
    .arg(
        Arg::new("config")
            .help("JSON options file; replaces the preset")
            .short('c')
            .long("config")
            .value_parser(clap::value_parser!(PathBuf))
            .value_name("FILE"),
    )
    .arg(
        Arg::new("seed")
            .help("Fixed seed for a reproducible build")
            .long("seed")
            .value_parser(clap::value_parser!(u64))
            .value_name("N"),
    )
    .arg(
        Arg::new("dialect")
            .help("Target Lua dialect")
            .long("dialect")
            .value_parser(["lua51", "lua53", "luau"]),
    )
    .arg(
        Arg::new("environment")
            .help("How the program sees globals")
            .long("environment")
            .value_parser(["passthrough", "isolated", "sandbox"]),
    )
    .arg(
        Arg::new("anti-debug")
            .help("Reaction to a detected debugger")
            .long("anti-debug")
            .value_parser(["off", "abort", "degrade"]),
    )
    .arg(
        Arg::new("garbage")
            .help("Garbage density between 0 and 1")
            .long("garbage")
            .value_parser(clap::value_parser!(f64))
            .value_name("DENSITY"),
    )
    .arg(
        Arg::new("workers")
            .help("Worker threads for chunked inputs")
            .long("workers")
            .value_parser(clap::value_parser!(usize))
            .value_name("N"),
    )
    .arg(
        Arg::new("threshold")
            .help("Inputs larger than this many bytes are chunked")
            .long("threshold")
            .value_parser(clap::value_parser!(usize))
            .value_name("BYTES"),
    )
    .arg(
        Arg::new("chunk-size")
            .help("Target chunk size in bytes")
            .long("chunk-size")
            .value_parser(clap::value_parser!(usize))
            .value_name("BYTES"),
    )
    .arg(flag("flatten", "Flatten top-level control flow"))
    .arg(flag("no-strings", "Keep string constants readable"))
    .arg(flag("no-numbers", "Keep numeric constants readable"))
    .arg(flag("encrypt-booleans", "Mask boolean constants"))
    .arg(flag("no-rename", "Keep identifier names readable"))
    .arg(flag("no-shuffle", "Use the canonical opcode numbering"))
    .arg(flag("polymorphic", "Re-key opcodes for every build"))
    .arg(flag("no-integrity", "Skip the bytecode integrity check"))
    .arg(flag("stack-hardening", "Split the VM stack in two"))
    .arg(flag("report-gaps", "Keep going when a chunk fails and mark the gap"))
}

fn options_from(m: &ArgMatches) -> ShroudResult<ObfuscationOptions> {
    let mut options = match (m.get_one::<PathBuf>("config"), m.get_one::<String>("preset")) {
        (Some(path), _) => ObfuscationOptions::from_json_file(path)?,
        (None, Some(name)) => ObfuscationOptions::preset(name)?,
        (None, None) => ObfuscationOptions::default(),
    };

    if let Some(seed) = m.get_one::<u64>("seed") {
        options.seed = Some(*seed);
    }
    if let Some(dialect) = m.get_one::<String>("dialect") {
        options.dialect = dialect.parse()?;
    }
    if let Some(environment) = m.get_one::<String>("environment") {
        options.environment = environment.parse()?;
    }
    if let Some(mode) = m.get_one::<String>("anti-debug") {
        options.anti_debug = mode.parse()?;
    }
    if let Some(density) = m.get_one::<f64>("garbage") {
        options.garbage_density = *density;
    }
    if let Some(workers) = m.get_one::<usize>("workers") {
        options.chunking.workers = *workers;
    }
    if let Some(threshold) = m.get_one::<usize>("threshold") {
        options.chunking.threshold_bytes = *threshold;
    }
    if let Some(size) = m.get_one::<usize>("chunk-size") {
        options.chunking.chunk_size = Some(*size);
    }
    options.flatten_control_flow |= m.get_flag("flatten");
    options.encrypt_strings &= !m.get_flag("no-strings");
    options.encrypt_numbers &= !m.get_flag("no-numbers");
    options.encrypt_booleans |= m.get_flag("encrypt-booleans");
    options.rename_identifiers &= !m.get_flag("no-rename");
    options.shuffle_opcodes &= !m.get_flag("no-shuffle");
    options.opcode_polymorphism |= m.get_flag("polymorphic");
    options.integrity_check &= !m.get_flag("no-integrity");
    options.stack_hardening |= m.get_flag("stack-hardening");
    if m.get_flag("report-gaps") {
        options.chunking.failure_policy = FailurePolicy::ReportGaps;
    }

    options.validate()?;
    Ok(options)
}

/// Dispatches the command based on the parsed arguments.
fn dispatch_commands(matches: &ArgMatches, style: &FormatStyle) -> ShroudResult<()> {
    match matches.subcommand() {
        Some(("build", sub_m)) => build_command(sub_m, style),
        Some(("run", sub_m)) => run_command(sub_m, style),
        Some(("disasm", sub_m)) => disasm_command(sub_m),
        _ => {
            style.warning("No valid subcommand was used. Use --help for more information.");
            Ok(())
        }
    }
}

fn build_command(m: &ArgMatches, style: &FormatStyle) -> ShroudResult<()> {
    let options = options_from(m)?;
    let patterns: Vec<String> = m.get_many::<String>("files").map(|v| v.cloned().collect()).unwrap_or_default();
    let workdir = std::env::current_dir().map_err(|e| IoError::at(Path::new("."), &e).boxed())?;
    let scripts = script::collect(&patterns, &workdir)?;

    if let Some(stage) = m.get_one::<String>("dump") {
        for script in &scripts {
            print!("{}", dump_stage(script, &options, stage)?);
        }
        return Ok(());
    }

    let output = m.get_one::<PathBuf>("output");
    let several = scripts.len() > 1;
    if let (true, Some(dir)) = (several, output) {
        fs::create_dir_all(dir).map_err(|e| IoError::at(dir, &e).boxed())?;
    }

    for script in &scripts {
        let result = obfuscate_with_progress(script, &options)?;
        for gap in &result.gaps {
            style.warning(&format!(
                "{}: chunk {} ({}) left unobfuscated: {}",
                script.name,
                gap.index + 1,
                gap.range,
                gap.message
            ));
        }

        match output {
            None => print!("{}", result.output),
            Some(path) => {
                let target = if several { path.join(obfuscated_name(script)) } else { path.clone() };
                fs::write(&target, &result.output).map_err(|e| IoError::at(&target, &e).boxed())?;
                style.success(&format!(
                    "{} -> {} ({} bytes, seed {})",
                    script.name,
                    target.display(),
                    result.metrics.output_bytes,
                    result.metrics.seed
                ));
            }
        }

        match m.get_one::<String>("metrics").map(String::as_str) {
            Some("json") => eprintln!("{}", result.metrics.to_json()),
            Some("table") => print_table(&metrics_table(&script.name, &result.metrics)),
            _ => {}
        }
    }
    Ok(())
}

fn obfuscate_with_progress(script: &Script, options: &ObfuscationOptions) -> ShroudResult<ObfuscationResult> {
    let bar = progress_bar(&script.name);
    let mut sink = |progress: &Progress| update_bar(&bar, progress);
    let result = pipeline::obfuscate(script, options, &mut sink, &CancellationToken::new());
    bar.finish_and_clear();
    result
}

/// `main.lua` becomes `main.obf.lua`.
fn obfuscated_name(script: &Script) -> String {
    match script.name.strip_suffix(".lua") {
        Some(stem) => format!("{}.obf.lua", stem),
        None => format!("{}.obf.lua", script.name),
    }
}

fn dump_stage(script: &Script, options: &ObfuscationOptions, stage: &str) -> ShroudResult<String> {
    let text = match stage {
        "ast" => format!("{:#?}\n", ast::parse(script)?),
        "ir" => format!("{}\n", ir::lower_ast_to_ir(&ast::parse(script)?, options.flatten_control_flow)?),
        _ => {
            let build = pipeline::build_unit(script, options, pipeline::job_seed(options))?;
            disasm::disassemble(&build)?
        }
    };
    Ok(format!("-- {} ({})\n{}", script.name, stage, text))
}

fn run_command(m: &ArgMatches, style: &FormatStyle) -> ShroudResult<()> {
    let options = options_from(m)?;
    let script = load_script(m)?;
    let seed = pipeline::job_seed(&options);
    log::info!("running {} with seed {}", script.name, seed);

    let mut vm = Vm::new();
    if let Some(limit) = m.get_one::<usize>("step-limit") {
        vm = vm.with_step_limit(*limit);
    }
    let mut returned = Vec::new();
    for build in pipeline::compile_builds(&script, &options, seed)? {
        let result = vm.run(&build);
        print!("{}", vm.take_output());
        returned = result?;
    }
    if !returned.is_empty() {
        let values: Vec<String> = returned.iter().map(|v| v.to_string()).collect();
        style.info(&format!("returned {}", values.join("\t")));
    }
    Ok(())
}

fn disasm_command(m: &ArgMatches) -> ShroudResult<()> {
    let options = options_from(m)?;
    let script = load_script(m)?;
    let seed = pipeline::job_seed(&options);
    let builds = pipeline::compile_builds(&script, &options, seed)?;
    let several = builds.len() > 1;
    let render = DisasmOptions { bytes: m.get_flag("bytes"), raw: m.get_flag("raw") };
    for (i, build) in builds.iter().enumerate() {
        if several {
            println!("; chunk {}/{}", i + 1, builds.len());
        }
        print!("{}", disassembler::render(build, &render)?);
    }
    Ok(())
}

fn load_script(m: &ArgMatches) -> ShroudResult<Script> {
    let file = m.get_one::<String>("file").map(String::as_str).unwrap_or_default();
    Script::new(PathBuf::from(file))
}
