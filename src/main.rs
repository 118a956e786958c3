use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use vcdsim::convert::{self, Options};
use vcdsim::verilator::ReplaceInvalid;

#[derive(Parser, Debug)]
#[command(name = "vcdconvert")]
#[command(version)]
#[command(about = "Turns a VCD or logic-analyzer export into simulation stimulus.", long_about = None)]
struct Args {
    #[arg(value_name = "INPUT", index = 1)]
    input: PathBuf,
    /// Write a Verilog testbench replaying the dump.
    #[arg(long, value_name = "PATH")]
    verilog: Option<PathBuf>,
    /// Write a Verilator C++ harness replaying the dump.
    #[arg(long, value_name = "PATH")]
    verilator: Option<PathBuf>,
    /// Write the Verilog top module the harness drives.
    #[arg(long, value_name = "PATH")]
    verilator_verilog: Option<PathBuf>,
    /// Clock frequency of the harness, in Hz.
    #[arg(long, value_name = "HZ")]
    verilator_clock_freq: Option<f64>,
    /// Skip records and values the target cannot represent.
    #[arg(long)]
    ignore_invalid: bool,
    /// Replace x/z bits with this level in the harness.
    #[arg(long, value_name = "0|1", value_parser = clap::value_parser!(u8).range(0..=1))]
    replace_invalid: Option<u8>,
    /// Name of the generated module.
    #[arg(long, default_value = "vcdsim")]
    name: String,
    /// Print the signal hierarchy.
    #[arg(long)]
    tree: bool,
    /// Print the parsed header as JSON.
    #[arg(long)]
    header_json: bool,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            input: self.input.clone(),
            verilog: self.verilog.clone(),
            verilator: self.verilator.clone(),
            verilator_verilog: self.verilator_verilog.clone(),
            clock_freq: self.verilator_clock_freq,
            ignore_invalid: self.ignore_invalid,
            replace_invalid: match self.replace_invalid {
                Some(0) => ReplaceInvalid::Zero,
                Some(_) => ReplaceInvalid::One,
                None => ReplaceInvalid::Disabled,
            },
            module_name: self.name.clone(),
            ..Default::default()
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let options = args.options();
    convert::validate(&options)?;
    let document = convert::load(&options)
        .with_context(|| format!("failed to read {}", options.input.display()))?;
    if args.header_json {
        println!("{}", document.header_json()?);
    }
    if args.tree {
        print!("{}", document.hierarchy()?.render());
    }
    for path in convert::run_with(&document, &options)? {
        println!("generated {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
