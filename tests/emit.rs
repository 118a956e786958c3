use std::fs;
use std::path::PathBuf;

use vcdsim::convert::{self, Options};
use vcdsim::verilator::{self, HarnessOptions, ReplaceInvalid};
use vcdsim::verilog::{self, VerilogOptions, VerilogStyle};
use vcdsim::{ErrorKind, VcdParser};

fn vcd_asset(rel_path: &str) -> PathBuf {
    let mut path = PathBuf::from(file!());
    path.pop();
    path.pop();
    path.push("assets/vcd");
    path.push(rel_path);
    path
}

#[test]
fn testbench_simple() -> Result<(), Box<dyn std::error::Error>> {
    let doc = VcdParser::default().parse_file(vcd_asset("good/simple.vcd"))?;
    let h = doc.hierarchy()?;
    let options = VerilogOptions {
        module_name: "tb".to_string(),
        ..Default::default()
    };
    let expected = "`timescale 1ns/1ns

module tb;
    reg top_clk;
    reg [7:0] top_count;

    initial begin
        top_clk = 1'b0;
        top_count = 8'b00000000;
        #10;
        top_clk = 1'b1;
        top_count = 8'b00000001;
        #10;
        top_clk = 1'b0;
        top_count = 8'b00000010;
        $finish;
    end
endmodule
";
    assert_eq!(verilog::emit(&doc, &h, &options)?, expected);
    Ok(())
}

#[test]
fn testbench_keeps_unknown_bits() -> Result<(), Box<dyn std::error::Error>> {
    let doc = VcdParser::default().parse_file(vcd_asset("good/nested.vcd"))?;
    let h = doc.hierarchy()?;
    let tb = verilog::emit(&doc, &h, &VerilogOptions::default())?;
    assert!(tb.starts_with("`timescale 1ps/1ps\n"));
    assert!(tb.contains("    reg [15:0] tb_dut_addr;\n"));
    assert!(tb.contains("        tb_dut_clk = 1'bx;\n"));
    assert!(tb.contains("        tb_dut_addr = 16'bxxxxxxxxxxxxxxxx;\n"));
    assert!(tb.contains("        tb_dut_gen_lane_lane = 4'bzzz1;\n"));
    assert!(tb.contains("        #1000;\n"));
    Ok(())
}

#[test]
fn emission_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
    let render = || -> Result<(String, String, String), Box<dyn std::error::Error>> {
        let doc = VcdParser::default().parse_file(vcd_asset("good/nested.vcd"))?;
        let h = doc.hierarchy()?;
        let harness = HarnessOptions {
            clock_freq: Some(1e9),
            replace_invalid: ReplaceInvalid::Zero,
            ..Default::default()
        };
        let ports = VerilogOptions {
            style: VerilogStyle::Ports,
            ..Default::default()
        };
        Ok((
            verilog::emit(&doc, &h, &VerilogOptions::default())?,
            verilator::emit(&doc, &h, &harness)?,
            verilog::emit(&doc, &h, &ports)?,
        ))
    };
    assert_eq!(render()?, render()?);
    Ok(())
}

#[test]
fn harness_nested() -> Result<(), Box<dyn std::error::Error>> {
    let doc = VcdParser::default().parse_file(vcd_asset("good/nested.vcd"))?;
    let h = doc.hierarchy()?;
    let options = HarnessOptions {
        module_name: "dut_top".to_string(),
        clock_freq: Some(1e9),
        replace_invalid: ReplaceInvalid::Zero,
        ..Default::default()
    };
    let cpp = verilator::emit(&doc, &h, &options)?;
    assert!(cpp.contains("#include \"Vdut_top.h\"\n"));
    assert!(cpp.contains("static const uint64_t STEP_TICKS = 1000;\n"));
    assert!(cpp.contains("    top->tb_dut_clk = 0x0;\n"));
    assert!(cpp.contains("    top->tb_dut_addr = 0xa;\n"));
    assert!(cpp.contains("    top->tb_dut_gen_lane_lane = 0x1;\n"));
    // #1000 takes the steps starting at 0 and 1000
    assert!(cpp.contains("    step(contextp.get(), top.get(), 2);\n    top->tb_rst_n = 0x1;\n"));
    assert_eq!(cpp.matches("step(contextp.get(), top.get(), 1);").count(), 2);
    Ok(())
}

#[test]
fn harness_rejects_unknown_bits() -> Result<(), Box<dyn std::error::Error>> {
    let doc = VcdParser::default().parse_file(vcd_asset("good/nested.vcd"))?;
    let h = doc.hierarchy()?;
    let options = HarnessOptions {
        clock_freq: Some(1e9),
        ..Default::default()
    };
    let err = verilator::emit(&doc, &h, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedValue);
    assert_eq!(err.to_string(), "'x' is not a value supported by the simulator");
    Ok(())
}

fn options(dir: &tempfile::TempDir) -> Options {
    Options {
        input: vcd_asset("good/simple.vcd"),
        verilog: Some(dir.path().join("tb.v")),
        verilator: Some(dir.path().join("sim").join("main.cpp")),
        verilator_verilog: Some(dir.path().join("sim").join("vcdsim.v")),
        clock_freq: Some(100e6),
        ..Default::default()
    }
}

#[test]
fn convert_writes_all_artifacts() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let options = options(&dir);
    let written = convert::run(&options)?;
    assert_eq!(
        written,
        vec![
            dir.path().join("tb.v"),
            dir.path().join("sim").join("main.cpp"),
            dir.path().join("sim").join("vcdsim.v"),
        ]
    );
    let ports = fs::read_to_string(dir.path().join("sim").join("vcdsim.v"))?;
    assert!(ports.contains("    input wire [7:0] top_count\n);\n"));
    let cpp = fs::read_to_string(dir.path().join("sim").join("main.cpp"))?;
    assert!(cpp.contains("    top->top_clk = 0x1;\n"));
    assert_eq!(fs::read_dir(dir.path().join("sim"))?.count(), 2);
    Ok(())
}

#[test]
fn missing_clock_freq_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let options = Options {
        clock_freq: None,
        input: dir.path().join("not_read.vcd"),
        ..options(&dir)
    };
    let err = convert::run(&options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingParameter);
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn failed_conversion_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let options = Options {
        input: vcd_asset("good/real.vcd"),
        ..options(&dir)
    };
    let err = convert::run(&options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedValue);
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);

    let options = Options {
        ignore_invalid: true,
        ..options
    };
    assert_eq!(convert::run(&options)?.len(), 3);
    Ok(())
}

#[test]
fn companion_module_needs_harness() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let options = Options {
        verilator: None,
        ..options(&dir)
    };
    assert_eq!(convert::run(&options)?, vec![dir.path().join("tb.v")]);
    Ok(())
}

#[test]
fn clock_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let text = "$scope module top $end\n$var wire 1 ! clk $end\n$upscope $end\n\
                $enddefinitions $end\n$dumpvars\n#0\n0!\n$end\n#10\n1!\n#20\n0!\n";
    let doc = VcdParser::default().parse_str(text)?;
    let h = doc.hierarchy()?;
    assert_eq!(h.render(), ".top\n    .clk = Signal(1)\n");
    let tb = verilog::emit(&doc, &h, &VerilogOptions::default())?;
    assert!(tb.contains(
        "    reg top_clk;\n\n    initial begin\n        top_clk = 1'b0;\n        #10;\n        \
         top_clk = 1'b1;\n        #10;\n        top_clk = 1'b0;\n        $finish;\n"
    ));
    Ok(())
}

#[test]
fn run_with_uses_the_loaded_document() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let document = convert::load(&options(&dir))?;
    let options = Options {
        input: dir.path().join("never_opened.vcd"),
        ..options(&dir)
    };
    assert_eq!(convert::run_with(&document, &options)?.len(), 3);
    let tb = fs::read_to_string(dir.path().join("tb.v"))?;
    assert!(tb.contains("    reg [7:0] top_count;\n"));

    let options = Options {
        clock_freq: None,
        ..options
    };
    let err = convert::run_with(&document, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingParameter);
    Ok(())
}
