//! Call-site simulation: one `CALL_VIRTUAL` driven by synthetic receivers.

use anyhow::{Context, Result, ensure};
use clap::ValueEnum;
use serde::Serialize;
use slotvm_core::val::{Callable, Class, Value, Visibility};
use slotvm_core::vm::pic::{CallSiteReport, FunctionPicSummary};
use slotvm_core::vm::{
    CallContext, CodeBuilder, CompiledFunction, Constant, Decode, DispatchStats, EncodingWidths, Frame,
    FunctionParts, Opcode, PicConfig, disassemble_listing,
};

const METHOD: &str = "step";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Pattern {
    /// Always the first class
    Mono,
    /// Round-robin over all classes
    Cycle,
    /// Nine calls in ten go to the first class, the rest round-robin
    Skewed,
}

impl Pattern {
    fn pick(self, i: usize, classes: usize) -> usize {
        match self {
            Pattern::Mono => 0,
            Pattern::Cycle => i % classes,
            Pattern::Skewed if i % 10 == 9 => (i / 10) % classes,
            Pattern::Skewed => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SimOptions {
    pub classes: usize,
    pub calls: usize,
    pub pattern: Pattern,
    pub pic: PicConfig,
    pub listing: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SimReport {
    pub pattern: Pattern,
    pub classes: usize,
    pub calls: usize,
    pub checksum: i64,
    pub config: PicConfig,
    pub dispatch: DispatchStats,
    pub summary: FunctionPicSummary,
    pub sites: Vec<CallSiteReport>,
}

fn build_function(pic: PicConfig) -> Result<CompiledFunction> {
    let widths = EncodingWidths::fit(3, 16, 1);
    let mut b = CodeBuilder::new(widths)?;
    b.emit(Opcode::CallVirtual, &[0, 0, 1, 0, 2])?;
    b.emit(Opcode::Ret, &[2])?;
    CompiledFunction::new(FunctionParts {
        name: "pic_sim".into(),
        local_count: 3,
        widths,
        consts: vec![Constant::str(METHOD)],
        code: b.finish(),
        pic,
        ..FunctionParts::default()
    })
}

fn build_classes(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let class = Class::new(format!("Sim{}", i));
            let tag = i as i64;
            class.define_method(
                METHOD,
                Visibility::Public,
                Callable::new(METHOD, move |_, _, _| Ok(Value::Int(tag))),
            );
            class.instantiate()
        })
        .collect()
}

pub(crate) fn run(opts: &SimOptions) -> Result<SimReport> {
    ensure!(opts.classes > 0, "--classes must be at least 1");
    let func = build_function(opts.pic)?;
    if opts.listing {
        eprintln!("{}", disassemble_listing(&func)?);
    }
    let receivers = build_classes(opts.classes);
    let instr = func
        .decoder()
        .decode_instr(func.code(), 0)
        .context("simulated function does not decode")?;

    let mut ctx = CallContext::new();
    let mut frame = Frame::for_function(&func);
    let mut checksum = 0i64;
    for i in 0..opts.calls {
        let recv = &receivers[opts.pattern.pick(i, opts.classes)];
        frame.set_obj(0, recv.clone());
        func.call_virtual(&mut ctx, &mut frame, &instr)?;
        checksum += frame.get_int(2);
    }

    let sites = func.call_site_stats();
    let summary = FunctionPicSummary::from_reports(&sites);
    tracing::info!(
        target: "slotvm_cli",
        calls = opts.calls,
        hits = summary.hits,
        misses = summary.misses,
        "simulation finished"
    );
    Ok(SimReport {
        pattern: opts.pattern,
        classes: opts.classes,
        calls: opts.calls,
        checksum,
        config: opts.pic,
        dispatch: ctx.stats(),
        summary,
        sites,
    })
}
