use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
use dashmap::DashMap;

use crate::val::Value;

use super::constant::{Constant, StmtRef};
use super::decode::{AnyDecoder, EncodingWidths, Instr};
use super::opcode::{Opcode, OperandKind};
use super::pic::{CallSiteReport, FunctionPicSummary, MethodCallSite, PicConfig};
use super::{CallContext, Frame};

/// One entry of the enclosing-scope table: how many scopes up and which
/// slot there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSlot<'a> {
    pub depth: u32,
    pub index: u32,
    pub name: Option<&'a str>,
}

/// Scope-slot metadata kept as three parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSlots {
    depths: Vec<u32>,
    indices: Vec<u32>,
    names: Vec<Option<Arc<str>>>,
}

impl ScopeSlots {
    #[inline]
    pub fn len(&self) -> usize {
        self.depths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<ScopeSlot<'_>> {
        Some(ScopeSlot {
            depth: *self.depths.get(i)?,
            index: *self.indices.get(i)?,
            name: self.names.get(i)?.as_deref(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ScopeSlot<'_>> {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

/// Raw inputs of [`CompiledFunction::new`], as a compiler produces them.
#[derive(Clone, Default)]
pub struct FunctionParts {
    pub name: String,
    pub local_count: usize,
    pub arg_count: usize,
    pub scope_slot_count: usize,
    pub scope_depths: Vec<u32>,
    pub scope_indices: Vec<u32>,
    pub scope_names: Vec<Option<Arc<str>>>,
    pub widths: EncodingWidths,
    pub consts: Vec<Constant>,
    pub fallback_stmts: Vec<StmtRef>,
    pub code: Vec<u8>,
    pub pic: PicConfig,
}

/// Immutable compiled unit plus its lazily populated call-site table.
///
/// The call-site table is the only mutable part. It is keyed by the code
/// offset of the call instruction and may be filled from several threads.
pub struct CompiledFunction {
    name: Arc<str>,
    local_count: usize,
    arg_count: usize,
    scope_slots: ScopeSlots,
    widths: EncodingWidths,
    decoder: AnyDecoder,
    consts: Vec<Constant>,
    fallback_stmts: Vec<StmtRef>,
    code: Vec<u8>,
    pic: PicConfig,
    call_sites: DashMap<usize, Arc<MethodCallSite>>,
}

impl CompiledFunction {
    pub fn new(parts: FunctionParts) -> Result<Self> {
        let FunctionParts {
            name,
            local_count,
            arg_count,
            scope_slot_count,
            scope_depths,
            scope_indices,
            scope_names,
            widths,
            consts,
            fallback_stmts,
            code,
            pic,
        } = parts;

        let decoder = AnyDecoder::for_widths(widths).with_context(|| format!("function '{}'", name))?;
        ensure!(
            scope_depths.len() == scope_slot_count
                && scope_indices.len() == scope_slot_count
                && scope_names.len() == scope_slot_count,
            "function '{}': scope slot arrays have lengths {}/{}/{}, expected {}",
            name,
            scope_depths.len(),
            scope_indices.len(),
            scope_names.len(),
            scope_slot_count
        );
        let slots = local_count + arg_count;
        let max_slot = widths.max_value(OperandKind::Slot) as usize;
        if slots > max_slot + 1 {
            bail!(
                "function '{}': {} slots do not fit {}-byte slot indices",
                name,
                slots,
                widths.slot
            );
        }
        pic.validate().with_context(|| format!("function '{}'", name))?;

        tracing::debug!(
            target: "slotvm::function",
            name = %name,
            locals = local_count,
            args = arg_count,
            code_len = code.len(),
            consts = consts.len(),
            widths = %widths,
            "compiled function"
        );

        Ok(Self {
            name: Arc::from(name),
            local_count,
            arg_count,
            scope_slots: ScopeSlots {
                depths: scope_depths,
                indices: scope_indices,
                names: scope_names,
            },
            widths,
            decoder,
            consts,
            fallback_stmts,
            code,
            pic,
            call_sites: DashMap::new(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn local_count(&self) -> usize {
        self.local_count
    }

    #[inline]
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    #[inline]
    pub fn widths(&self) -> EncodingWidths {
        self.widths
    }

    /// Decoder matching this function's slot width.
    #[inline]
    pub fn decoder(&self) -> AnyDecoder {
        self.decoder
    }

    #[inline]
    pub fn consts(&self) -> &[Constant] {
        &self.consts
    }

    #[inline]
    pub fn constant(&self, id: u32) -> Option<&Constant> {
        self.consts.get(id as usize)
    }

    #[inline]
    pub fn fallback_stmt(&self, i: usize) -> Option<&StmtRef> {
        self.fallback_stmts.get(i)
    }

    #[inline]
    pub fn fallback_stmt_count(&self) -> usize {
        self.fallback_stmts.len()
    }

    #[inline]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    #[inline]
    pub fn scope_slots(&self) -> &ScopeSlots {
        &self.scope_slots
    }

    #[inline]
    pub fn pic_config(&self) -> &PicConfig {
        &self.pic
    }

    /// Name constant referenced by a method/field id operand.
    pub fn method_name(&self, id: u32) -> Result<&str> {
        match self.constant(id) {
            Some(Constant::Str(name)) => Ok(name.as_ref()),
            Some(other) => bail!("constant k{} is {}, not a method name", id, other.kind()),
            None => bail!("constant k{} out of range ({} constants)", id, self.consts.len()),
        }
    }

    /// Call site for the call instruction at `offset`, created on first use.
    pub fn call_site(&self, offset: usize, name: &str) -> Arc<MethodCallSite> {
        if let Some(site) = self.call_sites.get(&offset) {
            return Arc::clone(site.value());
        }
        let entry = self
            .call_sites
            .entry(offset)
            .or_insert_with(|| Arc::new(MethodCallSite::new(name, self.pic)));
        Arc::clone(entry.value())
    }

    /// Site already created for `offset`, if any.
    pub fn cached_call_site(&self, offset: usize) -> Option<Arc<MethodCallSite>> {
        self.call_sites.get(&offset).map(|site| Arc::clone(site.value()))
    }

    /// Call site of a decoded `CALL_VIRTUAL`.
    pub fn call_site_for(&self, instr: &Instr) -> Result<Arc<MethodCallSite>> {
        ensure!(
            instr.opcode.is_dynamic_call(),
            "{} at offset {} does not dispatch through a call site",
            instr.opcode,
            instr.offset
        );
        let id = instr.operand(1).context("call instruction without method id")?;
        let name = self.method_name(id)?;
        Ok(self.call_site(instr.offset, name))
    }

    /// Execute a decoded `CALL_VIRTUAL` against `frame`: read the receiver
    /// and the argument window, dispatch through the site, store the result.
    pub fn call_virtual(&self, ctx: &mut CallContext, frame: &mut Frame, instr: &Instr) -> Result<()> {
        let site = self.call_site_for(instr)?;
        let operand = |i: usize| -> Result<usize> {
            instr
                .operand(i)
                .map(|v| v as usize)
                .with_context(|| format!("{} missing operand {}", Opcode::CallVirtual, i))
        };
        let (recv, base, count, result) = (operand(0)?, operand(2)?, operand(3)?, operand(4)?);
        ensure!(
            base + count <= frame.slot_count() && recv < frame.slot_count() && result < frame.slot_count(),
            "call at offset {} addresses slots beyond the frame ({})",
            instr.offset,
            frame.slot_count()
        );
        let receiver: Value = frame.load_value(recv);
        let args = frame.collect_args(base, count);
        let value = site.invoke(ctx, &receiver, &args)?;
        frame.store_value(result, value);
        Ok(())
    }

    #[inline]
    pub fn call_site_count(&self) -> usize {
        self.call_sites.len()
    }

    /// Snapshot of every site, ordered by code offset.
    pub fn call_site_stats(&self) -> Vec<CallSiteReport> {
        let mut reports: Vec<CallSiteReport> = self
            .call_sites
            .iter()
            .map(|entry| CallSiteReport {
                offset: *entry.key(),
                method: entry.value().name().to_string(),
                stats: entry.value().stats(),
            })
            .collect();
        reports.sort_by_key(|r| r.offset);
        reports
    }

    pub fn pic_summary(&self) -> FunctionPicSummary {
        FunctionPicSummary::from_reports(&self.call_site_stats())
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("name", &self.name)
            .field("local_count", &self.local_count)
            .field("arg_count", &self.arg_count)
            .field("widths", &self.widths)
            .field("code_len", &self.code.len())
            .field("consts", &self.consts.len())
            .field("call_sites", &self.call_sites.len())
            .finish()
    }
}
