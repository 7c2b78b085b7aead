//! Collection lists: what a tracepoint asks the agent to record

use crate::error::{CompileError, Result};
use crate::finalize::{VerifiedExpr, MAX_AGENT_EXPR_LEN};
use crate::memrange::{merge_ranges, MemRange, RangeKind};
use crate::packet::PacketBuilder;
use crate::target::TargetDescription;

/// Budget reserved for one `M` entry; wider entries reserve their length
const MEMRANGE_ENTRY_BUDGET: usize = 27;

/// Bytes of an `X` entry before its hex payload: 'X', 8 digits, ','
const AEXPR_ENTRY_OVERHEAD: usize = 10;

/// Registers, memory ranges and expressions to collect at one tracepoint
/// hit, or at each step of its while-stepping phase
#[derive(Debug, Clone)]
pub struct CollectionList {
    /// Remote register bitmap, bit `n % 8` of byte `n / 8`
    regs_mask: Vec<u8>,
    memranges: Vec<MemRange>,
    aexprs: Vec<VerifiedExpr>,
    strace_data: bool,
    /// Names of values collected without bytecode
    wholly_collected: Vec<String>,
    /// Source text of expressions collected with bytecode
    computed: Vec<String>,
}

impl CollectionList {
    /// Create a list whose register mask covers remote registers
    /// `0..=max_remote_regno`
    pub fn new(max_remote_regno: u32) -> Self {
        Self {
            regs_mask: vec![0; (max_remote_regno / 8 + 1) as usize],
            memranges: Vec::new(),
            aexprs: Vec::new(),
            strace_data: false,
            wholly_collected: Vec::new(),
            computed: Vec::new(),
        }
    }

    /// Create a list sized for every remote register of `target`
    pub fn for_target(target: &TargetDescription) -> Self {
        Self::new(target.max_remote_regno())
    }

    /// Collect the remote register `regno`
    pub fn add_remote_register(&mut self, regno: u32) -> Result<()> {
        tracing::debug!("collect register {}", regno);
        let width = (self.regs_mask.len() * 8) as u32;
        let byte = self
            .regs_mask
            .get_mut((regno / 8) as usize)
            .ok_or(CompileError::Configuration { index: regno, width })?;
        *byte |= 1 << (regno % 8);
        Ok(())
    }

    /// Collect architecture register `regno`, expanding pseudo registers
    /// into the raw registers backing them
    pub fn add_local_register(&mut self, target: &TargetDescription, regno: u32) -> Result<()> {
        if let Some(pseudo) = target.pseudo(regno) {
            tracing::debug!("pseudo register {} collected through {:?}", pseudo.name, pseudo.raw);
            for &raw in &pseudo.raw {
                let remote = target
                    .remote_register_number(raw)
                    .ok_or(CompileError::UnknownRegister(raw))?;
                self.add_remote_register(remote)?;
            }
            return Ok(());
        }
        let remote = target
            .remote_register_number(regno)
            .ok_or(CompileError::UnknownRegister(regno))?;
        self.add_remote_register(remote)
    }

    /// Collect every register an accepted expression reads
    ///
    /// Expression register masks are in remote numbering.
    pub fn add_ax_registers(&mut self, aexpr: &VerifiedExpr) -> Result<()> {
        for &regno in &aexpr.requirements().reg_mask {
            self.add_remote_register(regno)?;
        }
        Ok(())
    }

    /// Collect `len` bytes at `base`
    ///
    /// For a register-relative range `base` is an offset from that
    /// architecture register, which is collected too so the agent can
    /// resolve the address.
    pub fn add_memrange(
        &mut self,
        target: &TargetDescription,
        kind: RangeKind,
        base: i64,
        len: u64,
    ) -> Result<()> {
        tracing::debug!("collect memrange ({:?},{:#x},{})", kind, base, len);
        let end = i64::try_from(len)
            .ok()
            .and_then(|len| base.checked_add(len))
            .ok_or(CompileError::RangeOverflow { base, len })?;
        self.memranges.push(MemRange::new(kind, base, end));
        if let RangeKind::Register(regno) = kind {
            self.add_local_register(target, regno)?;
        }
        Ok(())
    }

    /// Take ownership of an accepted expression
    pub fn add_aexpr(&mut self, aexpr: VerifiedExpr) {
        tracing::debug!("collect agent expression:\n{}", aexpr.expr().disassemble());
        self.aexprs.push(aexpr);
    }

    /// Ask for the static tracepoint marker payload
    pub fn add_static_trace_data(&mut self) {
        tracing::debug!("collect static trace data");
        self.strace_data = true;
    }

    pub fn add_wholly_collected(&mut self, name: impl Into<String>) {
        self.wholly_collected.push(name.into());
    }

    pub fn append_exp(&mut self, source: impl Into<String>) {
        self.computed.push(source.into());
    }

    pub fn wholly_collected(&self) -> &[String] {
        &self.wholly_collected
    }

    pub fn computed(&self) -> &[String] {
        &self.computed
    }

    pub fn memranges(&self) -> &[MemRange] {
        &self.memranges
    }

    pub fn aexprs(&self) -> &[VerifiedExpr] {
        &self.aexprs
    }

    pub fn static_trace_data(&self) -> bool {
        self.strace_data
    }

    /// Raw register mask, least significant byte first
    pub fn regs_mask(&self) -> &[u8] {
        &self.regs_mask
    }

    pub fn is_register_collected(&self, regno: u32) -> bool {
        self.regs_mask
            .get((regno / 8) as usize)
            .is_some_and(|byte| byte & (1 << (regno % 8)) != 0)
    }

    /// Whether nothing at all would be collected
    pub fn is_empty(&self) -> bool {
        !self.strace_data
            && self.regs_mask.iter().all(|&b| b == 0)
            && self.memranges.is_empty()
            && self.aexprs.is_empty()
    }

    /// Sort and merge the memory ranges; call once all actions are in
    pub fn finish(&mut self) {
        merge_ranges(&mut self.memranges);
    }

    /// Encode the list as wire packets
    pub fn stringify(&self) -> Vec<String> {
        let mut builder = PacketBuilder::new(MAX_AGENT_EXPR_LEN);

        if self.strace_data {
            tracing::debug!("collecting static trace data");
            builder.push_standalone("L".to_string());
        }

        if let Some(top) = self.regs_mask.iter().rposition(|&b| b != 0) {
            let mut packet = String::with_capacity(1 + 2 * (top + 1));
            packet.push('R');
            for byte in self.regs_mask[..=top].iter().rev() {
                packet.push_str(&format!("{:02X}", byte));
            }
            tracing::debug!("collecting registers (mask): 0x{}", &packet[1..]);
            builder.push_standalone(packet);
        }

        for range in &self.memranges {
            let entry = encode_memrange(range);
            tracing::debug!("collecting memrange {}", entry);
            builder.push(&entry, MEMRANGE_ENTRY_BUDGET);
        }

        for aexpr in &self.aexprs {
            let len = aexpr.bytes().len();
            let entry = format!("X{:08X},{}", len, aexpr.expr().to_hex());
            builder.push(&entry, AEXPR_ENTRY_OVERHEAD + 2 * len);
        }

        builder.finish()
    }
}

fn encode_memrange(range: &MemRange) -> String {
    // Addresses go out as unsigned 64-bit values, so negative frame offsets
    // wrap. The absolute sentinel is spelled -1.
    let start = range.start as u64;
    match range.kind {
        RangeKind::Absolute => format!("M-1,{:x},{:X}", start, range.size()),
        RangeKind::Register(regno) => format!("M{:X},{:x},{:X}", regno, start, range.size()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalize::finalize;
    use agent_expr::{AgentExpr, Op};

    fn target() -> TargetDescription {
        TargetDescription::uniform(32, 4)
    }

    fn trace_reg_expr(reg: u32) -> VerifiedExpr {
        let mut ax = AgentExpr::new(0);
        ax.reg(reg).unwrap();
        ax.trace_quick(4).unwrap();
        ax.simple(Op::End);
        finalize(ax).unwrap()
    }

    #[test]
    fn test_mask_is_sized_once() {
        let list = CollectionList::new(31);
        assert_eq!(list.regs_mask().len(), 4);
        assert_eq!(CollectionList::new(0).regs_mask().len(), 1);
        assert_eq!(CollectionList::new(8).regs_mask().len(), 2);
        assert!(list.is_empty());
    }

    #[test]
    fn test_add_register_is_idempotent() {
        let mut list = CollectionList::new(31);
        list.add_remote_register(3).unwrap();
        list.add_remote_register(3).unwrap();
        assert_eq!(list.regs_mask(), &[0x08, 0, 0, 0]);
    }

    #[test]
    fn test_register_past_mask_is_configuration_error() {
        let mut list = CollectionList::new(15);
        match list.add_remote_register(16) {
            Err(CompileError::Configuration { index: 16, width: 16 }) => {}
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_register_relative_range_collects_base_register() {
        let mut list = CollectionList::for_target(&target());
        list.add_memrange(&target(), RangeKind::Register(5), 16, 8).unwrap();

        assert_eq!(list.regs_mask(), &[0x20, 0, 0, 0]);
        assert_eq!(list.memranges(), &[MemRange::new(RangeKind::Register(5), 16, 24)]);
    }

    #[test]
    fn test_absolute_range_collects_no_register() {
        let mut list = CollectionList::for_target(&target());
        list.add_memrange(&target(), RangeKind::Absolute, 0x1000, 4).unwrap();
        assert!(list.regs_mask().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_local_register_without_remote_number() {
        let mut tdesc = target();
        tdesc.registers[7].remote_number = None;
        let mut list = CollectionList::for_target(&tdesc);
        assert!(matches!(
            list.add_local_register(&tdesc, 7),
            Err(CompileError::UnknownRegister(7))
        ));
        assert!(matches!(
            list.add_memrange(&tdesc, RangeKind::Register(7), 0, 4),
            Err(CompileError::UnknownRegister(7))
        ));
    }

    #[test]
    fn test_pseudo_register_expands_to_raw() {
        let mut tdesc = target();
        tdesc.pseudo_registers.push(crate::target::PseudoRegister {
            name: "d0".to_string(),
            size: 8,
            raw: vec![2, 3],
        });
        let mut list = CollectionList::for_target(&tdesc);
        list.add_local_register(&tdesc, 32).unwrap();
        assert!(list.is_register_collected(2));
        assert!(list.is_register_collected(3));
        assert!(!list.is_register_collected(32));
    }

    #[test]
    fn test_ax_registers_are_folded_in() {
        let mut list = CollectionList::new(31);
        let aexpr = trace_reg_expr(9);
        list.add_ax_registers(&aexpr).unwrap();
        list.add_aexpr(aexpr);
        assert!(list.is_register_collected(9));
        assert_eq!(list.aexprs().len(), 1);
    }

    #[test]
    fn test_stringify_order_and_encoding() {
        let mut list = CollectionList::for_target(&target());
        list.add_static_trace_data();
        list.add_remote_register(0).unwrap();
        list.add_memrange(&target(), RangeKind::Register(29), 8, 4).unwrap();
        list.add_memrange(&target(), RangeKind::Absolute, 0x1000, 0x10).unwrap();
        list.add_aexpr(trace_reg_expr(1));
        list.finish();

        assert_eq!(
            list.stringify(),
            vec![
                "L".to_string(),
                "R20000001".to_string(),
                "M1D,8,4M-1,1000,10X00000006,2600010d0427".to_string(),
            ]
        );
    }

    #[test]
    fn test_register_mask_trims_high_zero_bytes() {
        let mut list = CollectionList::new(63);
        list.add_remote_register(9).unwrap();
        assert_eq!(list.stringify(), vec!["R0200".to_string()]);
    }

    #[test]
    fn test_negative_offset_wraps() {
        let mut list = CollectionList::for_target(&target());
        list.add_memrange(&target(), RangeKind::Register(29), -8, 8).unwrap();
        list.finish();
        let packets = list.stringify();
        assert_eq!(packets.last().unwrap(), "M1D,fffffffffffffff8,8");
    }

    #[test]
    fn test_range_past_address_space_is_rejected() {
        let mut list = CollectionList::for_target(&target());
        assert!(matches!(
            list.add_memrange(&target(), RangeKind::Absolute, i64::MAX - 4, 8),
            Err(CompileError::RangeOverflow { len: 8, .. })
        ));
        assert!(matches!(
            list.add_memrange(&target(), RangeKind::Register(29), 0, u64::MAX),
            Err(CompileError::RangeOverflow { base: 0, .. })
        ));
        assert!(list.memranges().is_empty());
        assert!(!list.is_register_collected(29));
    }

    #[test]
    fn test_wide_entries_keep_packets_in_budget() {
        // 16 MB arrays at large negative frame offsets: 28-character entries
        let mut list = CollectionList::for_target(&target());
        for n in 1..=13i64 {
            list.add_memrange(&target(), RangeKind::Register(29), -n * 0x1000_0000, 0x100_0000)
                .unwrap();
        }
        list.finish();

        let packets = list.stringify();
        assert_eq!(packets[0], "R20000000");
        for packet in &packets {
            assert!(packet.len() <= MAX_AGENT_EXPR_LEN, "{} chars: {}", packet.len(), packet);
        }
        let entries: Vec<&str> = packets[1..]
            .iter()
            .flat_map(|p| p.split('M').filter(|e| !e.is_empty()))
            .collect();
        assert_eq!(entries.len(), 13);
        assert!(entries.contains(&"1D,fffffffff0000000,1000000"));
    }

    #[test]
    fn test_empty_list_stringifies_to_nothing() {
        let mut list = CollectionList::new(31);
        list.finish();
        assert!(list.stringify().is_empty());
    }

    #[test]
    fn test_absolute_kind_is_always_minus_one() {
        let mut list = CollectionList::for_target(&target());
        for n in 0..40i64 {
            list.add_memrange(&target(), RangeKind::Absolute, n * 0x100, 4).unwrap();
        }
        list.finish();
        for packet in list.stringify() {
            for entry in packet.split('M').filter(|e| !e.is_empty()) {
                assert!(entry.starts_with("-1,"), "entry {:?} in {:?}", entry, packet);
            }
        }
    }

    #[test]
    fn test_packets_respect_budget() {
        let mut list = CollectionList::for_target(&target());
        for n in 0..50i64 {
            list.add_memrange(&target(), RangeKind::Absolute, 0x7fff_0000_0000 + n * 0x1000, 0x200)
                .unwrap();
        }
        for reg in 0..10 {
            list.add_aexpr(trace_reg_expr(reg));
        }
        list.finish();

        let packets = list.stringify();
        assert!(packets.len() > 1);
        for packet in &packets {
            assert!(packet.len() <= MAX_AGENT_EXPR_LEN, "{} chars: {}", packet.len(), packet);
        }
        let entries: usize = packets.iter().map(|p| p.matches('M').count()).sum();
        assert_eq!(entries, 50);
        let programs: usize = packets.iter().map(|p| p.matches('X').count()).sum();
        assert_eq!(programs, 10);
    }
}
