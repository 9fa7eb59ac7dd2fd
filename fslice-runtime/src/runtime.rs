//! Process-wide runtime state: shadow memory, dedup caches, argument/return
//! channels, and the trace emitter, all owned by one [`Runtime`] rather than
//! scattered across mutable statics.

use crate::emitter::{default_sink, trace_enabled_from_env};
use crate::errno::SaveErrno;
use crate::object_hash::hash_pairs;
use crate::taint::Taint;
use hashbrown::HashMap;
use std::io::Write;

/// Number of argument-channel slots.
const NUM_ARG_SLOTS: usize = 16;

/// Whether a fresh heap allocation's shadow cells behave as object cells
/// (store into them emits a cross-edge rather than overwriting — see
/// [`Runtime::store`]). A build-time constant rather than a Cargo feature,
/// since it changes the meaning of every emitted trace and so shouldn't
/// silently vary per build target.
const MEM_FLAG: bool = false;

struct ObjectEntry {
    sequence: Vec<(u32, u32)>,
    taint: Taint,
}

pub struct Runtime {
    shadow: HashMap<u64, Taint>,
    values: HashMap<u64, Taint>,
    objects: HashMap<u64, ObjectEntry>,
    binary_ops: HashMap<String, HashMap<u64, Taint>>,
    blocks: HashMap<u64, Taint>,
    args: [Taint; NUM_ARG_SLOTS],
    ret: Taint,
    next_id: u32,
    sink: Box<dyn Write + Send>,
    trace_enabled: bool,
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            shadow: HashMap::new(),
            values: HashMap::new(),
            objects: HashMap::new(),
            binary_ops: HashMap::new(),
            blocks: HashMap::new(),
            args: [Taint::SENTINEL; NUM_ARG_SLOTS],
            ret: Taint::SENTINEL,
            next_id: 1,
            sink: default_sink(),
            trace_enabled: trace_enabled_from_env(),
        }
    }

    /// Replace the trace sink, e.g. to capture trace lines in a test or to
    /// redirect them to a file.
    pub fn set_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.sink = sink;
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn emit(&mut self, line: &str) {
        if !self.trace_enabled {
            return;
        }
        let _ = writeln!(self.sink, "{line}");
    }

    fn shadow_at(&self, addr: u64) -> Taint {
        self.shadow.get(&addr).copied().unwrap_or(Taint::SENTINEL)
    }

    // ---- 4.2.1 load / 4.2.2 store ----------------------------------------

    pub fn load(&mut self, addr: u64, size: u64) -> Taint {
        let _errno = SaveErrno::new();
        let sequence: Vec<(u32, u32)> =
            (0..size).map(|i| { let t = self.shadow_at(addr + i); (t.id(), t.offset()) }).collect();
        let hash = hash_pairs(&sequence);

        if let Some(entry) = self.objects.get(&hash) {
            if entry.sequence == sequence {
                return entry.taint;
            }
            log::warn!("object cache hash collision at {hash:#x}, minting a fresh label");
        }

        let taint = Taint::new(self.fresh_id(), 0, false);
        let rendered =
            sequence.iter().map(|(id, off)| format!("t{id}[{off}]")).collect::<Vec<_>>().join(",");
        self.emit(&format!("t{}=O({})", taint.id(), rendered));
        self.objects.insert(hash, ObjectEntry { sequence, taint });
        taint
    }

    pub fn store(&mut self, addr: u64, size: u64, taint: Taint) {
        let _errno = SaveErrno::new();
        for i in 0..size {
            let existing = self.shadow_at(addr + i);
            if existing.is_obj() {
                self.emit(&format!(
                    "t{}[{}]=t{}[{}]",
                    existing.id(),
                    existing.offset(),
                    taint.id(),
                    taint.offset() + i as u32
                ));
            } else {
                self.shadow.insert(addr + i, Taint::new(taint.id(), taint.offset() + i as u32, false));
            }
        }
    }

    // ---- 4.2.3 argument / return channels ---------------------------------

    pub fn load_arg(&mut self, i: u64) -> Taint {
        let slot = &mut self.args[i as usize];
        let t = *slot;
        *slot = Taint::SENTINEL;
        t
    }

    pub fn store_arg(&mut self, i: u64, taint: Taint) {
        self.args[i as usize] = taint.as_channel_value();
    }

    pub fn load_ret(&mut self) -> Taint {
        self.args = [Taint::SENTINEL; NUM_ARG_SLOTS];
        let t = self.ret;
        self.ret = Taint::SENTINEL;
        t
    }

    pub fn store_ret(&mut self, taint: Taint) {
        self.args = [Taint::SENTINEL; NUM_ARG_SLOTS];
        self.ret = taint.as_channel_value();
    }

    // ---- 4.2.4 constant / operator dedup ----------------------------------

    pub fn value(&mut self, v: u64) -> Taint {
        let _errno = SaveErrno::new();
        if v == 0 {
            return Taint::SENTINEL;
        }
        if let Some(&t) = self.values.get(&v) {
            return t;
        }
        let taint = Taint::new(self.fresh_id(), 0, false);
        self.emit(&format!("t{}=V({v})", taint.id()));
        self.values.insert(v, taint);
        taint
    }

    pub fn op2(&mut self, op: &str, t1: Taint, t2: Taint) -> Taint {
        let _errno = SaveErrno::new();
        let key = u64::from(t1.id()) | (u64::from(t2.id()) << 32);
        let table = self.binary_ops.entry(op.to_string()).or_default();
        if let Some(&t) = table.get(&key) {
            return t;
        }
        let taint = Taint::new(self.fresh_id(), 0, false);
        self.emit(&format!("t{}=A(\"{op}\",t{},t{})", taint.id(), t1.id(), t2.id()));
        self.binary_ops.entry(op.to_string()).or_default().insert(key, taint);
        taint
    }

    // ---- 4.2.5 memory-intrinsic replacements ------------------------------

    /// `memset` semantics: fill `size` shadow bytes with the byte value's
    /// taint (argument-channel slot 1), offset forced to zero for every byte
    /// per the memset record's meaning of "one uniform value written".
    pub fn memset(&mut self, dst: u64, size: u64) {
        let _errno = SaveErrno::new();
        let t = self.load_arg(1);
        let fill = Taint::new(t.id(), 0, false);
        for i in 0..size {
            self.shadow.insert(dst + i, fill);
        }
        self.store_ret(Taint::SENTINEL);
    }

    pub fn memmove(&mut self, dst: u64, src: u64, size: u64) {
        let _errno = SaveErrno::new();
        for i in 0..size {
            let bt = self.shadow_at(src + i);
            self.shadow.insert(dst + i, Taint::new(bt.id(), bt.offset(), false));
        }
        self.store_ret(Taint::SENTINEL);
    }

    pub fn bzero(&mut self, dst: u64, size: u64) {
        let _errno = SaveErrno::new();
        for i in 0..size {
            self.shadow.insert(dst + i, Taint::SENTINEL);
        }
        self.store_ret(Taint::SENTINEL);
    }

    /// Seed `total` shadow bytes starting at `addr` as fresh cells of a
    /// newly-minted label, and clear the return channel. Shared by `malloc`
    /// and `calloc`, which differ only in how they size the region and what
    /// argument-taints they cite in their own `M(...)` record.
    fn seed_allocation(&mut self, addr: u64, total: u64) -> u32 {
        let id = self.fresh_id();
        for i in 0..total {
            self.shadow.insert(addr + i, Taint::new(id, i as u32, MEM_FLAG));
        }
        self.store_ret(Taint::SENTINEL);
        id
    }

    pub fn malloc(&mut self, addr: u64, size: u64) -> Taint {
        let _errno = SaveErrno::new();
        let size_taint = self.load_arg(0);
        let id = self.seed_allocation(addr, size);
        self.emit(&format!("t{id}=M({size},t{})", size_taint.id()));
        Taint::new(id, 0, false)
    }

    pub fn calloc(&mut self, addr: u64, num: u64, size: u64) -> Taint {
        let _errno = SaveErrno::new();
        let num_taint = self.load_arg(0);
        let size_taint = self.load_arg(1);
        let id = self.seed_allocation(addr, num * size);
        self.emit(&format!("t{id}=M({size},t{},t{})", num_taint.id(), size_taint.id()));
        Taint::new(id, 0, false)
    }

    // ---- 4.2.6 block and name/data hooks -----------------------------------

    fn get_block(&mut self, size: u64, nr: u64) -> Taint {
        if let Some(&t) = self.blocks.get(&nr) {
            return t;
        }
        let taint = Taint::new(self.fresh_id(), 0, false);
        let size_taint = self.load_arg(1);
        let nr_taint = self.load_arg(2);
        self.emit(&format!("t{}=B({size},{nr},t{},t{})", taint.id(), size_taint.id(), nr_taint.id()));
        self.store_ret(Taint::SENTINEL);
        self.blocks.insert(nr, taint);
        taint
    }

    pub fn read_block(&mut self, addr: u64, size: u64, nr: u64) {
        let _errno = SaveErrno::new();
        let t = self.get_block(size, nr);
        for i in 0..size {
            self.shadow.insert(addr + i, Taint::new(t.id(), i as u32, false));
        }
    }

    pub fn write_block(&mut self, addr: u64, size: u64, nr: u64) {
        let _errno = SaveErrno::new();
        let t = self.get_block(size, nr);
        for i in 0..size {
            let bt = self.shadow_at(addr + i);
            if !bt.is_tainted() || (t.id() == bt.id() && i as u32 == bt.offset()) {
                continue;
            }
            self.emit(&format!("t{}[{i}]=t{}[{}]", t.id(), bt.id(), bt.offset()));
        }
    }

    pub fn name(&mut self, addr: u64, len: u64) {
        let _errno = SaveErrno::new();
        let taint = Taint::new(self.fresh_id(), 0, false);
        self.emit(&format!("t{}=N({len})", taint.id()));
        for i in 0..len {
            self.shadow.insert(addr + i, Taint::new(taint.id(), i as u32, false));
        }
    }

    pub fn data(&mut self, addr: u64, len: u64) {
        let _errno = SaveErrno::new();
        let taint = Taint::new(self.fresh_id(), 0, false);
        self.emit(&format!("t{}=D({len})", taint.id()));
        for i in 0..len {
            let bt = self.shadow_at(addr + i);
            if bt.is_tainted() {
                self.emit(&format!("t{}[{i}]=t{}[{}]", taint.id(), bt.id(), bt.offset()));
            }
            self.shadow.insert(addr + i, Taint::new(taint.id(), i as u32, false));
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_captured_trace() -> (Runtime, std::sync::Arc<std::sync::Mutex<Vec<u8>>>) {
        let buf = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        struct SharedWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for SharedWriter {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().write(data)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut rt = Runtime::new();
        rt.trace_enabled = true;
        rt.set_sink(Box::new(SharedWriter(buf.clone())));
        (rt, buf)
    }

    fn trace_lines(buf: &std::sync::Arc<std::sync::Mutex<Vec<u8>>>) -> Vec<String> {
        let data = buf.lock().unwrap();
        String::from_utf8_lossy(&data).lines().map(str::to_owned).collect()
    }

    #[test]
    fn load_on_untainted_region_mints_a_fresh_all_sentinel_object() {
        let (mut rt, buf) = with_captured_trace();
        let t = rt.load(0x1000, 4);
        assert!(t.is_tainted());
        assert_eq!(trace_lines(&buf), vec!["t1=O(t0[0],t0[0],t0[0],t0[0])"]);
    }

    #[test]
    fn store_then_load_round_trips_the_same_label_class() {
        let (mut rt, _buf) = with_captured_trace();
        let v = rt.value(5);
        rt.store(0x2000, 4, v);
        let loaded = rt.load(0x2000, 4);
        // same (id, offset) sequence both times once cached
        let loaded_again = rt.load(0x2000, 4);
        assert_eq!(loaded, loaded_again);
    }

    #[test]
    fn op2_dedups_identical_operand_pairs() {
        let (mut rt, _buf) = with_captured_trace();
        let a = rt.value(2);
        let b = rt.value(3);
        let first = rt.op2("add", a, b);
        let second = rt.op2("add", a, b);
        assert_eq!(first, second);
    }

    #[test]
    fn scenario_a_constant_plus_constant() {
        let (mut rt, buf) = with_captured_trace();
        let a = rt.value(2);
        let b = rt.value(3);
        let _sum = rt.op2("add", a, b);
        assert_eq!(trace_lines(&buf), vec!["t1=V(2)", "t2=V(3)", "t3=A(\"add\",t1,t2)"]);
    }

    #[test]
    fn channel_hygiene_load_arg_clears_and_store_ret_clears_args() {
        let (mut rt, _buf) = with_captured_trace();
        rt.store_arg(3, Taint::new(9, 0, false));
        assert!(rt.load_arg(3).is_tainted());
        assert!(!rt.load_arg(3).is_tainted());

        rt.store_arg(2, Taint::new(9, 0, false));
        rt.store_ret(Taint::new(9, 0, false));
        assert!(!rt.load_arg(2).is_tainted());

        rt.store_arg(2, Taint::new(9, 0, false));
        let _ = rt.load_ret();
        assert!(!rt.load_arg(2).is_tainted());
    }

    #[test]
    fn memmove_copies_shadow_and_clears_return_channel() {
        let (mut rt, _buf) = with_captured_trace();
        let t = rt.value(42);
        rt.store(0x100, 4, t);
        rt.store_arg(5, Taint::new(1, 0, false));
        rt.memmove(0x200, 0x100, 4);
        let moved = rt.load(0x200, 4);
        let original = rt.load(0x100, 4);
        assert_eq!(moved, original);
        assert!(!rt.load_arg(5).is_tainted());
    }

    #[test]
    fn name_then_data_emits_absorption_cross_edges() {
        let (mut rt, buf) = with_captured_trace();
        rt.name(0x300, 5);
        rt.data(0x300, 5);
        let lines = trace_lines(&buf);
        assert_eq!(lines[0], "t1=N(5)");
        assert_eq!(lines[1], "t2=D(5)");
        for i in 0..5 {
            assert!(lines.contains(&format!("t2[{i}]=t1[{i}]")));
        }
    }

    #[test]
    fn scenario_d_block_ingestion_then_propagation() {
        let (mut rt, buf) = with_captured_trace();
        // Argument channel slots 1 and 2 hold the size- and block-number-taint
        // `GetBlock` consults the first time a given block number is seen.
        rt.store_arg(1, Taint::new(10, 0, false));
        rt.store_arg(2, Taint::new(11, 0, false));
        rt.read_block(0x400, 8, 42);
        assert_eq!(trace_lines(&buf), vec!["t1=B(8,42,t10,t11)"]);

        // Loading the first 4 bytes of the block assembles an object
        // referencing that block's label at offsets 0..3.
        let loaded = rt.load(0x400, 4);
        assert!(loaded.is_tainted());
        let lines = trace_lines(&buf);
        assert_eq!(lines[1], format!("t{}=O(t1[0],t1[1],t1[2],t1[3])", loaded.id()));
    }

    #[test]
    fn write_block_emits_cross_edge_for_bytes_holding_a_different_label() {
        let (mut rt, buf) = with_captured_trace();
        rt.store_arg(1, Taint::SENTINEL);
        rt.store_arg(2, Taint::SENTINEL);
        rt.read_block(0x500, 4, 7); // t1 = B(4,7,t0,t0)

        let other = rt.value(99);
        rt.store(0x600, 4, other);
        // Copy a different label's bytes into the block's backing memory,
        // then re-announce it as block 7's own storage.
        rt.memmove(0x500, 0x600, 4);
        rt.store_arg(1, Taint::SENTINEL);
        rt.store_arg(2, Taint::SENTINEL);
        rt.write_block(0x500, 4, 7);

        let lines = trace_lines(&buf);
        for i in 0..4u32 {
            assert!(lines.contains(&format!("t1[{i}]=t{}[{i}]", other.id())));
        }
    }
}
