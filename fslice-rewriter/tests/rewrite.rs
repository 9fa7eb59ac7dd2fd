//! End-to-end checks: build small hand-written functions, run the rewriter
//! over them, and inspect the resulting shape.

use fslice_ir::{BlockCall, Function, InstructionData, MemIntrinsicKind, Module, Signature, Type};
use fslice_rewriter::{rewrite_module, RewriteError};

fn i32_ty() -> Type {
    Type::Int(32)
}

/// Lets `RUST_LOG=trace` surface the rewriter's `log::trace!`/`debug!`
/// labeling diagnostics when a test fails; a no-op otherwise.
fn init_logging() {
    let _ = env_logger::try_init();
}

#[test]
fn straight_line_function_is_instrumented_and_known_symbols_renamed() {
    init_logging();
    let sig = Signature { params: vec![i32_ty(), i32_ty()], ret: Some(i32_ty()) };
    let mut f = Function::new("add_two", sig);
    let entry = f.entry_block();
    let args = f.arguments().to_vec();

    let malloc = f.dfg.declare_ext_func("malloc");

    let (add_inst, sum) = f.dfg.make_inst_result(
        InstructionData::Binary { op: "add", lhs: args[0], rhs: args[1], ty: i32_ty() },
        i32_ty(),
    );
    f.layout.append_inst(entry, add_inst);

    let call_inst =
        f.dfg.make_inst(InstructionData::Call { func: malloc, args: Default::default(), result_ty: Some(Type::Pointer) });
    f.layout.append_inst(entry, call_inst);

    let ret_inst = f.dfg.make_inst(InstructionData::Return { value: Some(sum) });
    f.layout.append_inst(entry, ret_inst);

    let mut module = Module::new();
    module.push_function(f);

    let stats = rewrite_module(&mut module).expect("well-formed function rewrites cleanly");

    assert_eq!(stats.functions_rewritten, 1);
    // add, call, return each get instrumentation; the call's own malloc rename
    // doesn't add an instrumented original instruction.
    assert_eq!(stats.instructions_instrumented, 3);

    let rewritten = &module.functions[0];
    assert_eq!(rewritten.dfg.ext_func_name(malloc), "__fslice_malloc");
}

/// Semantic transparency, as far as this workspace can observe it without
/// an interpreter: every pre-existing instruction is
/// still present after rewriting, still reads the same operands, and the
/// originals keep their relative order — instrumentation is only ever
/// spliced in around them, never substituted for them.
#[test]
fn original_instructions_survive_unchanged_and_in_relative_order() {
    init_logging();
    let sig = Signature { params: vec![i32_ty(), i32_ty()], ret: Some(i32_ty()) };
    let mut f = Function::new("add_two", sig);
    let entry = f.entry_block();
    let args = f.arguments().to_vec();

    let (add_inst, sum) = f.dfg.make_inst_result(
        InstructionData::Binary { op: "add", lhs: args[0], rhs: args[1], ty: i32_ty() },
        i32_ty(),
    );
    f.layout.append_inst(entry, add_inst);

    let ret_inst = f.dfg.make_inst(InstructionData::Return { value: Some(sum) });
    f.layout.append_inst(entry, ret_inst);

    let originals = f.layout.all_insts();
    let original_text: Vec<String> = originals.iter().map(|&i| f.dfg.inst_data(i).to_string()).collect();

    let mut module = Module::new();
    module.push_function(f);
    rewrite_module(&mut module).expect("well-formed function rewrites cleanly");

    let rewritten = &module.functions[0];
    let after = rewritten.layout.all_insts();

    let positions: Vec<usize> = originals
        .iter()
        .map(|o| after.iter().position(|a| a == o).expect("original instruction missing after rewrite"))
        .collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "original instructions must keep their relative order, only gaining instrumentation around them"
    );

    for (&inst, before) in originals.iter().zip(&original_text) {
        assert_eq!(
            &rewritten.dfg.inst_data(inst).to_string(),
            before,
            "rewriting must only read operands, never rewrite an original instruction's own data"
        );
    }
}

#[test]
fn phi_join_merges_both_predecessors_into_one_logical_variable() {
    init_logging();
    let sig = Signature { params: vec![i32_ty()], ret: Some(i32_ty()) };
    let mut f = Function::new("branchy", sig);
    let entry = f.entry_block();
    let a = f.arguments()[0];

    let (zero_inst, zero) = f.dfg.make_inst_result(InstructionData::IConst { value: 0, ty: i32_ty() }, i32_ty());
    f.layout.append_inst(entry, zero_inst);

    let (cmp_inst, cond) =
        f.dfg.make_inst_result(InstructionData::Icmp { cc: "eq", lhs: a, rhs: zero }, Type::Int(8));
    f.layout.append_inst(entry, cmp_inst);

    let then_block = f.make_block();
    let else_block = f.make_block();
    let join_block = f.make_block();
    let join_param = f.dfg.append_block_param(join_block, i32_ty());

    let brif_inst = f.dfg.make_inst(InstructionData::Brif {
        cond,
        then: BlockCall { block: then_block, args: [a].into_iter().collect() },
        else_: BlockCall { block: else_block, args: [zero].into_iter().collect() },
    });
    f.layout.append_inst(entry, brif_inst);

    let then_jump =
        f.dfg.make_inst(InstructionData::Jump { to: BlockCall { block: join_block, args: [a].into_iter().collect() } });
    f.layout.append_inst(then_block, then_jump);

    let else_jump = f.dfg.make_inst(InstructionData::Jump {
        to: BlockCall { block: join_block, args: [zero].into_iter().collect() },
    });
    f.layout.append_inst(else_block, else_jump);

    let (sum_inst, sum) = f.dfg.make_inst_result(
        InstructionData::Binary { op: "add", lhs: join_param, rhs: join_param, ty: i32_ty() },
        i32_ty(),
    );
    f.layout.append_inst(join_block, sum_inst);

    let ret_inst = f.dfg.make_inst(InstructionData::Return { value: Some(sum) });
    f.layout.append_inst(join_block, ret_inst);

    let mut module = Module::new();
    module.push_function(f);

    let stats = rewrite_module(&mut module).expect("branchy function rewrites cleanly");

    // `a` and `join_param` are unioned by the `then` edge (the `else` edge
    // carries a constant and contributes no union), leaving two logical
    // variables: the {a, join_param} class and the sum.
    assert_eq!(stats.logical_variables, 2);
    // Only the join block's binary op and return are instrumented; the
    // entry block's compare/branch and both jumps carry no instrumentation.
    assert_eq!(stats.instructions_instrumented, 2);
}

#[test]
fn mem_intrinsic_is_replaced_not_instrumented_alongside() {
    init_logging();
    let sig = Signature { params: vec![Type::Pointer, i32_ty(), Type::Pointer], ret: None };
    let mut f = Function::new("zero_buf", sig);
    let entry = f.entry_block();
    let args = f.arguments().to_vec();
    let (dst, val, len) = (args[0], args[1], args[2]);

    let memset_inst = f.dfg.make_inst(InstructionData::MemIntrinsic {
        kind: MemIntrinsicKind::Memset,
        dst,
        src_or_val: val,
        len,
    });
    f.layout.append_inst(entry, memset_inst);
    let ret_inst = f.dfg.make_inst(InstructionData::Return { value: None });
    f.layout.append_inst(entry, ret_inst);

    let mut module = Module::new();
    module.push_function(f);

    rewrite_module(&mut module).expect("mem intrinsic rewrites cleanly");

    let rewritten = &module.functions[0];
    assert!(
        !rewritten.layout.all_insts().contains(&memset_inst),
        "the original memset instruction must be removed once replaced"
    );
    let has_fslice_memset = rewritten.dfg.ext_funcs().any(|(_, name)| name == "__fslice_memset");
    assert!(has_fslice_memset, "rewriter must declare the runtime's memset replacement");
}

#[test]
fn float_typed_values_get_no_logical_variable_or_op2_call() {
    init_logging();
    let f32_ty = Type::Float(32);
    let sig = Signature { params: vec![f32_ty, f32_ty], ret: Some(f32_ty) };
    let mut f = Function::new("add_floats", sig);
    let entry = f.entry_block();
    let args = f.arguments().to_vec();

    let (add_inst, sum) =
        f.dfg.make_inst_result(InstructionData::Binary { op: "fadd", lhs: args[0], rhs: args[1], ty: f32_ty }, f32_ty);
    f.layout.append_inst(entry, add_inst);

    let ret_inst = f.dfg.make_inst(InstructionData::Return { value: Some(sum) });
    f.layout.append_inst(entry, ret_inst);

    let mut module = Module::new();
    module.push_function(f);

    let stats = rewrite_module(&mut module).expect("float-only function rewrites cleanly");

    // The float operands and result never get a shadow slot, so the binary
    // op is left uninstrumented (no `__fslice_op2` call); only the return
    // is instrumented, with the untainted sentinel standing in for the
    // float's untracked taint.
    assert_eq!(stats.logical_variables, 0);
    assert_eq!(stats.instructions_instrumented, 1);

    let rewritten = &module.functions[0];
    let has_op2 = rewritten.dfg.ext_funcs().any(|(_, name)| name == "__fslice_op2");
    assert!(!has_op2, "a float-typed binary op must never call __fslice_op2");
}

#[test]
fn load_through_a_non_pointer_operand_is_rejected() {
    init_logging();
    let sig = Signature { params: vec![i32_ty()], ret: None };
    let mut f = Function::new("bad_load", sig);
    let entry = f.entry_block();
    let not_a_pointer = f.arguments()[0];

    let (load_inst, _loaded) =
        f.dfg.make_inst_result(InstructionData::Load { ptr: not_a_pointer, ty: i32_ty() }, i32_ty());
    f.layout.append_inst(entry, load_inst);
    let ret_inst = f.dfg.make_inst(InstructionData::Return { value: None });
    f.layout.append_inst(entry, ret_inst);

    let mut module = Module::new();
    module.push_function(f);

    let err = rewrite_module(&mut module).unwrap_err();
    assert!(matches!(err, RewriteError::NotAPointer { .. }));
}
